//! Markup serialization for rendered links.

use std::fmt::Write as _;

use crate::models::{HreflangLink, LanguageLinkSet};

/// Menu location the visible fragment is appended to.
pub const PRIMARY_MENU: &str = "primary";

/// `<link rel="alternate">` elements for the document head, one per line.
pub fn head_links(links: &[HreflangLink]) -> String {
    let mut out = String::new();
    for link in links {
        let _ = writeln!(
            out,
            r#"<link rel="alternate" hreflang="{}" href="{}" />"#,
            escape_attr(&link.hreflang),
            escape_attr(link.href.as_str())
        );
    }
    out
}

/// Visible language links for every stored entry.
///
/// Codes are written as stored; the label is the upper-cased code. An empty
/// set renders nothing.
pub fn links_fragment(links: &LanguageLinkSet) -> String {
    if links.is_empty() {
        return String::new();
    }

    let mut out = String::from(r#"<div class="hreflang-links-wrapper">"#);
    for (code, url) in links.iter() {
        let code_attr = escape_attr(code.as_str());
        let _ = write!(
            out,
            r#"<a class="hreflang-link lang-{code}" href="{href}" hreflang="{code}">{label}</a> "#,
            code = code_attr,
            href = escape_attr(url.as_str()),
            label = escape_html(&code.as_str().to_uppercase()),
        );
    }
    out.push_str("</div>");
    out
}

/// Append `fragment` to a menu's items markup when `location` is the primary menu.
pub fn append_to_menu(items: &str, location: &str, fragment: &str) -> String {
    if location == PRIMARY_MENU && !fragment.is_empty() {
        format!("{}{}", items, fragment)
    } else {
        items.to_string()
    }
}

/// Escape a value for a double- or single-quoted attribute.
pub fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape text content.
pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::alternate_links;
    use url::Url;

    fn stored(pairs: &[(&str, &str)]) -> LanguageLinkSet {
        pairs
            .iter()
            .map(|(c, u)| ((*c).into(), Url::parse(u).unwrap()))
            .collect()
    }

    #[test]
    fn test_head_links() {
        let links = stored(&[("en", "https://x.example/en"), ("dk", "https://x.example/dk")]);
        let head = head_links(&alternate_links(&links, &"en".into()));
        assert_eq!(
            head,
            "<link rel=\"alternate\" hreflang=\"da\" href=\"https://x.example/dk\" />\n"
        );
    }

    #[test]
    fn test_head_links_escapes_href() {
        let links = stored(&[("de", "https://x.example/?a=1&b=\"2\"")]);
        let head = head_links(&alternate_links(&links, &"en".into()));
        assert!(head.contains("href=\"https://x.example/?a=1&amp;b=%222%22\""));
    }

    #[test]
    fn test_fragment_lists_every_entry() {
        let links = stored(&[("en", "https://x.example/en"), ("dk", "https://x.example/dk")]);
        let html = links_fragment(&links);

        assert!(html.starts_with("<div class=\"hreflang-links-wrapper\">"));
        assert!(html.ends_with("</div>"));
        assert!(html.contains(
            "<a class=\"hreflang-link lang-dk\" href=\"https://x.example/dk\" hreflang=\"dk\">DK</a>"
        ));
        assert!(html.contains(">EN</a>"));
    }

    #[test]
    fn test_fragment_empty_set() {
        assert_eq!(links_fragment(&LanguageLinkSet::new()), "");
    }

    #[test]
    fn test_append_to_primary_menu_only() {
        assert_eq!(append_to_menu("<li>a</li>", "primary", "<div/>"), "<li>a</li><div/>");
        assert_eq!(append_to_menu("<li>a</li>", "footer", "<div/>"), "<li>a</li>");
        assert_eq!(append_to_menu("<li>a</li>", "primary", ""), "<li>a</li>");
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape_attr(r#"a"b'<c>&"#), "a&quot;b&#39;&lt;c&gt;&amp;");
        assert_eq!(escape_html("<b>&"), "&lt;b&gt;&amp;");
    }
}
