//! Link-set builder: one feed row to one item's language links.
//!
//! ```text
//! header:  X                     en                      dk
//! row:     https://site/a   ->   https://site.com/a      https://site.dk/a
//!          │ resolve             │                       │
//!          ▼                     ▼                       ▼
//!          item 12          { "en": ...,              "dk": ... }
//! ```
//!
//! Column 0 only identifies the item. Columns `1..` are paired with the header
//! by position; missing or empty cells are left out, invalid URLs are dropped
//! with a warning. A row whose secondary cells are all unusable still yields an
//! (empty) link set, which clears the item's previous links when stored.

use url::Url;

use crate::api::logs::log_warning;
use crate::error::{RowError, RowResult};
use crate::models::{FeedRow, ItemId, LanguageCode, LanguageLinkSet};
use crate::resolver::UrlResolver;

/// A successfully built row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltRow {
    pub item: ItemId,
    pub links: LanguageLinkSet,
    /// Secondary cells that were present but not absolute URLs.
    pub dropped: usize,
}

/// Parse an absolute `http`/`https` URL with a host.
///
/// Surrounding whitespace is ignored; anything else is rejected.
pub fn parse_absolute_url(raw: &str) -> Option<Url> {
    let url = Url::parse(raw.trim()).ok()?;
    let http = matches!(url.scheme(), "http" | "https");
    let has_host = url.host_str().is_some_and(|h| !h.is_empty());
    (http && has_host).then_some(url)
}

/// Build the link set for `row`.
///
/// # Errors
/// - [`RowError::InvalidUrl`] when the primary URL is not absolute
/// - [`RowError::UnresolvedItem`] when no item matches the primary URL
pub fn build(
    languages: &[LanguageCode],
    row: &FeedRow,
    resolver: &dyn UrlResolver,
) -> RowResult<BuiltRow> {
    let primary = parse_absolute_url(row.primary()).ok_or_else(|| RowError::InvalidUrl {
        line: row.line,
        url: row.primary().to_string(),
    })?;

    let item = resolver
        .resolve(&primary)
        .ok_or_else(|| RowError::UnresolvedItem {
            line: row.line,
            url: primary.to_string(),
        })?;

    let mut links = LanguageLinkSet::new();
    let mut dropped = 0;

    for (index, code) in languages.iter().enumerate().take(row.len()).skip(1) {
        let cell = match row.get(index) {
            Some(cell) if !cell.is_empty() => cell,
            _ => continue,
        };
        if code.is_empty() {
            log_warning(format!(
                "Line {}: column {} has no language code in the header, ignored",
                row.line,
                index + 1
            ));
            continue;
        }
        match parse_absolute_url(cell) {
            Some(url) => {
                links.insert(code.clone(), url);
            }
            None => {
                dropped += 1;
                log_warning(format!(
                    "Line {}: dropping invalid {} URL '{}'",
                    row.line, code, cell
                ));
            }
        }
    }

    Ok(BuiltRow {
        item,
        links,
        dropped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{PermalinkEntry, SitemapResolver};

    fn resolver() -> SitemapResolver {
        SitemapResolver::from_entries(vec![PermalinkEntry {
            id: 12,
            url: "https://site.example/a/".into(),
        }])
    }

    fn header(codes: &[&str]) -> Vec<LanguageCode> {
        codes.iter().map(|c| LanguageCode::new(c)).collect()
    }

    fn row(cells: &[&str]) -> FeedRow {
        FeedRow::new(2, cells.iter().map(|c| c.to_string()).collect())
    }

    #[test]
    fn test_builds_positional_mapping() {
        let built = build(
            &header(&["X", "en", "dk"]),
            &row(&["https://site.example/a/", "https://b.example/en", "https://c.example/dk"]),
            &resolver(),
        )
        .unwrap();

        assert_eq!(built.item, ItemId::new(12));
        assert_eq!(built.links.len(), 2);
        assert_eq!(built.links.get("en").unwrap().as_str(), "https://b.example/en");
        assert_eq!(built.links.get("dk").unwrap().as_str(), "https://c.example/dk");
        assert_eq!(built.dropped, 0);
    }

    #[test]
    fn test_primary_column_never_in_links() {
        let built = build(
            &header(&["dk", "en"]),
            &row(&["https://site.example/a/", "https://b.example/en"]),
            &resolver(),
        )
        .unwrap();
        assert!(built.links.get("dk").is_none());
    }

    #[test]
    fn test_invalid_primary_url() {
        let err = build(&header(&["X", "en"]), &row(&["/a/", "https://b.example/"]), &resolver()).unwrap_err();
        assert!(matches!(err, RowError::InvalidUrl { line: 2, .. }));

        let err = build(&header(&["X", "en"]), &row(&[""]), &resolver()).unwrap_err();
        assert!(matches!(err, RowError::InvalidUrl { .. }));
    }

    #[test]
    fn test_unresolved_primary_url() {
        let err = build(
            &header(&["X", "en"]),
            &row(&["https://site.example/unknown/", "https://b.example/"]),
            &resolver(),
        )
        .unwrap_err();
        assert!(matches!(err, RowError::UnresolvedItem { .. }));
    }

    #[test]
    fn test_empty_and_missing_cells_are_absent() {
        let built = build(
            &header(&["X", "en", "dk", "se"]),
            &row(&["https://site.example/a/", "", "https://c.example/dk"]),
            &resolver(),
        )
        .unwrap();

        let codes: Vec<&str> = built.links.codes().map(LanguageCode::as_str).collect();
        assert_eq!(codes, vec!["dk"]);
    }

    #[test]
    fn test_invalid_secondary_dropped_row_kept() {
        let built = build(
            &header(&["X", "en", "dk"]),
            &row(&["https://site.example/a/", "not a url", "ftp://c.example/dk"]),
            &resolver(),
        )
        .unwrap();

        assert!(built.links.is_empty());
        assert_eq!(built.dropped, 2);
    }

    #[test]
    fn test_extra_cells_beyond_header_ignored() {
        let built = build(
            &header(&["X", "en"]),
            &row(&["https://site.example/a/", "https://b.example/en", "https://c.example/extra"]),
            &resolver(),
        )
        .unwrap();
        assert_eq!(built.links.len(), 1);
    }

    #[test]
    fn test_repeated_header_code_last_wins() {
        let built = build(
            &header(&["X", "en", "EN"]),
            &row(&["https://site.example/a/", "https://b.example/first", "https://b.example/second"]),
            &resolver(),
        )
        .unwrap();

        assert_eq!(built.links.len(), 1);
        assert_eq!(built.links.get("en").unwrap().as_str(), "https://b.example/second");
    }

    #[test]
    fn test_secondary_urls_stored_normalized() {
        let built = build(
            &header(&["X", "en"]),
            &row(&["https://site.example/a/", "HTTPS://B.Example"]),
            &resolver(),
        )
        .unwrap();

        assert_eq!(built.links.get("en").unwrap().as_str(), "https://b.example/");
    }

    #[test]
    fn test_parse_absolute_url() {
        assert!(parse_absolute_url(" https://a.example/x ").is_some());
        assert!(parse_absolute_url("http://a.example").is_some());
        assert!(parse_absolute_url("mailto:someone@a.example").is_none());
        assert!(parse_absolute_url("javascript:alert(1)").is_none());
        assert!(parse_absolute_url("a.example/x").is_none());
        assert!(parse_absolute_url("").is_none());
    }
}
