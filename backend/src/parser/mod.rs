//! CSV feed parser with encoding auto-detection.
//!
//! A feed looks like:
//!
//! ```text
//! DK,EN,SE
//! https://site.dk/side,https://site.com/page,https://site.se/sida
//! ```
//!
//! The first non-empty line is the header of language codes; column 0 is the
//! site the feed is imported on. Data rows are handed out lazily, one record
//! at a time, through [`FeedRows`].

use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter, Trim};
use std::io::Cursor;
use tracing::warn;

use crate::error::{FeedError, FeedResult};
use crate::models::{FeedRow, LanguageCode};

/// A parsed feed: header codes plus the remaining rows.
pub struct ParsedFeed {
    /// Header language codes, column 0 included.
    pub languages: Vec<LanguageCode>,
    /// Detected encoding of the raw bytes.
    pub encoding: String,
    /// Data rows, single forward pass.
    pub rows: FeedRows,
}

/// Lazy iterator over the data rows of a feed.
///
/// Blank lines are skipped. Rows may be shorter or longer than the header.
pub struct FeedRows {
    first: Option<FeedRow>,
    records: Records,
}

type Records = StringRecordsIntoIter<Cursor<Vec<u8>>>;

impl Iterator for FeedRows {
    type Item = FeedRow;

    fn next(&mut self) -> Option<Self::Item> {
        self.first.take().or_else(|| next_record(&mut self.records).map(to_row))
    }
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        other => other.to_string(),
    }
}

/// Decode bytes to a string using `encoding`, falling back to lossy UTF-8.
///
/// A leading byte order mark is removed.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    let decoded = match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::ISO_8859_15.decode(bytes).0.into_owned(),
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        _ => match String::from_utf8(bytes.to_vec()) {
            Ok(text) => text,
            Err(_) => String::from_utf8_lossy(bytes).into_owned(),
        },
    };

    match decoded.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => decoded,
    }
}

/// Parse raw feed bytes.
///
/// # Errors
/// - [`FeedError::EmptyFeed`] when the body is empty or only blank lines
/// - [`FeedError::TruncatedFeed`] when there is a header but no data row
///
/// # Example
/// ```ignore
/// let feed = hreflang_connect::parse(b"X,en,dk\nhttps://a/,https://b/,https://c/\n")?;
/// assert_eq!(feed.languages.len(), 3);
/// assert_eq!(feed.rows.count(), 1);
/// ```
pub fn parse(bytes: &[u8]) -> FeedResult<ParsedFeed> {
    if bytes.is_empty() {
        return Err(FeedError::EmptyFeed);
    }

    let encoding = if std::str::from_utf8(bytes).is_ok() {
        "utf-8".to_string()
    } else {
        detect_encoding(bytes)
    };
    let content = decode_content(bytes, &encoding);
    parse_str(&content, encoding)
}

/// Parse already-decoded feed text.
///
/// The reader is flexible and works on decoded text, so record lengths and
/// byte content never fail a feed.
pub fn parse_str(content: &str, encoding: String) -> FeedResult<ParsedFeed> {
    let reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(Cursor::new(content.as_bytes().to_vec()));
    let mut records = reader.into_records();

    let header = next_record(&mut records).ok_or(FeedError::EmptyFeed)?;
    let languages: Vec<LanguageCode> = header.iter().map(LanguageCode::new).collect();

    // The first data row is read eagerly so a header-only feed is detected
    // before any row is handed out.
    let first = next_record(&mut records).map(to_row).ok_or(FeedError::TruncatedFeed)?;

    Ok(ParsedFeed {
        languages,
        encoding,
        rows: FeedRows {
            first: Some(first),
            records,
        },
    })
}

/// Pull the next non-blank record.
fn next_record(records: &mut Records) -> Option<StringRecord> {
    loop {
        match records.next()? {
            Ok(record) if is_blank(&record) => continue,
            Ok(record) => return Some(record),
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or_default();
                warn!(line, error = %e, "unreadable CSV record skipped");
            }
        }
    }
}

fn to_row(record: StringRecord) -> FeedRow {
    let line = record.position().map(|p| p.line()).unwrap_or_default();
    FeedRow::new(line, record.iter().map(str::to_string).collect())
}

/// A line with nothing but whitespace.
fn is_blank(record: &StringRecord) -> bool {
    record.iter().all(str::is_empty) && record.len() <= 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(feed: ParsedFeed) -> Vec<FeedRow> {
        feed.rows.collect()
    }

    #[test]
    fn test_header_and_rows() {
        let csv = "X,en,dk\nhttps://a.example/1,https://b.example/1,https://c.example/1\n";
        let feed = parse(csv.as_bytes()).unwrap();

        let codes: Vec<&str> = feed.languages.iter().map(LanguageCode::as_str).collect();
        assert_eq!(codes, vec!["X", "en", "dk"]);

        let rows = rows(feed);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[0].primary(), "https://a.example/1");
        assert_eq!(rows[0].get(2), Some("https://c.example/1"));
    }

    #[test]
    fn test_empty_body() {
        assert!(matches!(parse(b""), Err(FeedError::EmptyFeed)));
    }

    #[test]
    fn test_blank_body_is_empty() {
        assert!(matches!(parse(b"\n\n  \n"), Err(FeedError::EmptyFeed)));
    }

    #[test]
    fn test_header_only_is_truncated() {
        assert!(matches!(parse(b"DK,EN,SE\n"), Err(FeedError::TruncatedFeed)));
        assert!(matches!(parse(b"DK,EN,SE\n\n\n"), Err(FeedError::TruncatedFeed)));
    }

    #[test]
    fn test_leading_blank_lines_before_header() {
        let csv = "\n\nDK,EN\nhttps://a.example/,https://b.example/\n";
        let feed = parse(csv.as_bytes()).unwrap();
        assert_eq!(feed.languages[0].as_str(), "DK");
        assert_eq!(rows(feed).len(), 1);
    }

    #[test]
    fn test_empty_lines_skipped() {
        let csv = "DK,EN\nhttps://a.example/1,\n\n\nhttps://a.example/2,https://b.example/2\n";
        let rows = rows(parse(csv.as_bytes()).unwrap());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get(1), Some(""));
        assert_eq!(rows[1].primary(), "https://a.example/2");
    }

    #[test]
    fn test_quoted_fields_with_commas_and_newlines() {
        let csv = "DK,EN\n\"https://a.example/?q=1,2\",\"https://b.example/\nx\"\n";
        let rows = rows(parse(csv.as_bytes()).unwrap());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].primary(), "https://a.example/?q=1,2");
        assert_eq!(rows[0].get(1), Some("https://b.example/\nx"));
    }

    #[test]
    fn test_crlf_and_whitespace_trimmed() {
        let csv = "DK , EN\r\n https://a.example/ , https://b.example/ \r\n";
        let feed = parse(csv.as_bytes()).unwrap();
        assert_eq!(feed.languages[1].as_str(), "EN");
        let rows = rows(feed);
        assert_eq!(rows[0].primary(), "https://a.example/");
        assert_eq!(rows[0].get(1), Some("https://b.example/"));
    }

    #[test]
    fn test_rows_may_be_shorter_or_longer_than_header() {
        let csv = "DK,EN,SE\nhttps://a.example/1\nhttps://a.example/2,https://b/,https://c/,https://d/\n";
        let rows = rows(parse(csv.as_bytes()).unwrap());
        assert_eq!(rows[0].len(), 1);
        assert_eq!(rows[1].len(), 4);
    }

    #[test]
    fn test_stray_quote_does_not_fail_feed() {
        let feed = parse(b"X,en\nhttps://a/,\"open\nhttps://b/,https://c/\n").unwrap();
        let rows = rows(feed);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].primary(), "https://a/");
        assert!(rows[0].get(1).unwrap().starts_with("open"));
    }

    #[test]
    fn test_bom_stripped() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"DK,EN\nhttps://a.example/,https://b.example/\n");
        let feed = parse(&bytes).unwrap();
        assert_eq!(feed.languages[0].as_str(), "DK");
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let decoded = decode_content(bytes, "iso-8859-1");
        assert!(decoded.contains("Soci"));
    }
}
