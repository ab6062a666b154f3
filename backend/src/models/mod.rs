//! Domain models for the hreflang import pipeline.
//!
//! - [`LanguageCode`] - language token from the feed header (`en`, `DK`, ...)
//! - [`ItemId`] - host content item identifier, produced by a resolver
//! - [`FeedRow`] - one data row of the feed, primary URL first
//! - [`LanguageLinkSet`] - ordered language code to URL mapping stored per item
//! - [`HreflangLink`] - one alternate-link declaration ready for markup
//! - [`ImportRun`] - aggregate result of one import run

use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use url::Url;

// =============================================================================
// Language Code
// =============================================================================

/// A language token as written in the feed header.
///
/// Comparison between codes is case-insensitive ([`LanguageCode::matches`]);
/// the original spelling is kept for storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageCode(String);

impl LanguageCode {
    /// Create a code, trimming surrounding whitespace.
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_string())
    }

    /// Derive the language from a site locale: `en_US` -> `en`, `da-DK` -> `da`.
    pub fn from_locale(locale: &str) -> Self {
        let lang = locale
            .trim()
            .split(['_', '-'])
            .next()
            .unwrap_or_default();
        Self(lang.to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Case-insensitive equality on the raw code.
    pub fn matches(&self, other: &LanguageCode) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }

    /// Code to publish in an `hreflang` attribute.
    ///
    /// Lower-cased, and `dk` (a country code commonly used for Danish) becomes `da`.
    pub fn hreflang(&self) -> String {
        let lower = self.0.to_lowercase();
        if lower == "dk" {
            "da".to_string()
        } else {
            lower
        }
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LanguageCode {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

// =============================================================================
// Item Identifier
// =============================================================================

/// Identifier of a content item in the host system.
///
/// Only resolver adapters create these; the import core passes them through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(u64);

impl ItemId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ItemId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

// =============================================================================
// Feed Row
// =============================================================================

/// One data row of the feed.
///
/// Position 0 is the primary URL on this site; positions `1..` line up with the
/// header's language codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedRow {
    /// 1-based line in the feed where the record starts.
    pub line: u64,
    /// Raw (trimmed) field values.
    pub urls: Vec<String>,
}

impl FeedRow {
    pub fn new(line: u64, urls: Vec<String>) -> Self {
        Self { line, urls }
    }

    /// The anchor URL, empty string when the row has no fields.
    pub fn primary(&self) -> &str {
        self.urls.first().map(String::as_str).unwrap_or_default()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.urls.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

// =============================================================================
// Language Link Set
// =============================================================================

/// Ordered mapping from language code to absolute URL.
///
/// Keys are unique under case-insensitive comparison. Inserting an existing
/// code replaces the entry in place (last write wins, first position kept).
/// Serialized as a JSON object in insertion order.
///
/// Values are parsed [`Url`]s, so what is stored and rendered is the
/// normalized form of the feed cell: the scheme and host are lower-cased,
/// default ports are dropped and an empty path becomes `/`
/// (`HTTPS://Site.COM:443` is stored as `https://site.com/`). Paths, queries
/// and fragments keep their case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LanguageLinkSet {
    entries: Vec<(LanguageCode, Url)>,
}

impl LanguageLinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the URL for `code`. Returns the replaced URL, if any.
    pub fn insert(&mut self, code: LanguageCode, url: Url) -> Option<Url> {
        match self.entries.iter_mut().find(|(c, _)| c.matches(&code)) {
            Some(entry) => {
                let previous = std::mem::replace(&mut entry.1, url);
                entry.0 = code;
                Some(previous)
            }
            None => {
                self.entries.push((code, url));
                None
            }
        }
    }

    /// URL stored for `code`, compared case-insensitively.
    pub fn get(&self, code: &str) -> Option<&Url> {
        self.entries
            .iter()
            .find(|(c, _)| c.as_str().eq_ignore_ascii_case(code))
            .map(|(_, url)| url)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LanguageCode, &Url)> {
        self.entries.iter().map(|(c, u)| (c, u))
    }

    pub fn codes(&self) -> impl Iterator<Item = &LanguageCode> {
        self.entries.iter().map(|(c, _)| c)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(LanguageCode, Url)> for LanguageLinkSet {
    fn from_iter<I: IntoIterator<Item = (LanguageCode, Url)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (code, url) in iter {
            set.insert(code, url);
        }
        set
    }
}

impl Serialize for LanguageLinkSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (code, url) in &self.entries {
            map.serialize_entry(code.as_str(), url.as_str())?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for LanguageLinkSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LinkSetVisitor;

        impl<'de> Visitor<'de> for LinkSetVisitor {
            type Value = LanguageLinkSet;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object mapping language codes to absolute URLs")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut set = LanguageLinkSet::new();
                while let Some((code, raw)) = access.next_entry::<String, String>()? {
                    let url = Url::parse(&raw).map_err(|e| {
                        serde::de::Error::custom(format!("invalid URL for '{}': {}", code, e))
                    })?;
                    set.insert(LanguageCode::new(code), url);
                }
                Ok(set)
            }
        }

        deserializer.deserialize_map(LinkSetVisitor)
    }
}

// =============================================================================
// Hreflang Link
// =============================================================================

/// One alternate-language declaration: `hreflang` code and target URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HreflangLink {
    /// Normalized output code (see [`LanguageCode::hreflang`]).
    pub hreflang: String,
    pub href: Url,
}

// =============================================================================
// Import Run
// =============================================================================

/// How an import run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Rows were streamed through the builder (some may have failed).
    Completed,
    /// No feed URL was configured.
    NothingScheduled,
    /// Another run held the run guard.
    AlreadyRunning,
    /// The feed URL was empty or not absolute; nothing was fetched.
    InvalidFeedUrl,
    /// The feed could not be downloaded.
    FetchFailed,
    /// The feed was reachable but empty.
    EmptyFeed,
    /// The feed only had a header row.
    TruncatedFeed,
}

impl RunOutcome {
    /// Whether the outcome is a feed-level failure.
    pub fn is_failure(self) -> bool {
        matches!(self, RunOutcome::InvalidFeedUrl | RunOutcome::FetchFailed)
    }
}

/// Per-row counters of an import run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunCounts {
    /// Data rows read from the feed.
    pub processed: usize,
    /// Rows whose link set was written to the store.
    pub persisted: usize,
    /// Rows whose primary URL did not resolve to an item.
    pub skipped_unresolved: usize,
    /// Rows with an invalid primary URL or an undecodable record.
    pub invalid: usize,
    /// Rows that resolved but could not be written.
    pub failed: usize,
    /// Secondary URLs dropped because they were not absolute URLs.
    pub dropped_links: usize,
}

/// A failed row kept on the run for operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFailure {
    pub line: u64,
    pub reason: String,
}

/// Result of one orchestrator invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRun {
    /// Unique run identifier.
    pub id: String,
    /// Feed URL as configured (may be invalid).
    pub feed_url: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: RunOutcome,
    /// Human readable reason for feed-level outcomes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Header language codes (column 0 included).
    #[serde(default)]
    pub languages: Vec<LanguageCode>,
    pub counts: RunCounts,
    /// First failed rows, capped at [`ImportRun::MAX_FAILURES`].
    #[serde(default)]
    pub failures: Vec<RowFailure>,
}

impl ImportRun {
    /// Number of row failures kept on a run.
    pub const MAX_FAILURES: usize = 10;

    pub fn start(feed_url: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            feed_url: feed_url.into(),
            started_at: Utc::now(),
            finished_at: None,
            outcome: RunOutcome::Completed,
            detail: None,
            languages: Vec::new(),
            counts: RunCounts::default(),
            failures: Vec::new(),
        }
    }

    /// Close the run with `outcome`.
    pub fn finish(mut self, outcome: RunOutcome, detail: Option<String>) -> Self {
        self.outcome = outcome;
        self.detail = detail;
        self.finished_at = Some(Utc::now());
        self
    }

    pub fn record_failure(&mut self, line: u64, reason: impl Into<String>) {
        if self.failures.len() < Self::MAX_FAILURES {
            self.failures.push(RowFailure {
                line,
                reason: reason.into(),
            });
        }
    }

    /// Short summary line.
    pub fn summary(&self) -> String {
        let c = &self.counts;
        format!(
            "{:?}: {} processed, {} persisted, {} unresolved, {} invalid, {} failed",
            self.outcome, c.processed, c.persisted, c.skipped_unresolved, c.invalid, c.failed
        )
    }
}

// =============================================================================
// Tests
// =============================================================================
