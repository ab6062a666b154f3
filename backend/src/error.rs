//! Error types for the hreflang import pipeline.
//!
//! Errors are split by the level at which they are recovered:
//!
//! - [`FetchError`] - transport failures while downloading a feed
//! - [`FeedError`] - feed-level failures, the whole run is abandoned
//! - [`RowError`] - row-level failures, only the row is skipped
//! - [`StoreError`] - metadata/option storage failures
//! - [`ConfigError`] - invalid environment configuration
//! - [`ServerError`] - HTTP surface errors
//!
//! Neither [`FeedError`] nor [`RowError`] ever escapes an import run: the
//! orchestrator turns them into counts on the [`crate::models::ImportRun`].

use thiserror::Error;

use crate::models::{ItemId, RunOutcome};

// =============================================================================
// Fetch Errors
// =============================================================================

/// Errors while downloading the CSV feed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, DNS or protocol failure.
    #[error("Request failed: {0}")]
    Request(String),

    /// The feed server answered with a non-success status.
    #[error("Feed server answered with HTTP {0}")]
    Status(u16),

    /// The request did not finish in time.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// The body is larger than the configured cap.
    #[error("Feed is larger than {limit} bytes")]
    TooLarge { limit: usize },
}

// =============================================================================
// Feed Errors
// =============================================================================

/// Feed-level errors. Any of these aborts the current run.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The configured feed URL is empty or not an absolute URL.
    #[error("Invalid feed URL: '{0}'")]
    InvalidFeedUrl(String),

    /// The feed could not be downloaded.
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// The feed body has no content.
    #[error("Feed is empty")]
    EmptyFeed,

    /// The feed has a header row but no data rows.
    #[error("Feed has a header row but no data rows")]
    TruncatedFeed,
}

impl FeedError {
    /// Run outcome this error ends a run with.
    pub fn outcome(&self) -> RunOutcome {
        match self {
            FeedError::InvalidFeedUrl(_) => RunOutcome::InvalidFeedUrl,
            FeedError::Fetch(_) => RunOutcome::FetchFailed,
            FeedError::EmptyFeed => RunOutcome::EmptyFeed,
            FeedError::TruncatedFeed => RunOutcome::TruncatedFeed,
        }
    }
}

// =============================================================================
// Row Errors
// =============================================================================

/// Row-level errors. The row is skipped, the run continues.
#[derive(Debug, Error)]
pub enum RowError {
    /// The primary (first column) URL is not an absolute URL.
    #[error("Line {line}: invalid primary URL '{url}'")]
    InvalidUrl { line: u64, url: String },

    /// No content item matches the primary URL.
    #[error("Line {line}: no item found for '{url}'")]
    UnresolvedItem { line: u64, url: String },

    /// The link set was built but could not be persisted.
    #[error("Line {line}: failed to store links for item {item}: {source}")]
    Store {
        line: u64,
        item: ItemId,
        #[source]
        source: StoreError,
    },
}

impl RowError {
    /// Feed line the error refers to.
    pub fn line(&self) -> u64 {
        match self {
            RowError::InvalidUrl { line, .. }
            | RowError::UnresolvedItem { line, .. }
            | RowError::Store { line, .. } => *line,
        }
    }
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors from the metadata and option stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("Store IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored document could not be (de)serialized.
    #[error("Store JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A writer panicked while holding the store lock.
    #[error("Store lock poisoned")]
    Poisoned,
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        StoreError::Poisoned
    }
}

// =============================================================================
// Config Errors
// =============================================================================

/// Invalid configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed.
    #[error("Invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP surface errors, converted to responses in [`crate::api::types`].
#[derive(Debug, Error)]
pub enum ServerError {
    /// Malformed request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Missing or wrong credentials.
    #[error("Unauthorized")]
    Unauthorized,

    /// Credentials are fine but the request is not allowed.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Storage failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Socket or filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for feed-level operations.
pub type FeedResult<T> = Result<T, FeedError>;

/// Result type for row-level operations.
pub type RowResult<T> = Result<T, RowError>;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
