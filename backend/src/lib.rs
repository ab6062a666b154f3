//! # hreflang-connect - multilingual alternate links from a CSV feed
//!
//! Pages are linked to their equivalents on other language sites from a
//! periodically fetched CSV feed, and the links are published as hreflang
//! markup.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Feed URL   │────▶│   Parser    │────▶│   Builder   │────▶│    Store    │
//! │  (fetched)  │     │  (auto-enc) │     │ (resolver)  │     │ (per item)  │
//! └─────────────┘     └─────────────┘     └─────────────┘     └──────┬──────┘
//!                                                                     │
//!                                              <link rel="alternate"> ◀┘ renderer
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use hreflang_connect::{HttpFetcher, ImportOrchestrator, MemoryStore, PermalinkFile};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(MemoryStore::new());
//!     let orchestrator = ImportOrchestrator::new(
//!         Arc::new(HttpFetcher::new(Duration::from_secs(30), 10 << 20).unwrap()),
//!         Arc::new(PermalinkFile::open("sitemap.json").await.unwrap()),
//!         store.clone(),
//!         store,
//!     );
//!     let run = orchestrator.run("https://example.com/links.csv").await;
//!     println!("{}", run.summary());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types per layer
//! - [`models`] - Language codes, rows, link sets, runs
//! - [`parser`] - CSV feed parsing with encoding detection
//! - [`resolver`] - URL to item resolution
//! - [`store`] - Link set and option storage
//! - [`fetch`] - Feed download
//! - [`import`] - Row building and the import orchestrator
//! - [`render`] - Hreflang links and markup
//! - [`config`] - Environment configuration
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod models;

// Parsing
pub mod parser;

// Capabilities
pub mod fetch;
pub mod resolver;
pub mod store;

// Import
pub mod import;

// Rendering
pub mod render;

// Configuration
pub mod config;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{ConfigError, FeedError, FetchError, RowError, ServerError, StoreError};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    FeedRow,
    HreflangLink,
    ImportRun,
    ItemId,
    LanguageCode,
    LanguageLinkSet,
    RunCounts,
    RunOutcome,
};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use fetch::{FeedFetcher, HttpFetcher};
pub use import::{build, BuiltRow, ImportOrchestrator, RunHistory};
pub use parser::{decode_content, detect_encoding, parse, parse_str, ParsedFeed};
pub use resolver::{PermalinkEntry, PermalinkFile, SitemapResolver, UrlResolver};
pub use store::{FeedPointer, FileStore, MemoryStore, MetadataStore, OptionStore};

// =============================================================================
// Re-exports - Rendering
// =============================================================================

pub use render::{alternate_links, append_to_menu, head_links, links_fragment, HreflangRenderer};

// =============================================================================
// Re-exports - Config / API
// =============================================================================

pub use config::Config;
pub use api::{start_server, AppState};
