//! URL to content item resolution.
//!
//! The host system owns the mapping from public URLs to items; the import
//! core only needs [`UrlResolver::resolve`]. [`SitemapResolver`] is the
//! bundled adapter, backed by a permalink table exported from the host:
//!
//! ```json
//! [
//!   { "id": 12, "url": "https://site.dk/om-os/" },
//!   { "id": 40, "url": "https://site.dk/kontakt/" }
//! ]
//! ```
//!
//! [`PermalinkFile`] wraps a table file and re-reads it on every
//! [`UrlResolver::refresh`], so pages published after startup resolve on the
//! next run.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

use crate::error::StoreResult;
use crate::models::ItemId;

/// Maps a URL to the content item it belongs to.
///
/// Must be deterministic for a given host state. A miss is `None`, never an
/// error, and callers do not retry it.
#[async_trait]
pub trait UrlResolver: Send + Sync {
    fn resolve(&self, url: &Url) -> Option<ItemId>;

    /// Catch up with the current host state. Called once before each run.
    async fn refresh(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Query parameters that address an item directly (`?p=12`, `?page_id=12`).
const ID_QUERY_KEYS: [&str; 2] = ["p", "page_id"];

/// One entry of a permalink table.
#[derive(Debug, Clone, Deserialize)]
pub struct PermalinkEntry {
    pub id: u64,
    pub url: String,
}

/// Resolver backed by a table of item permalinks.
///
/// Matching ignores the scheme, a trailing slash, the query string and the
/// fragment. Query links of the form `?p=<id>` or `?page_id=<id>` resolve when
/// `<id>` is a known item on the same host; such links never fall back to the path.
#[derive(Debug, Default, Clone)]
pub struct SitemapResolver {
    by_permalink: HashMap<String, ItemId>,
    hosts: HashSet<String>,
    known: HashSet<ItemId>,
}

impl SitemapResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON permalink table. A missing file yields an empty resolver.
    pub async fn load(path: &Path) -> StoreResult<Self> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %path.display(), "permalink table not found, every URL will be unresolved");
                return Ok(Self::new());
            }
            Err(e) => return Err(e.into()),
        };
        let entries: Vec<PermalinkEntry> = serde_json::from_str(&content)?;
        let resolver = Self::from_entries(entries);
        debug!(path = %path.display(), items = resolver.len(), "permalink table loaded");
        Ok(resolver)
    }

    pub fn from_entries(entries: impl IntoIterator<Item = PermalinkEntry>) -> Self {
        let mut resolver = Self::new();
        for entry in entries {
            match Url::parse(&entry.url) {
                Ok(url) => resolver.insert(ItemId::new(entry.id), &url),
                Err(e) => warn!(id = entry.id, url = %entry.url, error = %e, "skipping invalid permalink"),
            }
        }
        resolver
    }

    /// Register `url` as the permalink of `item`.
    pub fn insert(&mut self, item: ItemId, url: &Url) {
        if let Some(key) = permalink_key(url) {
            if let Some(host) = url.host_str() {
                self.hosts.insert(host.to_lowercase());
            }
            self.by_permalink.insert(key, item);
            self.known.insert(item);
        }
    }

    /// Number of registered permalinks.
    pub fn len(&self) -> usize {
        self.by_permalink.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_permalink.is_empty()
    }

    fn resolve_query_id(&self, url: &Url) -> Option<ItemId> {
        let host = url.host_str()?.to_lowercase();
        if !self.hosts.contains(&host) {
            return None;
        }
        url.query_pairs()
            .filter(|(k, _)| ID_QUERY_KEYS.contains(&k.as_ref()))
            .find_map(|(_, v)| v.parse::<ItemId>().ok())
            .filter(|id| self.known.contains(id))
    }
}

#[async_trait]
impl UrlResolver for SitemapResolver {
    fn resolve(&self, url: &Url) -> Option<ItemId> {
        if has_id_query(url) {
            return self.resolve_query_id(url);
        }
        permalink_key(url).and_then(|key| self.by_permalink.get(&key).copied())
    }
}

// =============================================================================
// Permalink File
// =============================================================================

/// A permalink table file, re-read on every refresh.
///
/// If a reload fails the previous table stays in use.
pub struct PermalinkFile {
    path: PathBuf,
    table: RwLock<SitemapResolver>,
}

impl PermalinkFile {
    /// Load the table at `path` (missing file: empty table).
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let table = SitemapResolver::load(&path).await?;
        Ok(Self {
            path,
            table: RwLock::new(table),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of permalinks in the current table.
    pub fn len(&self) -> usize {
        self.table.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl UrlResolver for PermalinkFile {
    fn resolve(&self, url: &Url) -> Option<ItemId> {
        self.table.read().unwrap_or_else(|e| e.into_inner()).resolve(url)
    }

    async fn refresh(&self) -> StoreResult<()> {
        let table = SitemapResolver::load(&self.path).await?;
        debug!(path = %self.path.display(), permalinks = table.len(), "permalink table reloaded");
        *self.table.write().unwrap_or_else(|e| e.into_inner()) = table;
        Ok(())
    }
}

fn has_id_query(url: &Url) -> bool {
    url.query_pairs().any(|(k, _)| ID_QUERY_KEYS.contains(&k.as_ref()))
}

/// Normalized lookup key: `host[:port]/path` without trailing slash.
fn permalink_key(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    let port = url.port().map(|p| format!(":{}", p)).unwrap_or_default();
    let path = url.path().trim_end_matches('/');
    Some(format!("{}{}{}", host, port, path))
}
