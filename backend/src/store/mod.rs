//! Multilingual metadata and option storage.
//!
//! Two capabilities the import core consumes:
//!
//! - [`MetadataStore`] - one [`LanguageLinkSet`] per item, `set` replaces wholesale
//! - [`OptionStore`] - named string settings, used for the feed pointer
//!
//! [`FileStore`] keeps both as JSON documents under a data directory:
//!
//! ```text
//! .hreflang/
//! ├── options.json          # { "import_feed_url": "https://..." }
//! └── items/
//!     ├── 12.json           # { "dk": "https://...", "en": "https://..." }
//!     └── 40.json
//! ```
//!
//! [`MemoryStore`] is the in-process equivalent.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::fs;
use tracing::debug;

use crate::error::StoreResult;
use crate::models::{ItemId, LanguageLinkSet};

/// Default data directory (relative to current dir)
pub const DEFAULT_DATA_DIR: &str = ".hreflang";

/// Option key of the configured feed URL.
pub const IMPORT_FEED_URL_OPTION: &str = "import_feed_url";

/// Per-item language link storage.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Stored links for `item`, `None` when nothing was ever stored.
    async fn get(&self, item: ItemId) -> StoreResult<Option<LanguageLinkSet>>;

    /// Replace the links of `item`. Never merges with the previous set.
    async fn set(&self, item: ItemId, links: &LanguageLinkSet) -> StoreResult<()>;
}

/// Named string settings.
#[async_trait]
pub trait OptionStore: Send + Sync {
    async fn get_option(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set_option(&self, key: &str, value: &str) -> StoreResult<()>;
}

// =============================================================================
// Feed Pointer
// =============================================================================

/// The configured feed URL, an empty value meaning "nothing scheduled".
#[derive(Clone)]
pub struct FeedPointer {
    options: Arc<dyn OptionStore>,
}

impl FeedPointer {
    pub fn new(options: Arc<dyn OptionStore>) -> Self {
        Self { options }
    }

    /// Current feed URL, trimmed; empty when unset.
    pub async fn get(&self) -> StoreResult<String> {
        Ok(self
            .options
            .get_option(IMPORT_FEED_URL_OPTION)
            .await?
            .map(|v| v.trim().to_string())
            .unwrap_or_default())
    }

    pub async fn set(&self, url: &str) -> StoreResult<()> {
        self.options.set_option(IMPORT_FEED_URL_OPTION, url.trim()).await
    }

    pub async fn clear(&self) -> StoreResult<()> {
        self.options.set_option(IMPORT_FEED_URL_OPTION, "").await
    }

    /// Clear the pointer only if it still holds `consumed`.
    ///
    /// A URL configured while a run was in flight survives the run.
    /// Returns whether the pointer was cleared.
    pub async fn clear_if(&self, consumed: &str) -> StoreResult<bool> {
        let current = self.get().await?;
        if !current.is_empty() && current == consumed.trim() {
            self.clear().await?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

// =============================================================================
// File Store
// =============================================================================

/// JSON documents on disk.
///
/// Writes go to a temporary file that is renamed over the target, so a
/// reader never sees a half-written link set.
pub struct FileStore {
    root: PathBuf,
    options_lock: tokio::sync::Mutex<()>,
}

impl FileStore {
    /// Open (and create) a store rooted at `dir`.
    pub async fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let root = PathBuf::from(dir.as_ref());
        fs::create_dir_all(root.join("items")).await?;
        Ok(Self {
            root,
            options_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn item_path(&self, item: ItemId) -> PathBuf {
        self.root.join("items").join(format!("{}.json", item))
    }

    fn options_path(&self) -> PathBuf {
        self.root.join("options.json")
    }

    async fn read_options(&self) -> StoreResult<BTreeMap<String, String>> {
        match read_optional(&self.options_path()).await? {
            Some(content) => Ok(serde_json::from_str(&content)?),
            None => Ok(BTreeMap::new()),
        }
    }
}

#[async_trait]
impl MetadataStore for FileStore {
    async fn get(&self, item: ItemId) -> StoreResult<Option<LanguageLinkSet>> {
        match read_optional(&self.item_path(item)).await? {
            Some(content) => Ok(Some(serde_json::from_str(&content)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, item: ItemId, links: &LanguageLinkSet) -> StoreResult<()> {
        let content = serde_json::to_string_pretty(links)?;
        write_atomic(&self.item_path(item), &content).await?;
        debug!(%item, languages = links.len(), "links stored");
        Ok(())
    }
}

#[async_trait]
impl OptionStore for FileStore {
    async fn get_option(&self, key: &str) -> StoreResult<Option<String>> {
        let _guard = self.options_lock.lock().await;
        Ok(self.read_options().await?.remove(key))
    }

    async fn set_option(&self, key: &str, value: &str) -> StoreResult<()> {
        let _guard = self.options_lock.lock().await;
        let mut options = self.read_options().await?;
        options.insert(key.to_string(), value.to_string());
        let content = serde_json::to_string_pretty(&options)?;
        write_atomic(&self.options_path(), &content).await?;
        Ok(())
    }
}

/// File content, `None` when the file does not exist.
async fn read_optional(path: &Path) -> std::io::Result<Option<String>> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

async fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content).await?;
    fs::rename(&tmp, path).await
}

// =============================================================================
// Memory Store
// =============================================================================

/// In-memory store. Counts link writes so callers can check for mutations.
#[derive(Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<ItemId, LanguageLinkSet>>,
    options: Mutex<HashMap<String, String>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful [`MetadataStore::set`] calls.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn get(&self, item: ItemId) -> StoreResult<Option<LanguageLinkSet>> {
        Ok(self.items.lock()?.get(&item).cloned())
    }

    async fn set(&self, item: ItemId, links: &LanguageLinkSet) -> StoreResult<()> {
        self.items.lock()?.insert(item, links.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl OptionStore for MemoryStore {
    async fn get_option(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.options.lock()?.get(key).cloned())
    }

    async fn set_option(&self, key: &str, value: &str) -> StoreResult<()> {
        self.options.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
