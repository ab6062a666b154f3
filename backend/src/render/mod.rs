//! Hreflang rendering.
//!
//! [`alternate_links`] is the pure part: stored link set plus default
//! language in, ordered [`HreflangLink`]s out. [`HreflangRenderer`] adds the
//! store read. Turning links into markup lives in [`markup`].

pub mod markup;

use std::sync::Arc;

use crate::error::StoreResult;
use crate::models::{HreflangLink, ItemId, LanguageCode, LanguageLinkSet};
use crate::store::MetadataStore;

pub use markup::{append_to_menu, head_links, links_fragment, PRIMARY_MENU};

/// Alternate links for a stored set, in stored order.
///
/// The entry whose raw code equals `default_language` (ignoring case) is left
/// out. Output codes go through [`LanguageCode::hreflang`].
pub fn alternate_links(links: &LanguageLinkSet, default_language: &LanguageCode) -> Vec<HreflangLink> {
    links
        .iter()
        .filter(|(code, _)| !code.matches(default_language))
        .map(|(code, url)| HreflangLink {
            hreflang: code.hreflang(),
            href: url.clone(),
        })
        .collect()
}

/// Reads an item's links from the store on every call.
#[derive(Clone)]
pub struct HreflangRenderer {
    store: Arc<dyn MetadataStore>,
    default_language: LanguageCode,
}

impl HreflangRenderer {
    pub fn new(store: Arc<dyn MetadataStore>, default_language: LanguageCode) -> Self {
        Self {
            store,
            default_language,
        }
    }

    pub fn default_language(&self) -> &LanguageCode {
        &self.default_language
    }

    /// Alternate links for `item`, empty when nothing is stored.
    pub async fn render(&self, item: ItemId, default_language: &LanguageCode) -> StoreResult<Vec<HreflangLink>> {
        Ok(self
            .stored(item)
            .await?
            .map(|links| alternate_links(&links, default_language))
            .unwrap_or_default())
    }

    /// [`render`](Self::render) with the site default language.
    pub async fn render_default(&self, item: ItemId) -> StoreResult<Vec<HreflangLink>> {
        self.render(item, &self.default_language).await
    }

    /// The stored set as is, for the visible fragment.
    pub async fn stored(&self, item: ItemId) -> StoreResult<Option<LanguageLinkSet>> {
        self.store.get(item).await
    }
}
