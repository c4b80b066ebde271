//! State behind the collection table: which collection, which page, what is
//! selected, and when the page has to be fetched again.

use crate::core::api::{ApiError, CollectionsApi};
use crate::core::models::{CollectionPage, Company, CompanyId};
use log::{info, warn};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub offset: u64,
    pub page_size: u32,
}

impl PageWindow {
    pub fn page_index(&self) -> u64 {
        self.offset / u64::from(self.page_size.max(1))
    }
}

/// Everything that determines which page is on screen.
///
/// The refresh epoch is part of the key so that bumping it forces a refetch
/// of an otherwise unchanged window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchKey {
    pub collection_id: String,
    pub offset: u64,
    pub page_size: u32,
    pub refresh_epoch: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LikedCollection {
    Unknown,
    Known(String),
    Unavailable(String),
}

pub struct CollectionView {
    active_collection: Option<String>,
    liked_collection: LikedCollection,
    window: PageWindow,
    selection: BTreeSet<CompanyId>,
    refresh_epoch: u64,
    page: Option<CollectionPage>,
    loaded_key: Option<FetchKey>,
}

impl CollectionView {
    pub fn new(page_size: u32) -> Self {
        Self {
            active_collection: None,
            liked_collection: LikedCollection::Unknown,
            window: PageWindow {
                offset: 0,
                page_size: page_size.max(1),
            },
            selection: BTreeSet::new(),
            refresh_epoch: 0,
            page: None,
            loaded_key: None,
        }
    }

    pub fn active_collection(&self) -> Option<&str> {
        self.active_collection.as_deref()
    }

    pub fn window(&self) -> PageWindow {
        self.window
    }

    pub fn selection(&self) -> &BTreeSet<CompanyId> {
        &self.selection
    }

    pub fn selected_ids(&self) -> Vec<CompanyId> {
        self.selection.iter().copied().collect()
    }

    pub fn refresh_epoch(&self) -> u64 {
        self.refresh_epoch
    }

    pub fn liked_collection(&self) -> &LikedCollection {
        &self.liked_collection
    }

    pub fn page(&self) -> Option<&CollectionPage> {
        self.page.as_ref()
    }

    pub fn companies(&self) -> &[Company] {
        self.page
            .as_ref()
            .map(|p| p.companies.as_slice())
            .unwrap_or_default()
    }

    pub fn total(&self) -> Option<u64> {
        self.page.as_ref().map(|p| p.total)
    }

    /// Switch collections. Any running batch operation is unaffected; the
    /// previous collection's rows are dropped until the new page loads.
    pub fn set_active_collection(&mut self, collection_id: &str) {
        info!("Switching to collection {collection_id}");
        self.active_collection = Some(collection_id.to_string());
        self.window.offset = 0;
        self.selection.clear();
        self.page = None;
        self.loaded_key = None;
    }

    pub fn set_page(&mut self, offset: u64, page_size: u32) {
        self.window = PageWindow {
            offset,
            page_size: page_size.max(1),
        };
    }

    pub fn next_page(&mut self) -> bool {
        let step = u64::from(self.window.page_size);
        let next = self.window.offset + step;
        match self.total() {
            Some(total) if next >= total => false,
            _ => {
                self.window.offset = next;
                true
            }
        }
    }

    pub fn prev_page(&mut self) -> bool {
        if self.window.offset == 0 {
            return false;
        }
        let step = u64::from(self.window.page_size);
        self.window.offset = self.window.offset.saturating_sub(step);
        true
    }

    /// Change the page size, keeping the first visible row on screen
    pub fn set_page_size(&mut self, page_size: u32) {
        let page_size = u64::from(page_size.max(1));
        let offset = (self.window.offset / page_size) * page_size;
        self.set_page(offset, page_size as u32);
    }

    pub fn fetch_key(&self) -> Option<FetchKey> {
        self.active_collection.as_ref().map(|id| FetchKey {
            collection_id: id.clone(),
            offset: self.window.offset,
            page_size: self.window.page_size,
            refresh_epoch: self.refresh_epoch,
        })
    }

    pub fn needs_fetch(&self) -> bool {
        self.pending_fetch().is_some()
    }

    /// Fetch the current window if its key changed since the last load.
    ///
    /// Returns whether a request was made.
    pub async fn sync_page(&mut self, api: &dyn CollectionsApi) -> Result<bool, ApiError> {
        let Some(key) = self.pending_fetch() else {
            return Ok(false);
        };

        let page = api
            .get_collection_page(&key.collection_id, key.offset, key.page_size)
            .await?;
        Ok(self.apply_page(key, page))
    }

    /// The key that still has to be fetched, if any
    pub fn pending_fetch(&self) -> Option<FetchKey> {
        self.fetch_key().filter(|key| self.loaded_key.as_ref() != Some(key))
    }

    /// Install a page fetched for `key`. A page for a key that is no longer
    /// current is dropped and `false` is returned.
    pub fn apply_page(&mut self, key: FetchKey, page: CollectionPage) -> bool {
        if self.fetch_key().as_ref() != Some(&key) {
            info!(
                "Dropping page for '{}' at offset {}; the view moved on",
                key.collection_id, key.offset
            );
            return false;
        }
        info!(
            "Loaded {} of {} companies from '{}' at offset {}",
            page.companies.len(),
            page.total,
            page.collection_name,
            key.offset
        );
        self.page = Some(page);
        self.loaded_key = Some(key);
        true
    }

    /// Replace the selection with every id in the active collection, using
    /// the id-only endpoint rather than paging through full rows.
    pub async fn select_all(&mut self, api: &dyn CollectionsApi) -> Result<usize, ApiError> {
        let Some(collection_id) = self.active_collection.clone() else {
            return Ok(0);
        };
        let ids = api.get_collection_company_ids(&collection_id).await?;
        Ok(self.apply_select_all(&collection_id, ids).unwrap_or(0))
    }

    /// Select `ids` if `collection_id` is still active; returns the new
    /// selection size, or `None` when the ids belong to another collection.
    pub fn apply_select_all(
        &mut self,
        collection_id: &str,
        ids: Vec<CompanyId>,
    ) -> Option<usize> {
        if self.active_collection.as_deref() != Some(collection_id) {
            return None;
        }
        self.selection = ids.into_iter().collect();
        Some(self.selection.len())
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn select(&mut self, company_id: CompanyId) {
        self.selection.insert(company_id);
    }

    pub fn toggle_selection(&mut self, company_id: CompanyId) -> bool {
        if !self.selection.remove(&company_id) {
            self.selection.insert(company_id);
            true
        } else {
            false
        }
    }

    pub fn is_selected(&self, company_id: CompanyId) -> bool {
        self.selection.contains(&company_id)
    }

    pub fn bump_refresh_epoch(&mut self) {
        self.refresh_epoch += 1;
    }

    /// Fetch and cache the Liked collection id. A failure leaves the view
    /// usable; it only means the Liked collection is never recognised.
    pub async fn load_liked_collection_id(
        &mut self,
        api: &dyn CollectionsApi,
    ) -> Result<(), ApiError> {
        match api.get_liked_collection_id().await {
            Ok(id) => {
                self.liked_collection = LikedCollection::Known(id);
                Ok(())
            }
            Err(e) => {
                warn!("Liked collection id unavailable: {e}");
                self.liked_collection = LikedCollection::Unavailable(e.to_string());
                Err(e)
            }
        }
    }

    pub fn is_liked_collection_active(&self) -> bool {
        match (&self.liked_collection, &self.active_collection) {
            (LikedCollection::Known(liked), Some(active)) => liked == active,
            _ => false,
        }
    }
}
