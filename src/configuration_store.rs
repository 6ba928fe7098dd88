//! Holds the feature catalog that evaluation reads and the poller replaces.
use std::sync::{Arc, RwLock};

use crate::FeatureCatalog;

/// Latest fetched [`FeatureCatalog`], shared by every evaluating thread and the poller thread.
///
/// Catalogs are never mutated in place. The poller swaps in a whole new `Arc`, and an evaluation
/// keeps the snapshot it cloned out even if a newer catalog lands meanwhile.
#[derive(Default)]
pub struct ConfigurationStore {
    catalog: RwLock<Option<Arc<FeatureCatalog>>>,
}

impl ConfigurationStore {
    pub fn new() -> Self {
        ConfigurationStore::default()
    }

    /// Snapshot of the current catalog, `None` until the first successful fetch.
    pub fn get_catalog(&self) -> Option<Arc<FeatureCatalog>> {
        // A poisoned lock reads as "no catalog": evaluation must not panic.
        let slot = self.catalog.read().ok()?;
        slot.clone()
    }

    /// Install `catalog`, returning the one it replaces.
    pub fn set_catalog(&self, catalog: FeatureCatalog) -> Option<Arc<FeatureCatalog>> {
        // Allocate outside of the write lock.
        let catalog = Arc::new(catalog);

        let mut slot = self.catalog.write().ok()?;
        slot.replace(catalog)
    }
}
