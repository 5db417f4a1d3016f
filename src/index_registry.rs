//! Per-database index service registry: the one process-wide mutable map the core
//! requires, mapping a bundle name to its open index handles. Passed explicitly as
//! `&IndexServiceRegistry` into operations that need it rather than held behind a
//! global `static`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::btree::BTreeIndex;
use crate::hash::HashIndex;

/// The open index handles for one bundle.
#[derive(Default)]
pub struct BundleIndexes {
    pub btree: HashMap<String, Arc<BTreeIndex>>,
    pub hash: HashMap<String, Arc<HashIndex>>,
}

/// Owns every open index for every bundle in one database.
#[derive(Default)]
pub struct IndexServiceRegistry {
    bundles: RwLock<HashMap<String, BundleIndexes>>,
}

impl IndexServiceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_btree(&self, bundle: &str, field: &str, index: BTreeIndex) {
        let mut bundles = self.bundles.write();
        let entry = bundles.entry(bundle.to_string()).or_default();
        entry.btree.insert(field.to_string(), Arc::new(index));
    }

    pub fn register_hash(&self, bundle: &str, field: &str, index: HashIndex) {
        let mut bundles = self.bundles.write();
        let entry = bundles.entry(bundle.to_string()).or_default();
        entry.hash.insert(field.to_string(), Arc::new(index));
    }

    #[must_use]
    pub fn btree(&self, bundle: &str, field: &str) -> Option<Arc<BTreeIndex>> {
        self.bundles.read().get(bundle)?.btree.get(field).cloned()
    }

    #[must_use]
    pub fn hash(&self, bundle: &str, field: &str) -> Option<Arc<HashIndex>> {
        self.bundles.read().get(bundle)?.hash.get(field).cloned()
    }

    /// Drops every index handle for a bundle, e.g. on bundle delete.
    pub fn drop_bundle(&self, bundle: &str) {
        self.bundles.write().remove(bundle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_registry::FsyncPolicy;
    use crate::file_registry::FileRegistry;

    #[test]
    fn register_and_lookup_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(FileRegistry::new(dir.path(), FsyncPolicy::Never));
        let hash_index = HashIndex::create(registry, "v.hidx", "v".into(), false).unwrap();

        let service = IndexServiceRegistry::new();
        service.register_hash("widgets", "v", hash_index);
        assert!(service.hash("widgets", "v").is_some());
        assert!(service.hash("widgets", "missing").is_none());

        service.drop_bundle("widgets");
        assert!(service.hash("widgets", "v").is_none());
    }
}
