#![forbid(unsafe_code)]

pub mod btree;
pub mod buffer_pool;
pub mod bundle;
pub mod document;
pub mod errors;
pub mod file_registry;
pub mod fsutil;
pub mod hash;
pub mod index_registry;
pub mod logger;
pub mod page;
pub mod sort;
pub mod types;
pub mod utils;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::bundle::{Bundle, BundleStore};
use crate::document::Document;
use crate::errors::Result;
use crate::file_registry::{FileRegistry, FsyncPolicy};
use crate::index_registry::IndexServiceRegistry;
use crate::types::DocumentId;

/// Tunables for one database's storage subsystem.
#[derive(Debug, Clone, Copy)]
pub struct StorageConfig {
    pub buffer_pool_capacity: usize,
    pub fsync_policy: FsyncPolicy,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { buffer_pool_capacity: 256, fsync_policy: FsyncPolicy::EveryN(64) }
    }
}

/// The storage engine core: owns the file registry, the bundle store, and the
/// index service registry for one on-disk database directory.
pub struct Storage {
    data_dir: PathBuf,
    registry: Arc<FileRegistry>,
    bundles: BundleStore,
    indexes: IndexServiceRegistry,
    config: StorageConfig,
}

impl Storage {
    /// Opens (creating if missing) a database rooted at `data_dir`.
    ///
    /// # Errors
    /// Returns an error if `data_dir` cannot be created.
    pub fn open(data_dir: impl Into<PathBuf>, config: StorageConfig) -> Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)
            .map_err(|e| crate::errors::StorageError::io(data_dir.display().to_string(), e))?;
        let registry = Arc::new(FileRegistry::new(&data_dir, config.fsync_policy));
        let bundles = BundleStore::new(&data_dir);
        Ok(Self { data_dir, registry, bundles, indexes: IndexServiceRegistry::new(), config })
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    #[must_use]
    pub fn indexes(&self) -> &IndexServiceRegistry {
        &self.indexes
    }

    #[must_use]
    pub fn config(&self) -> StorageConfig {
        self.config
    }

    pub fn create_bundle(&self, name: &str) -> Result<()> {
        let bundle = Bundle::new(name);
        self.bundles.create_bundle_file(&bundle)
    }

    pub fn load_bundle(&self, name: &str) -> Result<Bundle> {
        self.bundles.load(name)
    }

    pub fn add_document(&self, bundle_name: &str, document: Document) -> Result<DocumentId> {
        let mut bundle = self.bundles.load(bundle_name)?;
        let id = document.id;
        bundle.documents.insert(id, document);
        self.bundles.rewrite(&bundle)?;
        Ok(id)
    }

    pub fn update_document(&self, bundle_name: &str, document: Document) -> Result<()> {
        let mut bundle = self.bundles.load(bundle_name)?;
        bundle.documents.insert(document.id, document);
        self.bundles.rewrite(&bundle)
    }

    pub fn delete_document(&self, bundle_name: &str, document_id: &DocumentId) -> Result<bool> {
        let mut bundle = self.bundles.load(bundle_name)?;
        let removed = bundle.documents.remove(document_id).is_some();
        if removed {
            self.bundles.rewrite(&bundle)?;
        }
        Ok(removed)
    }

    pub fn remove_bundle(&self, name: &str) -> Result<()> {
        self.indexes.drop_bundle(name);
        self.bundles.remove_bundle_file(name)
    }

    #[must_use]
    pub fn file_registry(&self) -> &Arc<FileRegistry> {
        &self.registry
    }
}

/// Installs ambient logging for a process using this crate; safe to call more than once.
pub fn init_logging() -> std::result::Result<(), Box<dyn std::error::Error>> {
    logger::init(log::LevelFilter::Info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldValue;

    #[test]
    fn open_create_bundle_add_and_reload_document() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path(), StorageConfig::default()).unwrap();
        storage.create_bundle("widgets").unwrap();
        let doc = Document::new(vec![("v".into(), FieldValue::I64(7))]);
        let id = storage.add_document("widgets", doc).unwrap();

        let bundle = storage.load_bundle("widgets").unwrap();
        assert_eq!(bundle.documents.get(&id).unwrap().field("v"), Some(&FieldValue::I64(7)));
    }

    #[test]
    fn delete_document_removes_it() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path(), StorageConfig::default()).unwrap();
        storage.create_bundle("widgets").unwrap();
        let doc = Document::new(vec![("v".into(), FieldValue::I64(1))]);
        let id = storage.add_document("widgets", doc).unwrap();
        assert!(storage.delete_document("widgets", &id).unwrap());
        let bundle = storage.load_bundle("widgets").unwrap();
        assert!(bundle.documents.is_empty());
    }
}
