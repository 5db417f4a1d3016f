//! A hash index built over a bundle's documents and registered against the
//! same `Storage`, exercising S4/S5 end-to-end rather than against a bare file.

use bundlestore::document::Document;
use bundlestore::hash::HashIndex;
use bundlestore::types::FieldValue;
use bundlestore::{Storage, StorageConfig};

#[test]
fn scenario_s4_s5_hash_index_over_bundle_documents() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Storage::open(dir.path(), StorageConfig::default()).unwrap();
    storage.create_bundle("users").unwrap();

    let mut tid_of_email = std::collections::HashMap::new();
    for i in 0..500u32 {
        let email = format!("user{i}@example.com");
        let doc = Document::new(vec![("email".into(), FieldValue::Str(email.clone()))]);
        storage.add_document("users", doc).unwrap();
        tid_of_email.insert(email, u64::from(i));
    }

    let registry = storage.file_registry();
    let index = HashIndex::create(std::sync::Arc::clone(registry), "users.email.hidx", "email".into(), true).unwrap();
    for (email, tid) in &tid_of_email {
        index.insert(email.clone().into_bytes(), vec![], *tid).unwrap();
    }
    storage.indexes().register_hash("users", "email", index);

    let index = storage.indexes().hash("users", "email").unwrap();
    assert_eq!(index.find(b"user42@example.com").unwrap(), Some(u64::from(42)));
    assert_eq!(index.find(b"nobody@example.com").unwrap(), None);

    // S5: a unique index rejects a duplicate key and keeps the first tid.
    let err = index.insert(b"user42@example.com".to_vec(), vec![], 999);
    assert!(matches!(err, Err(bundlestore::errors::StorageError::DuplicateKey)));
    assert_eq!(index.find(b"user42@example.com").unwrap(), Some(42));

    storage.remove_bundle("users").unwrap();
    assert!(storage.indexes().hash("users", "email").is_none());
}
