//! End-to-end exercise of the `Storage` facade: bundle creation, document
//! mutation, and reload from disk.

use bundlestore::document::Document;
use bundlestore::types::FieldValue;
use bundlestore::{Storage, StorageConfig};

fn open() -> (Storage, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let storage = Storage::open(dir.path(), StorageConfig::default()).unwrap();
    (storage, dir)
}

#[test]
fn bundle_survives_a_reopen() {
    let (storage, dir) = open();
    storage.create_bundle("widgets").unwrap();
    let id = storage
        .add_document("widgets", Document::new(vec![("sku".into(), FieldValue::Str("A-1".into()))]))
        .unwrap();
    drop(storage);

    let reopened = Storage::open(dir.path(), StorageConfig::default()).unwrap();
    let bundle = reopened.load_bundle("widgets").unwrap();
    assert_eq!(bundle.documents.get(&id).unwrap().field("sku"), Some(&FieldValue::Str("A-1".into())));
}

#[test]
fn update_replaces_fields_in_place() {
    let (storage, _dir) = open();
    storage.create_bundle("widgets").unwrap();
    let mut doc = Document::new(vec![("v".into(), FieldValue::I64(1))]);
    let id = storage.add_document("widgets", doc.clone()).unwrap();

    doc.id = id;
    doc.fields = vec![("v".into(), FieldValue::I64(2))];
    storage.update_document("widgets", doc).unwrap();

    let bundle = storage.load_bundle("widgets").unwrap();
    assert_eq!(bundle.documents.get(&id).unwrap().field("v"), Some(&FieldValue::I64(2)));
}

#[test]
fn remove_bundle_drops_its_indexes_and_file() {
    let (storage, _dir) = open();
    storage.create_bundle("widgets").unwrap();
    storage.add_document("widgets", Document::new(vec![])).unwrap();
    storage.remove_bundle("widgets").unwrap();
    assert!(storage.load_bundle("widgets").is_err());
}

/// S1: a three-document bundle over field `v` ({a:10, b:30, c:20}), looked up by
/// a freshly bulk-built B-tree index on that field. Row identity is carried as
/// the tid (row's position in an `a=0,b=1,c=2` table), not the document id.
#[test]
fn scenario_s1_point_and_range_lookup_over_bundle_field() {
    use bundlestore::btree::{self, key, BTreeIndex, BuildOptions};
    use bundlestore::file_registry::FsyncPolicy;
    use bundlestore::sort::ExternalSorter;
    use std::sync::Arc;

    let (storage, dir) = open();
    storage.create_bundle("rows").unwrap();
    let rows = [("a", 10i64, 0u64), ("b", 30, 1), ("c", 20, 2)];
    for (_name, v, _tid) in rows {
        storage.add_document("rows", Document::new(vec![("v".into(), FieldValue::I64(v))])).unwrap();
    }

    let registry = Arc::new(bundlestore::file_registry::FileRegistry::new(dir.path(), FsyncPolicy::Never));
    let fid = registry.register("v.idx");
    registry.acquire(fid).unwrap();
    let mut sorter = ExternalSorter::new(1 << 16, Some(dir.path())).unwrap();
    let mut sorted_rows = rows.to_vec();
    sorted_rows.sort_by_key(|(_, v, _)| *v);
    for (_, v, tid) in &sorted_rows {
        sorter.add(key::encode(&FieldValue::I64(*v)), vec![], tid.to_le_bytes().to_vec()).unwrap();
    }
    let sorted = sorter.sort().unwrap();
    btree::bulk_build(&registry, fid, sorted, "v".into(), BuildOptions { fill_factor: 70, is_unique: true })
        .unwrap();
    let index = BTreeIndex::open(registry, "v.idx", 16).unwrap();

    let hit = index.find(&key::encode(&FieldValue::I64(20))).unwrap().unwrap();
    assert_eq!(hit.tid, 2);

    let range = index
        .find_range(Some(&key::encode(&FieldValue::I64(15))), Some(&key::encode(&FieldValue::I64(29))))
        .unwrap();
    assert_eq!(range.iter().map(|(_, h)| h.tid).collect::<Vec<_>>(), vec![2]);

    let full = index.find_range(None, None).unwrap();
    assert_eq!(full.iter().map(|(_, h)| h.tid).collect::<Vec<_>>(), vec![0, 2, 1]);
}
