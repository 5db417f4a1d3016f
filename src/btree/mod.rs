//! B-tree secondary index: bulk build from a sorted stream, point/range/prefix lookup.

pub mod build;
pub mod key;
pub mod lookup;

pub use build::{bulk_build, read_meta, BTreeMeta, BuildOptions};
pub use lookup::{find, find_prefix, find_range, Hit};

use std::sync::Arc;

use crate::buffer_pool::{BufferPool, PageFamily};
use crate::errors::Result;
use crate::file_registry::FileRegistry;

/// A built, openable B-tree index file.
pub struct BTreeIndex {
    fid: u32,
    meta: BTreeMeta,
    pool: BufferPool,
}

impl BTreeIndex {
    /// Opens an already-built index file for reading.
    pub fn open(registry: Arc<FileRegistry>, relative_path: impl AsRef<std::path::Path>, pool_capacity: usize) -> Result<Self> {
        let fid = registry.register(relative_path);
        registry.acquire(fid)?;
        let meta = read_meta(&registry, fid)?;
        let pool = BufferPool::new(pool_capacity, registry, PageFamily::BTree);
        Ok(Self { fid, meta, pool })
    }

    #[must_use]
    pub fn meta(&self) -> &BTreeMeta {
        &self.meta
    }

    pub fn find(&self, key: &[u8]) -> Result<Option<Hit>> {
        lookup::find(&self.pool, self.fid, &self.meta, key)
    }

    pub fn find_range(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> Result<Vec<(Vec<u8>, Hit)>> {
        lookup::find_range(&self.pool, self.fid, &self.meta, start, end)
    }

    pub fn find_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Hit)>> {
        lookup::find_prefix(&self.pool, self.fid, &self.meta, prefix)
    }

    #[must_use]
    pub fn stats(&self) -> crate::buffer_pool::PoolStats {
        self.pool.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_registry::FsyncPolicy;
    use crate::sort::ExternalSorter;
    use crate::types::FieldValue;

    fn build_index(pairs: &[(i64, u64)], unique: bool) -> (Arc<FileRegistry>, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let dir_path = dir.path().to_path_buf();
        std::mem::forget(dir);
        let registry = Arc::new(FileRegistry::new(&dir_path, FsyncPolicy::Never));
        let fid = registry.register("v.idx");
        registry.acquire(fid).unwrap();

        let mut sorter = ExternalSorter::new(1 << 16, Some(&dir_path)).unwrap();
        let mut sorted_pairs = pairs.to_vec();
        sorted_pairs.sort_by_key(|(k, _)| *k);
        for (k, tid) in &sorted_pairs {
            let key = key::encode(&FieldValue::I64(*k));
            sorter.add(key, vec![], tid.to_le_bytes().to_vec()).unwrap();
        }
        let sorted = sorter.sort().unwrap();
        build::bulk_build(
            &registry,
            fid,
            sorted,
            "v".to_string(),
            BuildOptions { fill_factor: 70, is_unique: unique },
        )
        .unwrap();
        (registry, dir_path)
    }

    #[test]
    fn point_and_range_lookup() {
        let pairs = vec![(10, 1u64), (30, 2), (20, 3)];
        let (registry, _dir) = build_index(&pairs, false);
        let index = BTreeIndex::open(registry, "v.idx", 16).unwrap();

        let hit = index.find(&key::encode(&FieldValue::I64(20))).unwrap().unwrap();
        assert_eq!(hit.tid, 3);

        let range = index
            .find_range(
                Some(&key::encode(&FieldValue::I64(15))),
                Some(&key::encode(&FieldValue::I64(29))),
            )
            .unwrap();
        assert_eq!(range.iter().map(|(_, h)| h.tid).collect::<Vec<_>>(), vec![3]);

        let full = index.find_range(None, None).unwrap();
        assert_eq!(full.iter().map(|(_, h)| h.tid).collect::<Vec<_>>(), vec![1, 3, 2]);
    }

    #[test]
    fn bulk_build_at_scale_keeps_leaf_chain_intact() {
        let pairs: Vec<(i64, u64)> = (0..5000).map(|i| (i, i as u64)).collect();
        let (registry, _dir) = build_index(&pairs, false);
        let index = BTreeIndex::open(registry, "v.idx", 64).unwrap();
        let all = index.find_range(None, None).unwrap();
        assert_eq!(all.len(), 5000);
        let tids: Vec<u64> = all.iter().map(|(_, h)| h.tid).collect();
        let mut sorted_tids = tids.clone();
        sorted_tids.sort_unstable();
        assert_eq!(tids, sorted_tids);
        assert!(index.meta().height >= 1);
    }

    #[test]
    fn unique_build_rejects_duplicate_keys() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(FileRegistry::new(dir.path(), FsyncPolicy::Never));
        let fid = registry.register("dup.idx");
        registry.acquire(fid).unwrap();
        let mut sorter = ExternalSorter::new(1 << 16, Some(dir.path())).unwrap();
        for (k, tid) in [(1i64, 1u64), (1, 2)] {
            sorter.add(key::encode(&FieldValue::I64(k)), vec![], tid.to_le_bytes().to_vec()).unwrap();
        }
        let sorted = sorter.sort().unwrap();
        let result = build::bulk_build(
            &registry,
            fid,
            sorted,
            "v".into(),
            BuildOptions { fill_factor: 70, is_unique: true },
        );
        assert!(matches!(result, Err(crate::errors::StorageError::DuplicateKey)));
    }

    #[test]
    fn prefix_lookup_over_composite_key() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(FileRegistry::new(dir.path(), FsyncPolicy::Never));
        let fid = registry.register("composite.idx");
        registry.acquire(fid).unwrap();
        let mut sorter = ExternalSorter::new(1 << 16, Some(dir.path())).unwrap();
        let rows = [
            (vec![FieldValue::Str("a".into()), FieldValue::I64(1)], 1u64),
            (vec![FieldValue::Str("a".into()), FieldValue::I64(2)], 2),
            (vec![FieldValue::Str("b".into()), FieldValue::I64(1)], 3),
        ];
        let mut encoded: Vec<(Vec<u8>, u64)> =
            rows.iter().map(|(v, tid)| (key::encode_composite(v), *tid)).collect();
        encoded.sort_by(|a, b| a.0.cmp(&b.0));
        for (k, tid) in &encoded {
            sorter.add(k.clone(), vec![], tid.to_le_bytes().to_vec()).unwrap();
        }
        let sorted = sorter.sort().unwrap();
        build::bulk_build(
            &registry,
            fid,
            sorted,
            "composite".into(),
            BuildOptions { fill_factor: 70, is_unique: false },
        )
        .unwrap();
        let index = BTreeIndex::open(registry, "composite.idx", 16).unwrap();
        let prefix = key::encode_composite(&[FieldValue::Str("a".into())]);
        let hits = index.find_prefix(&prefix).unwrap();
        assert_eq!(hits.iter().map(|(_, h)| h.tid).collect::<Vec<_>>(), vec![1, 2]);
    }

    /// Regression for the inner-separator off-by-one: descent must land on the
    /// leaf whose own min key is `<=` the search key, not the previous leaf's.
    #[test]
    fn point_and_range_lookup_cross_leaf_boundaries() {
        let pairs: Vec<(i64, u64)> = (0..5000).map(|i| (i, i as u64)).collect();
        let (registry, _dir) = build_index(&pairs, false);
        let index = BTreeIndex::open(registry, "v.idx", 64).unwrap();
        assert!(index.meta().height >= 2, "test requires a multi-level tree to exercise descent");

        for k in [0i64, 1, 4999, 2500, 2501] {
            let hit = index.find(&key::encode(&FieldValue::I64(k))).unwrap();
            assert_eq!(hit.map(|h| h.tid), Some(k as u64), "find({k}) mismatched");
        }

        let range = index
            .find_range(
                Some(&key::encode(&FieldValue::I64(2500))),
                Some(&key::encode(&FieldValue::I64(2505))),
            )
            .unwrap();
        assert_eq!(
            range.iter().map(|(_, h)| h.tid).collect::<Vec<_>>(),
            vec![2500, 2501, 2502, 2503, 2504, 2505]
        );
    }
}
