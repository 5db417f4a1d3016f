//! Bounded-memory external sort: batch in memory, spill sorted runs to disk once
//! the budget is exceeded, then k-way merge the runs with a min-heap.

mod run;

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::PathBuf;

use tempfile::TempDir;

use crate::errors::Result;

use run::{Run, RunReader};

/// One item flowing through the sorter: a key, a document id, and an opaque
/// extra payload (a TID for B-tree bulk build).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortItem {
    pub key: Vec<u8>,
    pub doc_id: Vec<u8>,
    pub extra: Vec<u8>,
}

const ITEM_OVERHEAD: usize = 24;

/// Accumulates items up to a memory budget, spilling sorted runs to `temp_dir`.
pub struct ExternalSorter {
    max_memory_bytes: usize,
    temp_dir: TempDir,
    batch: Vec<SortItem>,
    batch_bytes: usize,
    runs: Vec<PathBuf>,
}

impl ExternalSorter {
    pub fn new(max_memory_bytes: usize, temp_dir_parent: Option<&std::path::Path>) -> Result<Self> {
        let temp_dir = match temp_dir_parent {
            Some(p) => tempfile::tempdir_in(p),
            None => tempfile::tempdir(),
        }
        .map_err(|e| crate::errors::StorageError::io("external-sort-tmp", e))?;
        Ok(Self {
            max_memory_bytes,
            temp_dir,
            batch: Vec::new(),
            batch_bytes: 0,
            runs: Vec::new(),
        })
    }

    pub fn add(&mut self, key: Vec<u8>, doc_id: Vec<u8>, extra: Vec<u8>) -> Result<()> {
        let size = key.len() + doc_id.len() + extra.len() + ITEM_OVERHEAD;
        if self.batch_bytes + size > self.max_memory_bytes && !self.batch.is_empty() {
            self.flush()?;
        }
        self.batch_bytes += size;
        self.batch.push(SortItem { key, doc_id, extra });
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.batch.sort_by(|a, b| a.key.cmp(&b.key));
        let run_path = self.temp_dir.path().join(format!("run-{}.bin", self.runs.len()));
        run::write_run(&run_path, &self.batch)?;
        self.runs.push(run_path);
        self.batch.clear();
        self.batch_bytes = 0;
        Ok(())
    }

    /// Flushes any remaining in-memory batch and returns an iterator over every
    /// item in ascending key order.
    pub fn sort(mut self) -> Result<SortedIter> {
        if self.runs.is_empty() {
            self.batch.sort_by(|a, b| a.key.cmp(&b.key));
            return Ok(SortedIter::InMemory { items: self.batch.into_iter(), _temp_dir: self.temp_dir });
        }
        if !self.batch.is_empty() {
            self.flush()?;
        }
        let mut readers = Vec::with_capacity(self.runs.len());
        for (i, path) in self.runs.iter().enumerate() {
            readers.push(RunReader::open(path, i)?);
        }
        let mut heap = BinaryHeap::with_capacity(readers.len());
        for reader in &mut readers {
            if let Some(item) = reader.pop()? {
                heap.push(HeapEntry { item, run: reader.index });
            }
        }
        Ok(SortedIter::Merging { readers, heap, _temp_dir: self.temp_dir })
    }
}

struct HeapEntry {
    item: SortItem,
    run: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.item.key == other.item.key && self.run == other.run
    }
}
impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the smallest key pops first.
        other.item.key.cmp(&self.item.key).then_with(|| other.run.cmp(&self.run))
    }
}

/// Iterator yielding sorted items, either straight from memory (no spill occurred)
/// or merged across spilled runs.
pub enum SortedIter {
    InMemory { items: std::vec::IntoIter<SortItem>, _temp_dir: TempDir },
    Merging { readers: Vec<RunReader>, heap: BinaryHeap<HeapEntry>, _temp_dir: TempDir },
}

impl SortedIter {
    pub fn try_next(&mut self) -> Result<Option<SortItem>> {
        match self {
            Self::InMemory { items, .. } => Ok(items.next()),
            Self::Merging { readers, heap, .. } => {
                let Some(HeapEntry { item, run }) = heap.pop() else { return Ok(None) };
                if let Some(next_item) = readers[run].pop()? {
                    heap.push(HeapEntry { item: next_item, run });
                }
                Ok(Some(item))
            }
        }
    }
}
