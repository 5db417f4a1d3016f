//! Bottom-up B-tree bulk build from an ascending-sorted key stream.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, StorageError};
use crate::file_registry::FileRegistry;
use crate::page::{Entry, Page, PageHeader};
use crate::sort::SortedIter;
use crate::types::Tid;

const ENTRY_OVERHEAD: usize = 16;
const INNER_ENTRY_OVERHEAD: usize = 24;
const HEADER_OVERHEAD: usize = 24;

#[derive(Debug, Clone, Copy)]
pub struct BuildOptions {
    pub fill_factor: u8,
    pub is_unique: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self { fill_factor: 90, is_unique: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BTreeMeta {
    pub root_page: u32,
    pub height: u32,
    pub total_pages: u32,
    pub indexed_field: String,
    pub is_unique: bool,
    pub collation: Option<String>,
    pub created_at: chrono::DateTime<Utc>,
}

struct LeafAccumulator<'a> {
    fid: u32,
    registry: &'a FileRegistry,
    entries_per_leaf: usize,
    current: Vec<Entry>,
    page_no: u32,
    first_leaf: u32,
    leaf_min_keys: Vec<Vec<u8>>,
    leaf_page_nos: Vec<u32>,
    prev_leaf_page: u32,
    is_unique: bool,
    last_key: Option<Vec<u8>>,
}

impl<'a> LeafAccumulator<'a> {
    fn new(fid: u32, registry: &'a FileRegistry, entries_per_leaf: usize, is_unique: bool) -> Self {
        Self {
            fid,
            registry,
            entries_per_leaf,
            current: Vec::with_capacity(entries_per_leaf),
            page_no: 1,
            first_leaf: 1,
            leaf_min_keys: Vec::new(),
            leaf_page_nos: Vec::new(),
            prev_leaf_page: 0,
            is_unique,
            last_key: None,
        }
    }

    fn push(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        if self.is_unique {
            if let Some(last) = &self.last_key {
                if *last == key {
                    return Err(StorageError::DuplicateKey);
                }
            }
            self.last_key = Some(key.clone());
        }
        if self.current.len() >= self.entries_per_leaf.max(1) {
            self.flush_leaf(false)?;
        }
        if self.current.is_empty() {
            self.leaf_min_keys.push(key.clone());
            self.leaf_page_nos.push(self.page_no);
        }
        self.current.push(Entry::new(key, value));
        Ok(())
    }

    fn flush_leaf(&mut self, last: bool) -> Result<()> {
        if self.current.is_empty() && !last {
            return Ok(());
        }
        if self.current.is_empty() {
            return Ok(());
        }
        let mut header = PageHeader::leaf(self.page_no);
        header.prev_page = self.prev_leaf_page;
        header.next_page = 0; // patched below once we know the next page number
        let page = Page::new(header, std::mem::take(&mut self.current));
        write_page(self.registry, self.fid, self.page_no, &page)?;
        if self.prev_leaf_page != 0 {
            patch_next_page(self.registry, self.fid, self.prev_leaf_page, self.page_no)?;
        }
        self.prev_leaf_page = self.page_no;
        self.page_no += 1;
        Ok(())
    }

    fn finish(mut self) -> Result<(Vec<Vec<u8>>, Vec<u32>, u32)> {
        self.flush_leaf(true)?;
        Ok((self.leaf_min_keys, self.leaf_page_nos, self.page_no))
    }
}

fn write_page(registry: &FileRegistry, fid: u32, block: u32, page: &Page) -> Result<()> {
    let encoded = page.serialize()?;
    registry.with_write(fid, |file| {
        use std::os::unix::fs::FileExt;
        file.write_at(&encoded, u64::from(block) * crate::page::PAGE_SIZE as u64)
    })
}

fn read_page(registry: &FileRegistry, fid: u32, block: u32) -> Result<Page> {
    let mut buf = vec![0u8; crate::page::PAGE_SIZE];
    registry.with_read(fid, |file| {
        use std::os::unix::fs::FileExt;
        file.read_exact_at(&mut buf, u64::from(block) * crate::page::PAGE_SIZE as u64)
    })?;
    Page::parse_btree(&buf)
}

fn patch_next_page(registry: &FileRegistry, fid: u32, block: u32, next: u32) -> Result<()> {
    let mut page = read_page(registry, fid, block)?;
    page.header.next_page = next;
    write_page(registry, fid, block, &page)
}

/// Estimates how many entries of average size `avg` fit on one page at the given
/// fill factor, per the sizing formula in SPEC_FULL.md §4.6.1.
fn entries_per_page(avg_key_size: usize, fill_factor: u8, overhead: usize) -> usize {
    let usable = (crate::page::PAGE_SIZE as u64 * u64::from(fill_factor) / 100)
        .saturating_sub(HEADER_OVERHEAD as u64);
    let per_entry = (avg_key_size + overhead).max(1) as u64;
    (usable / per_entry).max(2) as usize
}

fn sample_avg_key_size(samples: &[Vec<u8>]) -> usize {
    if samples.is_empty() {
        return 16;
    }
    samples.iter().map(Vec::len).sum::<usize>() / samples.len()
}

/// Bulk-builds a B-tree index file from an ascending-sorted stream of
/// `(key, doc_id_bytes, tid)`. Writes pages through `registry` under file id `fid`
/// and returns the completed meta.
pub fn bulk_build(
    registry: &FileRegistry,
    fid: u32,
    mut sorted: SortedIter,
    indexed_field: String,
    options: BuildOptions,
) -> Result<BTreeMeta> {
    let mut samples = Vec::new();
    let mut pending = Vec::new();
    while samples.len() < 100 {
        match sorted.try_next()? {
            Some(item) => {
                samples.push(item.key.clone());
                pending.push(item);
            }
            None => break,
        }
    }
    let avg = sample_avg_key_size(&samples);
    let entries_per_leaf = entries_per_page(avg, options.fill_factor, ENTRY_OVERHEAD);

    let mut leaves = LeafAccumulator::new(fid, registry, entries_per_leaf, options.is_unique);
    for item in pending {
        let tid: Tid = tid_from_bytes(&item.extra);
        leaves.push(item.key, tid.to_le_bytes().to_vec())?;
    }
    while let Some(item) = sorted.try_next()? {
        let tid: Tid = tid_from_bytes(&item.extra);
        leaves.push(item.key, tid.to_le_bytes().to_vec())?;
    }
    let (mut level_keys, mut level_pages, mut next_page_no) = leaves.finish()?;

    if level_pages.is_empty() {
        // Empty input: a single empty leaf acts as the root.
        let header = PageHeader::leaf(1);
        write_page(registry, fid, 1, &Page::new(header, vec![]))?;
        let meta = BTreeMeta {
            root_page: 1,
            height: 1,
            total_pages: 1,
            indexed_field,
            is_unique: options.is_unique,
            collation: None,
            created_at: Utc::now(),
        };
        write_meta(registry, fid, &meta)?;
        return Ok(meta);
    }

    if level_pages.len() == 1 {
        promote_root(registry, fid, level_pages[0])?;
        let meta = BTreeMeta {
            root_page: level_pages[0],
            height: 1,
            total_pages: next_page_no - 1,
            indexed_field,
            is_unique: options.is_unique,
            collation: None,
            created_at: Utc::now(),
        };
        write_meta(registry, fid, &meta)?;
        return Ok(meta);
    }

    let mut height = 1u16;
    loop {
        let entries_per_inner = entries_per_page(24, options.fill_factor, INNER_ENTRY_OVERHEAD);
        let mut new_keys = Vec::new();
        let mut new_pages = Vec::new();
        let mut idx = 0;
        while idx < level_pages.len() {
            let end = (idx + entries_per_inner).min(level_pages.len());
            let chunk_keys = &level_keys[idx..end];
            let chunk_pages = &level_pages[idx..end];
            let parent_page_no = next_page_no;
            next_page_no += 1;

            let mut entries = Vec::with_capacity(chunk_pages.len());
            entries.push(Entry::new(chunk_keys[0].clone(), chunk_pages[0].to_le_bytes().to_vec()));
            for i in 1..chunk_pages.len() {
                entries.push(Entry::new(
                    chunk_keys[i].clone(),
                    chunk_pages[i].to_le_bytes().to_vec(),
                ));
            }
            let header = PageHeader::inner(parent_page_no, height);
            write_page(registry, fid, parent_page_no, &Page::new(header, entries))?;
            for &child in chunk_pages {
                set_parent(registry, fid, child, parent_page_no)?;
            }
            new_keys.push(chunk_keys[0].clone());
            new_pages.push(parent_page_no);
            idx = end;
        }
        height += 1;
        level_keys = new_keys;
        level_pages = new_pages;
        if level_pages.len() == 1 {
            break;
        }
    }

    promote_root(registry, fid, level_pages[0])?;
    let meta = BTreeMeta {
        root_page: level_pages[0],
        height: u32::from(height),
        total_pages: next_page_no - 1,
        indexed_field,
        is_unique: options.is_unique,
        collation: None,
        created_at: Utc::now(),
    };
    write_meta(registry, fid, &meta)?;
    Ok(meta)
}

fn tid_from_bytes(extra: &[u8]) -> Tid {
    let mut buf = [0u8; 8];
    let n = extra.len().min(8);
    buf[..n].copy_from_slice(&extra[..n]);
    Tid::from_le_bytes(buf)
}

fn set_parent(registry: &FileRegistry, fid: u32, block: u32, parent: u32) -> Result<()> {
    let mut page = read_page(registry, fid, block)?;
    page.header.parent_page = parent;
    write_page(registry, fid, block, &page)
}

fn promote_root(registry: &FileRegistry, fid: u32, root: u32) -> Result<()> {
    let mut page = read_page(registry, fid, root)?;
    page.header.page_type = 1; // PageType::Root
    write_page(registry, fid, root, &page)
}

fn write_meta(registry: &FileRegistry, fid: u32, meta: &BTreeMeta) -> Result<()> {
    let encoded = bincode::serde::encode_to_vec(meta, bincode::config::standard())?;
    let entry = Entry::new(vec![0u8], encoded);
    let header = PageHeader { page_type: 0, ..PageHeader::leaf(0) };
    write_page(registry, fid, 0, &Page::new(header, vec![entry]))
}

pub fn read_meta(registry: &FileRegistry, fid: u32) -> Result<BTreeMeta> {
    let page = read_page(registry, fid, 0)?;
    let entry = page
        .entries
        .first()
        .ok_or_else(|| StorageError::CorruptMetaPage("missing meta entry".into()))?;
    let (meta, _): (BTreeMeta, _) =
        bincode::serde::decode_from_slice(&entry.value, bincode::config::standard())?;
    Ok(meta)
}
