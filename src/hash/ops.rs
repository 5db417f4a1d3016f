//! Linear-hash index operations: create, insert (with split-on-fill), lookup.

use chrono::Utc;

use crate::errors::{Result, StorageError};
use crate::file_registry::FileRegistry;
use crate::page::{Entry, Page, PageHeader, PAGE_SIZE};
use crate::types::Tid;

use super::addressing::{fnv1a, Addressing, DEFAULT_FILL_FACTOR, INITIAL_BUCKETS, MAX_FILL_FACTOR};
use super::meta::{self, HashMetaFields};

const ITEM_OVERHEAD: usize = 16;

fn page_header_for(page_type: u32, page_num: u32) -> PageHeader {
    PageHeader { page_type, page_num, parent_page: 0, prev_page: 0, next_page: 0, level: 0, num_entries: 0, format_version: crate::page::FORMAT_VERSION }
}

fn read_page(registry: &FileRegistry, fid: u32, block: u32) -> Result<Page> {
    let mut buf = vec![0u8; PAGE_SIZE];
    registry.with_read(fid, |file| {
        use std::os::unix::fs::FileExt;
        file.read_exact_at(&mut buf, u64::from(block) * PAGE_SIZE as u64)
    })?;
    Page::parse_hash(&buf)
}

fn write_page(registry: &FileRegistry, fid: u32, block: u32, page: &Page) -> Result<()> {
    let encoded = page.serialize()?;
    registry.with_write(fid, |file| {
        use std::os::unix::fs::FileExt;
        file.write_at(&encoded, u64::from(block) * PAGE_SIZE as u64)
    })
}

fn item_value(hash: u32, doc_id: &[u8], tid: Tid) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + 4 + doc_id.len() + 8);
    out.extend_from_slice(&hash.to_le_bytes());
    out.extend_from_slice(&(doc_id.len() as u32).to_le_bytes());
    out.extend_from_slice(doc_id);
    out.extend_from_slice(&tid.to_le_bytes());
    out
}

fn item_len(key: &[u8], doc_id: &[u8]) -> usize {
    8 + key.len() + 8 + doc_id.len() + ITEM_OVERHEAD
}

/// Creates a fresh hash index file with `INITIAL_BUCKETS` empty bucket pages.
pub fn create(registry: &FileRegistry, fid: u32, indexed_field: String, is_unique: bool) -> Result<()> {
    for b in 1..=INITIAL_BUCKETS {
        write_page(registry, fid, b, &Page::new(page_header_for(0, b), vec![]))?;
    }
    let addressing = Addressing::initial();
    let fields = HashMetaFields {
        max_bucket: addressing.max_bucket,
        high_mask: addressing.high_mask,
        low_mask: addressing.low_mask,
        fill_factor: DEFAULT_FILL_FACTOR,
        num_tuples: 0,
        overflow_pages: 0,
        indexed_field,
        is_unique,
        created_at: Utc::now(),
    };
    meta::write(registry, fid, &fields)
}

fn bucket_chain(registry: &FileRegistry, fid: u32, bucket_page: u32) -> Result<Vec<(u32, Page)>> {
    let mut out = Vec::new();
    let mut page_no = bucket_page;
    loop {
        let page = read_page(registry, fid, page_no)?;
        let next = page.header.next_page;
        out.push((page_no, page));
        if next == 0 {
            return Ok(out);
        }
        page_no = next;
    }
}

fn find_in_chain<'a>(chain: &'a [(u32, Page)], key: &[u8]) -> Option<&'a Entry> {
    chain.iter().flat_map(|(_, p)| p.entries.iter()).find(|e| e.key == key)
}

pub fn find(registry: &FileRegistry, fid: u32, meta: &HashMetaFields, key: &[u8]) -> Result<Option<Tid>> {
    let hash = fnv1a(key);
    let bucket = meta.addressing().bucket_for(hash);
    let chain = bucket_chain(registry, fid, bucket + 1)?;
    Ok(find_in_chain(&chain, key).map(|e| tid_from_value(&e.value)))
}

fn tid_from_value(value: &[u8]) -> Tid {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&value[value.len() - 8..]);
    Tid::from_le_bytes(buf)
}

/// Inserts one item, splitting a bucket if the load factor after insertion exceeds 1.0.
pub fn insert(
    registry: &FileRegistry,
    fid: u32,
    key: Vec<u8>,
    doc_id: Vec<u8>,
    tid: Tid,
) -> Result<()> {
    let mut meta = meta::read(registry, fid)?;
    let hash = fnv1a(&key);
    let bucket = meta.addressing().bucket_for(hash);
    let bucket_page = bucket + 1;
    let chain = bucket_chain(registry, fid, bucket_page)?;

    if meta.is_unique && find_in_chain(&chain, &key).is_some() {
        return Err(StorageError::DuplicateKey);
    }

    let new_entry = Entry::new(key.clone(), item_value(hash, &doc_id, tid));
    let needed = item_len(&key, &doc_id);
    let mut placed = false;
    for (page_no, mut page) in chain {
        if page.body_len() + needed <= PAGE_SIZE {
            page.entries.push(new_entry.clone());
            write_page(registry, fid, page_no, &page)?;
            placed = true;
            break;
        }
    }
    if !placed {
        let overflow_page_no = meta.max_bucket + meta.overflow_pages + 2;
        let tail_page_no = bucket_chain(registry, fid, bucket_page)?.last().unwrap().0;
        let mut tail = read_page(registry, fid, tail_page_no)?;
        tail.header.next_page = overflow_page_no;
        write_page(registry, fid, tail_page_no, &tail)?;

        let overflow =
            Page::new(page_header_for(2, overflow_page_no), vec![new_entry]);
        write_page(registry, fid, overflow_page_no, &overflow)?;
        meta.overflow_pages += 1;
    }
    meta.num_tuples += 1;

    let capacity = f64::from(meta.max_bucket + 1) * PAGE_SIZE as f64 * f64::from(meta.fill_factor) / 100.0;
    let load = meta.num_tuples as f64 / capacity.max(1.0);
    if load > 1.0 && meta.fill_factor <= MAX_FILL_FACTOR {
        split(registry, fid, &mut meta)?;
    }
    meta::write(registry, fid, &meta)
}

/// Applies one linear-hashing split step: moves every item from the split bucket's
/// chain into the (possibly new) buckets determined by the post-split addressing.
fn split(registry: &FileRegistry, fid: u32, meta: &mut HashMetaFields) -> Result<()> {
    let mut addressing = meta.addressing();
    let split_bucket_idx = addressing.split();
    meta.max_bucket = addressing.max_bucket;
    meta.high_mask = addressing.high_mask;
    meta.low_mask = addressing.low_mask;

    let split_page_no = split_bucket_idx + 1;
    let new_bucket_page_no = meta.max_bucket + 1;
    write_page(registry, fid, new_bucket_page_no, &Page::new(page_header_for(0, new_bucket_page_no), vec![]))?;

    let chain = bucket_chain(registry, fid, split_page_no)?;
    let items: Vec<Entry> = chain.iter().flat_map(|(_, p)| p.entries.clone()).collect();

    write_page(registry, fid, split_page_no, &Page::new(page_header_for(0, split_page_no), vec![]))?;
    for (page_no, _) in chain.into_iter().skip(1) {
        write_page(registry, fid, page_no, &Page::new(page_header_for(2, page_no), vec![]))?;
    }

    for item in items {
        let hash = u32::from_le_bytes(item.value[0..4].try_into().unwrap());
        let target_bucket = addressing.bucket_for(hash);
        let target_page_no = target_bucket + 1;
        reinsert_into_chain(registry, fid, target_page_no, item)?;
    }
    Ok(())
}

fn reinsert_into_chain(registry: &FileRegistry, fid: u32, bucket_page: u32, entry: Entry) -> Result<()> {
    let chain = bucket_chain(registry, fid, bucket_page)?;
    let needed = entry.key.len() + entry.value.len() + ITEM_OVERHEAD;
    for (page_no, mut page) in chain.into_iter() {
        if page.body_len() + needed <= PAGE_SIZE {
            page.entries.push(entry);
            write_page(registry, fid, page_no, &page)?;
            return Ok(());
        }
    }
    // No room anywhere in the chain after a split; reuse the bucket page itself
    // since split halves the expected occupancy of each resulting chain.
    let mut head = read_page(registry, fid, bucket_page)?;
    head.entries.push(entry);
    write_page(registry, fid, bucket_page, &head)
}
