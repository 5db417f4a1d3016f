//! Point, range, and prefix lookups over a built B-tree index via the buffer pool.

use crate::buffer_pool::BufferPool;
use crate::errors::Result;
use crate::types::Tid;

use super::build::BTreeMeta;

/// A single match: the indexed key's tuple id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub tid: Tid,
}

fn tid_of(value: &[u8]) -> Tid {
    let mut buf = [0u8; 8];
    let n = value.len().min(8);
    buf[..n].copy_from_slice(&value[..n]);
    Tid::from_le_bytes(buf)
}

/// Descends from the root to the leaf that would contain `key`.
fn descend_to_leaf(pool: &BufferPool, fid: u32, meta: &BTreeMeta, key: &[u8]) -> Result<u32> {
    let mut page_no = meta.root_page;
    loop {
        let raw = { pool.get_page(fid, u64::from(page_no))?.bytes() };
        let page = pool.parse(&raw)?;
        if page.header.page_type == 3 {
            return Ok(page_no);
        }
        let mut child = page.entries.first().map(|e| e.value.clone());
        for entry in &page.entries {
            if entry.key.as_slice() <= key {
                child = Some(entry.value.clone());
            } else {
                break;
            }
        }
        let Some(child_value) = child else { return Ok(page_no) };
        page_no = u32::from_le_bytes(child_value[..4].try_into().unwrap());
    }
}

pub fn find(pool: &BufferPool, fid: u32, meta: &BTreeMeta, key: &[u8]) -> Result<Option<Hit>> {
    let leaf_no = descend_to_leaf(pool, fid, meta, key)?;
    let raw = { pool.get_page(fid, u64::from(leaf_no))?.bytes() };
    let page = pool.parse(&raw)?;
    Ok(page.entries.iter().find(|e| e.key.as_slice() == key).map(|e| Hit { tid: tid_of(&e.value) }))
}

/// Ascending range scan over `[start, end]` (either bound optional).
pub fn find_range(
    pool: &BufferPool,
    fid: u32,
    meta: &BTreeMeta,
    start: Option<&[u8]>,
    end: Option<&[u8]>,
) -> Result<Vec<(Vec<u8>, Hit)>> {
    let mut leaf_no = match start {
        Some(k) => descend_to_leaf(pool, fid, meta, k)?,
        None => leftmost_leaf(pool, fid, meta)?,
    };
    let mut out = Vec::new();
    loop {
        let raw = { pool.get_page(fid, u64::from(leaf_no))?.bytes() };
        let page = pool.parse(&raw)?;
        for entry in &page.entries {
            if let Some(s) = start {
                if entry.key.as_slice() < s {
                    continue;
                }
            }
            if let Some(e) = end {
                if entry.key.as_slice() > e {
                    return Ok(out);
                }
            }
            out.push((entry.key.clone(), Hit { tid: tid_of(&entry.value) }));
        }
        if page.header.next_page == 0 {
            return Ok(out);
        }
        leaf_no = page.header.next_page;
    }
}

fn leftmost_leaf(pool: &BufferPool, fid: u32, meta: &BTreeMeta) -> Result<u32> {
    let mut page_no = meta.root_page;
    loop {
        let raw = { pool.get_page(fid, u64::from(page_no))?.bytes() };
        let page = pool.parse(&raw)?;
        if page.header.page_type == 3 {
            return Ok(page_no);
        }
        let Some(first) = page.entries.first() else { return Ok(page_no) };
        page_no = u32::from_le_bytes(first.value[..4].try_into().unwrap());
    }
}

/// Prefix lookup over a composite-key index: returns every entry whose encoded
/// key begins with `prefix`.
pub fn find_prefix(
    pool: &BufferPool,
    fid: u32,
    meta: &BTreeMeta,
    prefix: &[u8],
) -> Result<Vec<(Vec<u8>, Hit)>> {
    let upper = super::key::prefix_upper_bound(prefix);
    let all = find_range(pool, fid, meta, Some(prefix), upper.as_deref())?;
    Ok(all.into_iter().filter(|(k, _)| k.starts_with(prefix)).collect())
}
