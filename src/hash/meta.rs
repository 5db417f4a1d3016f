//! Hash index meta page (block 0): linear-hashing state plus a durability marker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, StorageError};
use crate::file_registry::FileRegistry;
use crate::page::PAGE_SIZE;
use crate::utils::num::u32_to_usize;

use super::addressing::Addressing;

const MARKER: &[u8] = b"METADATA";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashMetaFields {
    pub max_bucket: u32,
    pub high_mask: u32,
    pub low_mask: u32,
    pub fill_factor: u8,
    pub num_tuples: u64,
    pub overflow_pages: u32,
    pub indexed_field: String,
    pub is_unique: bool,
    pub created_at: DateTime<Utc>,
}

impl HashMetaFields {
    #[must_use]
    pub fn addressing(&self) -> Addressing {
        Addressing { max_bucket: self.max_bucket, high_mask: self.high_mask, low_mask: self.low_mask }
    }
}

pub fn write(registry: &FileRegistry, fid: u32, meta: &HashMetaFields) -> Result<()> {
    let encoded = bincode::serde::encode_to_vec(meta, bincode::config::standard())?;
    let mut buf = Vec::with_capacity(PAGE_SIZE);
    buf.extend_from_slice(&0u32.to_le_bytes()); // page_type
    buf.extend_from_slice(&0u32.to_le_bytes()); // page_num
    buf.extend_from_slice(&0u32.to_le_bytes()); // next_page
    buf.extend_from_slice(&1u16.to_le_bytes()); // item_count
    buf.extend_from_slice(&0u16.to_le_bytes()); // free_space (informational)
    let ts = Utc::now().timestamp_millis().to_le_bytes();
    buf.extend_from_slice(&(ts.len() as u32).to_le_bytes());
    buf.extend_from_slice(&ts);
    buf.extend_from_slice(&(MARKER.len() as u32).to_le_bytes());
    buf.extend_from_slice(MARKER);
    buf.extend_from_slice(&(encoded.len() as u32).to_le_bytes());
    buf.extend_from_slice(&encoded);
    if buf.len() > PAGE_SIZE {
        return Err(StorageError::PageOverflow { size: buf.len(), max: PAGE_SIZE });
    }
    buf.resize(PAGE_SIZE, 0);
    registry.with_write(fid, |file| {
        use std::os::unix::fs::FileExt;
        file.write_at(&buf, 0)
    })
}

pub fn read(registry: &FileRegistry, fid: u32) -> Result<HashMetaFields> {
    let mut buf = vec![0u8; PAGE_SIZE];
    registry.with_read(fid, |file| {
        use std::os::unix::fs::FileExt;
        file.read_exact_at(&mut buf, 0)
    })?;
    let u32_at = |o: usize| u32::from_le_bytes(buf[o..o + 4].try_into().unwrap());
    let ts_len = u32_to_usize(u32_at(16));
    let mut off = 20 + ts_len;
    let marker_len = u32_to_usize(u32_at(off));
    off += 4;
    let marker = &buf[off..off + marker_len];
    if marker != MARKER {
        return Err(StorageError::CorruptMetaPage(format!(
            "expected marker {MARKER:?}, found {marker:?}"
        )));
    }
    off += marker_len;
    let meta_len = u32_to_usize(u32_at(off));
    off += 4;
    let meta_bytes = &buf[off..off + meta_len];
    let (meta, _): (HashMetaFields, _) =
        bincode::serde::decode_from_slice(meta_bytes, bincode::config::standard())?;
    Ok(meta)
}
