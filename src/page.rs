//! Fixed-size page codec shared by bundle files, B-tree index files, and hash index files.
//!
//! Every page is exactly [`PAGE_SIZE`] bytes on disk: a header, a sequence of
//! length-prefixed entries, and zero padding out to the page boundary.

use crate::errors::{Result, StorageError};
use crate::utils::num::{u16_to_usize, u32_to_usize};

/// Fixed page size in bytes, per the on-disk layout.
pub const PAGE_SIZE: usize = 8192;

/// Page header size in bytes (matches [`PageHeader`]'s fixed-width encoding).
pub const HEADER_SIZE: usize = 26;

pub const FORMAT_VERSION: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    Meta,
    Root,
    Inner,
    Leaf,
    Bucket,
    Overflow,
}

impl PageType {
    const fn as_u32(self) -> u32 {
        match self {
            Self::Meta | Self::Bucket => 0,
            Self::Root => 1,
            Self::Inner | Self::Overflow => 2,
            Self::Leaf => 3,
        }
    }

    /// Resolve a raw tag into a page type given which family the file belongs to.
    /// B-tree files distinguish root/inner/leaf by tag 1/2/3; hash files reuse 0/2
    /// for bucket/overflow. Callers that know their file kind pass the expected set.
    fn from_u32_btree(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(Self::Meta),
            1 => Some(Self::Root),
            2 => Some(Self::Inner),
            3 => Some(Self::Leaf),
            _ => None,
        }
    }

    fn from_u32_hash(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(Self::Meta).or(Some(Self::Bucket)),
            2 => Some(Self::Overflow),
            _ => None,
        }
    }
}

/// Fixed-width header present at the front of every page.
#[derive(Debug, Clone, Copy)]
pub struct PageHeader {
    pub page_type: u32,
    pub page_num: u32,
    pub parent_page: u32,
    pub prev_page: u32,
    pub next_page: u32,
    pub level: u16,
    pub num_entries: u16,
    pub format_version: u8,
}

impl PageHeader {
    #[must_use]
    pub const fn leaf(page_num: u32) -> Self {
        Self {
            page_type: PageType::Leaf.as_u32(),
            page_num,
            parent_page: 0,
            prev_page: 0,
            next_page: 0,
            level: 0,
            num_entries: 0,
            format_version: FORMAT_VERSION,
        }
    }

    #[must_use]
    pub const fn inner(page_num: u32, level: u16) -> Self {
        Self {
            page_type: PageType::Inner.as_u32(),
            page_num,
            parent_page: 0,
            prev_page: 0,
            next_page: 0,
            level,
            num_entries: 0,
            format_version: FORMAT_VERSION,
        }
    }

    fn write_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.page_type.to_le_bytes());
        buf.extend_from_slice(&self.page_num.to_le_bytes());
        buf.extend_from_slice(&self.parent_page.to_le_bytes());
        buf.extend_from_slice(&self.prev_page.to_le_bytes());
        buf.extend_from_slice(&self.next_page.to_le_bytes());
        buf.extend_from_slice(&self.level.to_le_bytes());
        buf.extend_from_slice(&self.num_entries.to_le_bytes());
        buf.push(self.format_version);
        buf.push(0); // pad to HEADER_SIZE
    }

    fn read_from(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(StorageError::MalformedPage(format!(
                "header truncated: {} < {HEADER_SIZE}",
                buf.len()
            )));
        }
        let u32_at = |o: usize| u32::from_le_bytes(buf[o..o + 4].try_into().unwrap());
        let u16_at = |o: usize| u16::from_le_bytes(buf[o..o + 2].try_into().unwrap());
        let format_version = buf[24];
        if format_version != FORMAT_VERSION {
            return Err(StorageError::MalformedPage(format!(
                "unsupported format version {format_version}"
            )));
        }
        Ok(Self {
            page_type: u32_at(0),
            page_num: u32_at(4),
            parent_page: u32_at(8),
            prev_page: u32_at(12),
            next_page: u32_at(16),
            level: u16_at(20),
            num_entries: u16_at(22),
            format_version,
        })
    }
}

/// A key/value entry within a page: `{key_len, key, value_len, value}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Entry {
    #[must_use]
    pub fn new(key: Vec<u8>, value: Vec<u8>) -> Self {
        Self { key, value }
    }

    fn encoded_len(&self) -> usize {
        8 + self.key.len() + self.value.len()
    }
}

/// A fully decoded page: header plus its ordered entries.
#[derive(Debug, Clone)]
pub struct Page {
    pub header: PageHeader,
    pub entries: Vec<Entry>,
}

impl Page {
    #[must_use]
    pub fn new(header: PageHeader, entries: Vec<Entry>) -> Self {
        Self { header, entries }
    }

    /// Serialize into exactly [`PAGE_SIZE`] bytes, zero-padded. Fails if the
    /// populated body would overflow the page.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut header = self.header;
        header.num_entries = u16::try_from(self.entries.len()).map_err(|_| {
            StorageError::PageOverflow { size: self.entries.len(), max: u16::MAX as usize }
        })?;
        let mut buf = Vec::with_capacity(PAGE_SIZE);
        header.write_to(&mut buf);
        for e in &self.entries {
            buf.extend_from_slice(&(e.key.len() as u32).to_le_bytes());
            buf.extend_from_slice(&e.key);
            buf.extend_from_slice(&(e.value.len() as u32).to_le_bytes());
            buf.extend_from_slice(&e.value);
        }
        if buf.len() > PAGE_SIZE {
            return Err(StorageError::PageOverflow { size: buf.len(), max: PAGE_SIZE });
        }
        buf.resize(PAGE_SIZE, 0);
        Ok(buf)
    }

    /// Parse a page known to be from a B-tree file (root/inner/leaf/meta tags).
    pub fn parse_btree(buf: &[u8]) -> Result<Self> {
        Self::parse_with(buf, PageType::from_u32_btree)
    }

    /// Parse a page known to be from a hash index file (meta/bucket/overflow tags).
    pub fn parse_hash(buf: &[u8]) -> Result<Self> {
        Self::parse_with(buf, PageType::from_u32_hash)
    }

    fn parse_with(buf: &[u8], resolve: impl Fn(u32) -> Option<PageType>) -> Result<Self> {
        if buf.len() < PAGE_SIZE {
            return Err(StorageError::MalformedPage(format!(
                "page shorter than {PAGE_SIZE}: {}",
                buf.len()
            )));
        }
        let header = PageHeader::read_from(buf)?;
        if resolve(header.page_type).is_none() {
            return Err(StorageError::MalformedPage(format!(
                "unrecognized page_type {}",
                header.page_type
            )));
        }
        let mut entries = Vec::with_capacity(u16_to_usize(header.num_entries));
        let mut off = HEADER_SIZE;
        for _ in 0..header.num_entries {
            let (key, value, next) = read_entry(buf, off)?;
            entries.push(Entry::new(key, value));
            off = next;
        }
        Ok(Self { header, entries })
    }

    pub fn body_len(&self) -> usize {
        HEADER_SIZE + self.entries.iter().map(Entry::encoded_len).sum::<usize>()
    }
}

fn read_entry(buf: &[u8], off: usize) -> Result<(Vec<u8>, Vec<u8>, usize)> {
    let read_u32 = |at: usize| -> Result<u32> {
        buf.get(at..at + 4)
            .map(|b| u32::from_le_bytes(b.try_into().unwrap()))
            .ok_or_else(|| StorageError::MalformedPage("entry length truncated".into()))
    };
    let key_len = u32_to_usize(read_u32(off)?);
    let key_start = off + 4;
    let key_end = key_start.checked_add(key_len).filter(|&e| e <= buf.len()).ok_or_else(|| {
        StorageError::MalformedPage(format!("key_len {key_len} exceeds page bound"))
    })?;
    let key = buf[key_start..key_end].to_vec();
    let value_len = u32_to_usize(read_u32(key_end)?);
    let value_start = key_end + 4;
    let value_end =
        value_start.checked_add(value_len).filter(|&e| e <= buf.len()).ok_or_else(|| {
            StorageError::MalformedPage(format!("value_len {value_len} exceeds page bound"))
        })?;
    let value = buf[value_start..value_end].to_vec();
    Ok((key, value, value_end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_leaf_page() {
        let header = PageHeader::leaf(3);
        let entries = vec![
            Entry::new(b"alpha".to_vec(), 1u64.to_le_bytes().to_vec()),
            Entry::new(b"beta".to_vec(), 2u64.to_le_bytes().to_vec()),
        ];
        let page = Page::new(header, entries.clone());
        let bytes = page.serialize().unwrap();
        assert_eq!(bytes.len(), PAGE_SIZE);
        let parsed = Page::parse_btree(&bytes).unwrap();
        assert_eq!(parsed.entries, entries);
        assert_eq!(parsed.header.page_num, 3);
    }

    #[test]
    fn overflow_is_rejected() {
        let header = PageHeader::leaf(0);
        let entries = vec![Entry::new(vec![0u8; PAGE_SIZE], vec![])];
        let page = Page::new(header, entries);
        assert!(matches!(page.serialize(), Err(StorageError::PageOverflow { .. })));
    }

    #[test]
    fn rejects_truncated_bytes() {
        let short = vec![0u8; PAGE_SIZE - 1];
        assert!(Page::parse_btree(&short).is_err());
    }
}
