use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::errors::{Result, StorageError};
use crate::utils::num::u32_to_usize;

use super::SortItem;

const READ_BUFFER_ITEMS: usize = 1000;

pub fn write_run(path: &Path, items: &[SortItem]) -> Result<()> {
    let file = File::create(path).map_err(|e| StorageError::io(path.display().to_string(), e))?;
    let mut w = BufWriter::with_capacity(64 * 1024, file);
    for item in items {
        write_field(&mut w, path, &item.key)?;
        write_field(&mut w, path, &item.doc_id)?;
        write_field(&mut w, path, &item.extra)?;
    }
    w.flush().map_err(|e| StorageError::io(path.display().to_string(), e))?;
    Ok(())
}

fn write_field(w: &mut impl Write, path: &Path, field: &[u8]) -> Result<()> {
    w.write_all(&(field.len() as u32).to_le_bytes())
        .map_err(|e| StorageError::io(path.display().to_string(), e))?;
    w.write_all(field).map_err(|e| StorageError::io(path.display().to_string(), e))
}

/// Sequential reader over one spill run with a bounded in-memory lookahead buffer.
pub struct RunReader {
    reader: BufReader<File>,
    buffer: std::collections::VecDeque<SortItem>,
    exhausted: bool,
    pub index: usize,
    path: std::path::PathBuf,
}

impl RunReader {
    pub fn open(path: &Path, index: usize) -> Result<Self> {
        let file = File::open(path).map_err(|e| StorageError::io(path.display().to_string(), e))?;
        Ok(Self {
            reader: BufReader::with_capacity(64 * 1024, file),
            buffer: std::collections::VecDeque::new(),
            exhausted: false,
            index,
            path: path.to_path_buf(),
        })
    }

    fn refill(&mut self) -> Result<()> {
        if self.exhausted {
            return Ok(());
        }
        for _ in 0..READ_BUFFER_ITEMS {
            match self.read_item()? {
                Some(item) => self.buffer.push_back(item),
                None => {
                    self.exhausted = true;
                    break;
                }
            }
        }
        Ok(())
    }

    fn read_item(&mut self) -> Result<Option<SortItem>> {
        let key = match self.read_field()? {
            Some(f) => f,
            None => return Ok(None),
        };
        let doc_id = self.read_field()?.ok_or_else(|| {
            StorageError::SortSpill(format!("truncated run at {}", self.path.display()))
        })?;
        let extra = self.read_field()?.ok_or_else(|| {
            StorageError::SortSpill(format!("truncated run at {}", self.path.display()))
        })?;
        Ok(Some(SortItem { key, doc_id, extra }))
    }

    fn read_field(&mut self) -> Result<Option<Vec<u8>>> {
        let mut len_buf = [0u8; 4];
        match self.reader.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(StorageError::io(self.path.display().to_string(), e)),
        }
        let len = u32_to_usize(u32::from_le_bytes(len_buf));
        let mut buf = vec![0u8; len];
        self.reader
            .read_exact(&mut buf)
            .map_err(|e| StorageError::io(self.path.display().to_string(), e))?;
        Ok(Some(buf))
    }

    pub fn pop(&mut self) -> Result<Option<SortItem>> {
        if self.buffer.is_empty() {
            self.refill()?;
        }
        Ok(self.buffer.pop_front())
    }
}
