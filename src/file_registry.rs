//! Process-wide mapping from file path to a small integer file id, with
//! reference-counted handles and a per-file reader/writer lock.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::errors::{Result, StorageError};
use crate::fsutil::open_rw_no_trunc;

/// Controls how aggressively the buffer pool fsyncs after page writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsyncPolicy {
    Never,
    Always,
    EveryN(u32),
}

struct FileEntry {
    path: PathBuf,
    handle: RwLock<Option<File>>,
    refcount: Mutex<u32>,
}

/// Owns every open file a [`crate::buffer_pool::BufferPool`] may address, keyed by a
/// small `u32` file id. Writes only ever happen under `data_dir`.
pub struct FileRegistry {
    data_dir: PathBuf,
    policy: FsyncPolicy,
    by_path: Mutex<HashMap<PathBuf, u32>>,
    by_id: Mutex<HashMap<u32, Arc<FileEntry>>>,
    next_id: Mutex<u32>,
}

impl FileRegistry {
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>, policy: FsyncPolicy) -> Self {
        Self {
            data_dir: data_dir.into(),
            policy,
            by_path: Mutex::new(HashMap::new()),
            by_id: Mutex::new(HashMap::new()),
            next_id: Mutex::new(1),
        }
    }

    #[must_use]
    pub fn policy(&self) -> FsyncPolicy {
        self.policy
    }

    #[must_use]
    pub fn should_sync_writes(&self, writes_since_open: u32) -> bool {
        match self.policy {
            FsyncPolicy::Never => false,
            FsyncPolicy::Always => true,
            FsyncPolicy::EveryN(n) => n > 0 && writes_since_open % n == 0,
        }
    }

    fn resolve(&self, relative: &Path) -> PathBuf {
        self.data_dir.join(relative)
    }

    /// Idempotent: registering the same path twice returns the same id.
    pub fn register(&self, relative: impl AsRef<Path>) -> u32 {
        let path = self.resolve(relative.as_ref());
        let mut by_path = self.by_path.lock();
        if let Some(&fid) = by_path.get(&path) {
            return fid;
        }
        let mut next = self.next_id.lock();
        let fid = *next;
        *next += 1;
        drop(next);
        by_path.insert(path.clone(), fid);
        self.by_id.lock().insert(fid, Arc::new(FileEntry {
            path,
            handle: RwLock::new(None),
            refcount: Mutex::new(0),
        }));
        fid
    }

    fn entry(&self, fid: u32) -> Result<Arc<FileEntry>> {
        self.by_id.lock().get(&fid).cloned().ok_or(StorageError::UnknownFileId(fid))
    }

    /// Opens the backing file on first acquire (creating it if missing) and bumps
    /// the refcount. Release with [`Self::release`] once done.
    pub fn acquire(&self, fid: u32) -> Result<()> {
        let entry = self.entry(fid)?;
        {
            let mut guard = entry.handle.write();
            if guard.is_none() {
                let file = open_rw_no_trunc(&entry.path)
                    .map_err(|e| StorageError::io(entry.path.display().to_string(), e))?;
                *guard = Some(file);
            }
        }
        *entry.refcount.lock() += 1;
        Ok(())
    }

    pub fn release(&self, fid: u32) -> Result<()> {
        let entry = self.entry(fid)?;
        let mut refcount = entry.refcount.lock();
        *refcount = refcount.saturating_sub(1);
        if *refcount == 0 {
            *entry.handle.write() = None;
        }
        Ok(())
    }

    /// Runs `f` with shared read access to the file handle.
    pub fn with_read<T>(&self, fid: u32, f: impl FnOnce(&File) -> std::io::Result<T>) -> Result<T> {
        let entry = self.entry(fid)?;
        let guard = entry.handle.read();
        let file = guard.as_ref().ok_or(StorageError::UnknownFileId(fid))?;
        f(file).map_err(|e| StorageError::io(entry.path.display().to_string(), e))
    }

    /// Runs `f` with exclusive write access to the file handle.
    pub fn with_write<T>(
        &self,
        fid: u32,
        f: impl FnOnce(&File) -> std::io::Result<T>,
    ) -> Result<T> {
        let entry = self.entry(fid)?;
        let guard = entry.handle.write();
        let file = guard.as_ref().ok_or(StorageError::UnknownFileId(fid))?;
        f(file).map_err(|e| StorageError::io(entry.path.display().to_string(), e))
    }

    #[must_use]
    pub fn path_of(&self, fid: u32) -> Option<PathBuf> {
        self.by_id.lock().get(&fid).map(|e| e.path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Seek, SeekFrom, Write};

    #[test]
    fn register_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let reg = FileRegistry::new(dir.path(), FsyncPolicy::Never);
        let a = reg.register("bundle.bnd");
        let b = reg.register("bundle.bnd");
        assert_eq!(a, b);
        let c = reg.register("other.bnd");
        assert_ne!(a, c);
    }

    #[test]
    fn acquire_creates_and_release_closes() {
        let dir = tempfile::tempdir().unwrap();
        let reg = FileRegistry::new(dir.path(), FsyncPolicy::Never);
        let fid = reg.register("bundle.bnd");
        reg.acquire(fid).unwrap();
        reg.with_write(fid, |f| {
            let mut f = f;
            f.write_all(b"hello")
        })
        .unwrap();
        reg.with_read(fid, |f| {
            let mut f = f;
            f.seek(SeekFrom::Start(0))?;
            let mut buf = [0u8; 5];
            f.read_exact(&mut buf)?;
            assert_eq!(&buf, b"hello");
            Ok(())
        })
        .unwrap();
        reg.release(fid).unwrap();
    }

    #[test]
    fn unknown_fid_errors() {
        let dir = tempfile::tempdir().unwrap();
        let reg = FileRegistry::new(dir.path(), FsyncPolicy::Never);
        assert!(matches!(reg.acquire(99), Err(StorageError::UnknownFileId(99))));
    }
}
