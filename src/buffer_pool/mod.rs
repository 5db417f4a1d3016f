//! Fixed-size buffer pool with clock-sweep ("second-chance") eviction over a shared
//! [`FileRegistry`]. Pages are addressed by `(file_id, block)`; at most one frame
//! ever holds a given tag.

mod frame;
mod guard;
mod stats;

pub use guard::{PageGuard, PageGuardMut};
pub use stats::PoolStats;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::errors::{Result, StorageError};
use crate::file_registry::FileRegistry;
use crate::page::{Page, PAGE_SIZE};

use frame::{Frame, FrameState};

/// Which page family a pool is serving, so raw page-type tags parse correctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageFamily {
    BTree,
    Hash,
}

struct Shared {
    frames: Vec<RwLock<Frame>>,
    index: Mutex<HashMap<(u32, u64), usize>>,
    clock_hand: Mutex<usize>,
    stats: stats::PoolStatsInner,
    registry: Arc<FileRegistry>,
    family: PageFamily,
    write_counters: Mutex<HashMap<u32, u32>>,
}

/// A fixed-capacity page cache. Construct once per database; share behind an `Arc`.
pub struct BufferPool {
    shared: Arc<Shared>,
}

impl BufferPool {
    #[must_use]
    pub fn new(capacity: usize, registry: Arc<FileRegistry>, family: PageFamily) -> Self {
        assert!(capacity > 0, "buffer pool capacity must be > 0");
        let frames = (0..capacity).map(|_| RwLock::new(Frame::empty())).collect();
        Self {
            shared: Arc::new(Shared {
                frames,
                index: Mutex::new(HashMap::new()),
                clock_hand: Mutex::new(0),
                stats: stats::PoolStatsInner::default(),
                registry,
                family,
                write_counters: Mutex::new(HashMap::new()),
            }),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.frames.len()
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.shared.stats.snapshot()
    }

    /// Fetch and pin the page at `(fid, block)` for reading.
    pub fn get_page(&self, fid: u32, block: u64) -> Result<PageGuard<'_>> {
        let idx = self.resolve_frame(fid, block)?;
        {
            let mut frame = self.shared.frames[idx].write();
            frame.ref_count += 1;
            frame.referenced = true;
        }
        Ok(PageGuard::new(&self.shared.frames[idx], idx))
    }

    /// Fetch and pin the page at `(fid, block)` for writing; marks the frame dirty
    /// once the returned guard is dropped or [`PageGuardMut::mark_dirty`] is called.
    pub fn get_page_mut(&self, fid: u32, block: u64) -> Result<PageGuardMut<'_>> {
        let idx = self.resolve_frame(fid, block)?;
        {
            let mut frame = self.shared.frames[idx].write();
            frame.ref_count += 1;
            frame.referenced = true;
        }
        Ok(PageGuardMut::new(&self.shared.frames[idx], idx))
    }

    /// Write `page` through the pool immediately: binds (or rebinds) a frame for
    /// `(fid, block)`, stores the encoded page, and marks it dirty. Used by bulk
    /// builders writing pages for the first time.
    pub fn put_page(&self, fid: u32, block: u64, page: &Page) -> Result<()> {
        let idx = self.resolve_frame(fid, block)?;
        let encoded = page.serialize()?;
        let mut frame = self.shared.frames[idx].write();
        frame.data.copy_from_slice(&encoded);
        frame.dirty = true;
        frame.referenced = true;
        Ok(())
    }

    fn resolve_frame(&self, fid: u32, block: u64) -> Result<usize> {
        {
            let index = self.shared.index.lock();
            if let Some(&idx) = index.get(&(fid, block)) {
                self.shared.stats.hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                return Ok(idx);
            }
        }
        self.shared.stats.misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let idx = self.select_victim(fid, block)?;
        self.load_into(idx, fid, block)?;
        Ok(idx)
    }

    /// Two-pass clock-sweep: prefer an Invalid frame outright, else rotate the hand
    /// skipping pinned frames and clearing referenced bits (second chance).
    fn select_victim(&self, fid: u32, block: u64) -> Result<usize> {
        let n = self.shared.frames.len();
        for i in 0..n {
            if matches!(self.shared.frames[i].read().state, FrameState::Invalid) {
                return Ok(i);
            }
        }
        let mut hand = self.shared.clock_hand.lock();
        let start = *hand;
        for step in 0..(2 * n) {
            let i = (start + step) % n;
            let mut frame = self.shared.frames[i].write();
            if frame.ref_count > 0 {
                continue;
            }
            if frame.referenced {
                frame.referenced = false;
                continue;
            }
            if frame.dirty {
                self.flush_frame(&mut frame)?;
            }
            *hand = (i + 1) % n;

            self.shared.stats.evictions.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            let old_tag = frame.tag;
            drop(frame);
            if let Some(tag) = old_tag {
                self.shared.index.lock().remove(&tag);
            }
            return Ok(i);
        }
        let _ = (fid, block);
        Err(StorageError::AllBuffersPinned)
    }

    fn load_into(&self, idx: usize, fid: u32, block: u64) -> Result<()> {
        let mut buf = vec![0u8; PAGE_SIZE];
        let read = self.shared.registry.with_read(fid, |file| {
            use std::os::unix::fs::FileExt;
            let offset = block * PAGE_SIZE as u64;
            match file.read_at(&mut buf, offset) {
                Ok(n) => {
                    if n < PAGE_SIZE {
                        log::warn!(
                            "partial read of file {fid} block {block}: {n} of {PAGE_SIZE} bytes, zero-filling tail"
                        );
                        for b in &mut buf[n..] {
                            *b = 0;
                        }
                    }
                    Ok(())
                }
                Err(e) => Err(e),
            }
        });
        read?;
        let mut frame = self.shared.frames[idx].write();
        frame.data.copy_from_slice(&buf);
        frame.tag = Some((fid, block));
        frame.state = FrameState::Valid;
        frame.dirty = false;
        frame.ref_count = 0;
        frame.referenced = false;
        drop(frame);
        self.shared.index.lock().insert((fid, block), idx);
        Ok(())
    }

    fn flush_frame(&self, frame: &mut Frame) -> Result<()> {
        let Some((fid, block)) = frame.tag else { return Ok(()) };
        let data = frame.data.clone();
        self.shared.registry.with_write(fid, |file| {
            use std::os::unix::fs::FileExt;
            file.write_at(&data, block * PAGE_SIZE as u64)
        })?;
        self.shared.stats.writes.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        frame.dirty = false;
        let mut counters = self.shared.write_counters.lock();
        let count = counters.entry(fid).or_insert(0);
        *count += 1;
        if self.shared.registry.should_sync_writes(*count) {
            self.shared.registry.with_write(fid, |file| file.sync_data())?;
        }
        Ok(())
    }

    /// Flush every dirty valid frame. Errors abort the sweep with the first failure.
    pub fn flush_all_dirty(&self) -> Result<()> {
        for lock in &self.shared.frames {
            let mut frame = lock.write();
            if frame.dirty && matches!(frame.state, FrameState::Valid) {
                self.flush_frame(&mut frame)?;
            }
        }
        Ok(())
    }

    /// Flush and clear every frame. Fails if any frame is still pinned.
    pub fn shutdown(&self) -> Result<()> {
        let pinned: usize =
            self.shared.frames.iter().filter(|f| f.read().ref_count > 0).count();
        if pinned > 0 {
            return Err(StorageError::BuffersPinned(pinned));
        }
        self.flush_all_dirty()?;
        for lock in &self.shared.frames {
            let mut frame = lock.write();
            *frame = Frame::empty();
        }
        self.shared.index.lock().clear();
        Ok(())
    }

    #[must_use]
    pub fn family(&self) -> PageFamily {
        self.shared.family
    }

    pub(crate) fn parse(&self, raw: &[u8]) -> Result<Page> {
        match self.shared.family {
            PageFamily::BTree => Page::parse_btree(raw),
            PageFamily::Hash => Page::parse_hash(raw),
        }
    }
}
