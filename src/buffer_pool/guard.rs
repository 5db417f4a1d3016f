use parking_lot::RwLock;

use super::frame::Frame;

/// Pinned read access to a page's raw bytes. Unpins on drop.
pub struct PageGuard<'a> {
    frame: &'a RwLock<Frame>,
    idx: usize,
}

impl<'a> PageGuard<'a> {
    pub(super) fn new(frame: &'a RwLock<Frame>, idx: usize) -> Self {
        Self { frame, idx }
    }

    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        self.frame.read().data.clone()
    }

    #[must_use]
    pub fn idx(&self) -> usize {
        self.idx
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        let mut frame = self.frame.write();
        frame.ref_count = frame.ref_count.saturating_sub(1);
    }
}

/// Pinned write access to a page's raw bytes. Unpins on drop; the caller must call
/// [`Self::write_bytes`] and [`Self::mark_dirty`] to persist changes.
pub struct PageGuardMut<'a> {
    frame: &'a RwLock<Frame>,
    idx: usize,
}

impl<'a> PageGuardMut<'a> {
    pub(super) fn new(frame: &'a RwLock<Frame>, idx: usize) -> Self {
        Self { frame, idx }
    }

    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        self.frame.read().data.clone()
    }

    pub fn write_bytes(&self, data: &[u8]) {
        let mut frame = self.frame.write();
        frame.data.copy_from_slice(data);
        frame.dirty = true;
        frame.referenced = true;
    }

    pub fn mark_dirty(&self) {
        self.frame.write().dirty = true;
    }

    #[must_use]
    pub fn idx(&self) -> usize {
        self.idx
    }
}

impl Drop for PageGuardMut<'_> {
    fn drop(&mut self) {
        let mut frame = self.frame.write();
        frame.ref_count = frame.ref_count.saturating_sub(1);
    }
}
