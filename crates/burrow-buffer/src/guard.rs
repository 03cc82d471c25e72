//! Scoped pin guards.

use crate::frame::BufferFrame;
use crate::pool::BufferManager;
use burrow_common::page::{PageId, PageNo, PAGE_SIZE};
use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

/// A pinned page.
///
/// Holds one pin on a buffer frame and releases it exactly once when
/// dropped, so a pin cannot leak on early returns or error paths. The
/// guard tracks its own dirty flag: [`data_mut`](Self::data_mut) marks it,
/// and the drop-time unpin reports it to the buffer manager.
pub struct PinGuard<'a> {
    bufmgr: &'a BufferManager,
    frame: &'a BufferFrame,
    page_id: PageId,
    dirty: bool,
}

impl<'a> PinGuard<'a> {
    pub(crate) fn new(bufmgr: &'a BufferManager, frame: &'a BufferFrame, page_id: PageId) -> Self {
        Self {
            bufmgr,
            frame,
            page_id,
            dirty: false,
        }
    }

    /// Returns the pinned page's identifier.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the pinned page's number within its file.
    pub fn page_no(&self) -> PageNo {
        self.page_id.page_no
    }

    /// Read access to the page bytes.
    pub fn data(&self) -> RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.frame.read_data()
    }

    /// Write access to the page bytes. Marks the guard dirty.
    pub fn data_mut(&mut self) -> RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.dirty = true;
        self.frame.write_data()
    }

    /// Marks the guard dirty without taking write access.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Consumes the guard without unpinning.
    ///
    /// The caller takes over the pin and must eventually release it with
    /// [`BufferManager::unpin_page`]. Used by the scan cursor, which keeps
    /// its leaf pinned across calls.
    pub fn keep_pinned(self) -> PageNo {
        let page_no = self.page_id.page_no;
        std::mem::forget(self);
        page_no
    }
}

impl Drop for PinGuard<'_> {
    fn drop(&mut self) {
        let _ = self
            .bufmgr
            .unpin_page(self.page_id.file, self.page_id.page_no, self.dirty);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::BufferManagerConfig;
    use tempfile::tempdir;

    fn test_manager() -> (BufferManager, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let bufmgr = BufferManager::new(BufferManagerConfig {
            num_frames: 4,
            fsync_enabled: false,
        });
        (bufmgr, dir)
    }

    #[test]
    fn test_guard_unpins_on_drop() {
        let (bufmgr, dir) = test_manager();
        let file = bufmgr.open_file(dir.path().join("f"), true).unwrap();

        let guard = bufmgr.alloc_page(file).unwrap();
        assert_eq!(bufmgr.pinned_frames(), 1);
        drop(guard);
        assert_eq!(bufmgr.pinned_frames(), 0);
    }

    #[test]
    fn test_guard_clean_read_leaves_page_clean() {
        let (bufmgr, dir) = test_manager();
        let file = bufmgr.open_file(dir.path().join("f"), true).unwrap();

        {
            let mut guard = bufmgr.alloc_page(file).unwrap();
            guard.data_mut()[0] = 1;
        }
        bufmgr.flush_file(file).unwrap();

        // Read without mutation.
        {
            let guard = bufmgr.read_page(file, 1).unwrap();
            assert_eq!(guard.data()[0], 1);
        }

        // The clean unpin must not have re-dirtied the frame.
        bufmgr.flush_file(file).unwrap();
        assert_eq!(bufmgr.pinned_frames(), 0);
    }

    #[test]
    fn test_guard_keep_pinned_holds_pin() {
        let (bufmgr, dir) = test_manager();
        let file = bufmgr.open_file(dir.path().join("f"), true).unwrap();

        let guard = bufmgr.alloc_page(file).unwrap();
        let page_no = guard.keep_pinned();
        assert_eq!(bufmgr.pinned_frames(), 1);

        bufmgr.unpin_page(file, page_no, false).unwrap();
        assert_eq!(bufmgr.pinned_frames(), 0);
    }

    #[test]
    fn test_guard_nested_pins_on_same_page() {
        let (bufmgr, dir) = test_manager();
        let file = bufmgr.open_file(dir.path().join("f"), true).unwrap();

        let page_no = bufmgr.alloc_page(file).unwrap().keep_pinned();

        {
            let transient = bufmgr.read_page(file, page_no).unwrap();
            assert_eq!(transient.page_no(), page_no);
            assert_eq!(bufmgr.pinned_frames(), 1); // one frame, pin count 2
        }

        bufmgr.unpin_page(file, page_no, false).unwrap();
        assert_eq!(bufmgr.pinned_frames(), 0);
    }
}
