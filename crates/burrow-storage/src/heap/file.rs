//! Relation files: heap storage for records, through the buffer manager.

use crate::heap::page::HeapPage;
use burrow_buffer::BufferManager;
use burrow_common::page::{FileId, PageNo, NO_PAGE};
use burrow_common::types::RecordId;
use burrow_common::{BurrowError, Result};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// A heap file of variable-length records.
///
/// Records are appended into slotted pages; every page access goes through
/// the buffer manager. Serves as the bulk-build input for index creation.
pub struct RelationFile {
    /// Buffer manager handling all page I/O.
    bufmgr: Arc<BufferManager>,
    /// File handle in the buffer manager.
    file: FileId,
    /// Path to the relation file.
    path: PathBuf,
    /// Last page with spare room (speeds up sequential appends).
    last_page_hint: AtomicU32,
    /// Set once the file has been flushed and released.
    closed: bool,
}

impl RelationFile {
    /// Creates a new relation file, truncating any existing one.
    pub fn create(bufmgr: Arc<BufferManager>, path: impl AsRef<Path>) -> Result<Self> {
        Self::open_inner(bufmgr, path, true)
    }

    /// Opens an existing relation file.
    pub fn open(bufmgr: Arc<BufferManager>, path: impl AsRef<Path>) -> Result<Self> {
        Self::open_inner(bufmgr, path, false)
    }

    fn open_inner(bufmgr: Arc<BufferManager>, path: impl AsRef<Path>, create: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = bufmgr.open_file(&path, create)?;
        let num_pages = bufmgr.file_num_pages(file)?;

        Ok(Self {
            bufmgr,
            file,
            path,
            last_page_hint: AtomicU32::new(if num_pages == 0 { NO_PAGE } else { num_pages }),
            closed: false,
        })
    }

    /// Returns the relation file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the buffer manager file handle.
    pub fn file_id(&self) -> FileId {
        self.file
    }

    /// Returns the buffer manager this relation does its I/O through.
    pub fn buffer_manager(&self) -> &Arc<BufferManager> {
        &self.bufmgr
    }

    /// Returns the number of pages in the relation.
    pub fn num_pages(&self) -> Result<u32> {
        self.bufmgr.file_num_pages(self.file)
    }

    /// Appends a record and returns its record ID.
    pub fn insert_record(&self, record: &[u8]) -> Result<RecordId> {
        let needed = record.len() + HeapPage::SLOT_SIZE;

        // Try the last page first.
        let hint = self.last_page_hint.load(Ordering::Relaxed);
        if hint != NO_PAGE {
            let mut guard = self.bufmgr.read_page(self.file, hint)?;
            let fits = HeapPage::free_space(&guard.data()[..]) >= needed;
            if fits {
                let slot_no = HeapPage::insert_record(&mut guard.data_mut()[..], record)?;
                return Ok(RecordId::new(hint, slot_no));
            }
        }

        // Hint page is full (or there is none yet): start a fresh page.
        let mut guard = self.bufmgr.alloc_page(self.file)?;
        let page_no: PageNo = guard.page_no();
        let slot_no = {
            let mut data = guard.data_mut();
            HeapPage::init(&mut data[..]);
            HeapPage::insert_record(&mut data[..], record)?
        };

        self.last_page_hint.store(page_no, Ordering::Relaxed);
        Ok(RecordId::new(page_no, slot_no))
    }

    /// Retrieves a record by its ID.
    pub fn record(&self, rid: RecordId) -> Result<Bytes> {
        let guard = self.bufmgr.read_page(self.file, rid.page_no)?;
        let data = guard.data();
        HeapPage::record(&data[..], rid.slot_no)
            .map(Bytes::copy_from_slice)
            .ok_or(BurrowError::RecordNotFound { rid })
    }

    /// Flushes the relation and releases its file handle.
    pub fn close(mut self) -> Result<()> {
        self.close_inner()
    }

    fn close_inner(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.bufmgr.flush_file(self.file)?;
        self.bufmgr.close_file(self.file)?;
        Ok(())
    }
}

impl Drop for RelationFile {
    fn drop(&mut self) {
        let _ = self.close_inner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burrow_buffer::BufferManagerConfig;
    use tempfile::tempdir;

    fn test_bufmgr() -> Arc<BufferManager> {
        Arc::new(BufferManager::new(BufferManagerConfig {
            num_frames: 64,
            fsync_enabled: false,
        }))
    }

    #[test]
    fn test_relation_insert_and_get() {
        let dir = tempdir().unwrap();
        let rel = RelationFile::create(test_bufmgr(), dir.path().join("emp")).unwrap();

        let rid = rel.insert_record(b"alice").unwrap();
        assert_eq!(rid, RecordId::new(1, 0));
        assert_eq!(rel.record(rid).unwrap(), Bytes::from_static(b"alice"));
    }

    #[test]
    fn test_relation_missing_record() {
        let dir = tempdir().unwrap();
        let rel = RelationFile::create(test_bufmgr(), dir.path().join("emp")).unwrap();
        rel.insert_record(b"only").unwrap();

        let absent = RecordId::new(1, 9);
        assert!(matches!(
            rel.record(absent),
            Err(BurrowError::RecordNotFound { .. })
        ));
    }

    #[test]
    fn test_relation_spills_to_new_pages() {
        let dir = tempdir().unwrap();
        let rel = RelationFile::create(test_bufmgr(), dir.path().join("emp")).unwrap();

        let record = [3u8; 500];
        let mut rids = Vec::new();
        for _ in 0..20 {
            rids.push(rel.insert_record(&record).unwrap());
        }

        assert!(rel.num_pages().unwrap() > 1);
        for rid in rids {
            assert_eq!(rel.record(rid).unwrap().as_ref(), &record[..]);
        }
    }

    #[test]
    fn test_relation_open_missing_fails() {
        let dir = tempdir().unwrap();
        let result = RelationFile::open(test_bufmgr(), dir.path().join("absent"));
        assert!(matches!(result, Err(BurrowError::FileNotFound(_))));
    }

    #[test]
    fn test_relation_reopen_appends_after_existing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("emp");
        let bufmgr = test_bufmgr();

        {
            let rel = RelationFile::create(bufmgr.clone(), &path).unwrap();
            rel.insert_record(b"first").unwrap();
            rel.close().unwrap();
        }

        let rel = RelationFile::open(bufmgr, &path).unwrap();
        let rid = rel.insert_record(b"second").unwrap();
        assert_eq!(rid.page_no, 1);
        assert_eq!(rel.record(RecordId::new(1, 0)).unwrap(), Bytes::from_static(b"first"));
        assert_eq!(rel.record(rid).unwrap(), Bytes::from_static(b"second"));
    }

    #[test]
    fn test_relation_leaves_no_pins() {
        let dir = tempdir().unwrap();
        let bufmgr = test_bufmgr();
        let rel = RelationFile::create(bufmgr.clone(), dir.path().join("emp")).unwrap();

        for i in 0..100u32 {
            rel.insert_record(&i.to_le_bytes()).unwrap();
        }
        rel.record(RecordId::new(1, 5)).unwrap();

        assert_eq!(bufmgr.pinned_frames(), 0);
    }
}
