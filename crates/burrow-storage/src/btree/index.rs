//! Index lifecycle and the insert engine.

use super::constants::{LEAF_CAPACITY, NONLEAF_CAPACITY};
use super::node::{IndexMeta, LeafNode, MetaNode, NonLeafNode};
use super::scan::ScanCursor;
use crate::heap::{FileScan, RelationFile};
use burrow_buffer::BufferManager;
use burrow_common::page::{FileId, PageNo};
use burrow_common::types::{AttrType, RecordId};
use burrow_common::{BurrowError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The meta page is always page 1 of the index file.
const META_PAGE_NO: PageNo = 1;

/// Result of one level of the insert descent.
enum SplitOutcome {
    /// The subtree absorbed the entry.
    NoSplit,
    /// The child split; the caller must install the separator.
    Split {
        /// Separator key to install in the parent.
        separator: i32,
        /// The newly allocated right half. The left half is the page the
        /// caller descended into.
        right_page_no: PageNo,
        /// True when the split happened at the leaf level.
        from_leaf: bool,
    },
}

/// A disk-resident B+ tree index over one attribute of a relation.
///
/// The index file is named `"<relation path>.<attr_byte_offset>"`. Opening
/// a missing index creates it and bulk-builds from the relation; opening an
/// existing one validates the attribute info against the meta page.
///
/// The index is a single-writer structure: inserts and scans take `&mut
/// self` and at most one scan is open at a time.
pub struct BTreeIndex {
    /// Buffer manager handling all page I/O.
    pub(super) bufmgr: Arc<BufferManager>,
    /// Index file handle.
    pub(super) file: FileId,
    /// Path of the index file.
    index_path: PathBuf,
    /// Byte offset of the indexed attribute within a relation record.
    attr_byte_offset: usize,
    /// Domain of the indexed attribute.
    attr_type: AttrType,
    /// Current root page.
    pub(super) root_page_no: PageNo,
    /// True iff the root is itself a leaf.
    pub(super) leaf_root: bool,
    /// In-progress scan, if any.
    pub(super) scan: Option<ScanCursor>,
    /// Set once the index has been persisted and released.
    closed: bool,
}

impl BTreeIndex {
    /// Opens the index for one attribute of a relation, creating and
    /// bulk-building it if the index file does not exist yet.
    pub fn open(
        bufmgr: Arc<BufferManager>,
        relation: &RelationFile,
        attr_byte_offset: usize,
        attr_type: AttrType,
    ) -> Result<Self> {
        let index_path = index_file_name(relation.path(), attr_byte_offset);

        match bufmgr.open_file(&index_path, false) {
            Ok(file) => Self::open_existing(bufmgr, file, index_path, attr_byte_offset, attr_type),
            Err(BurrowError::FileNotFound(_)) => {
                Self::create(bufmgr, relation, index_path, attr_byte_offset, attr_type)
            }
            Err(e) => Err(e),
        }
    }

    fn open_existing(
        bufmgr: Arc<BufferManager>,
        file: FileId,
        index_path: PathBuf,
        attr_byte_offset: usize,
        attr_type: AttrType,
    ) -> Result<Self> {
        let meta = {
            let guard = bufmgr.read_page(file, META_PAGE_NO)?;
            let data = guard.data();
            MetaNode::read(&data[..])?
        };

        if meta.attr_byte_offset != attr_byte_offset as i32 || meta.attr_type != attr_type {
            let err = BurrowError::BadIndexInfo {
                meta_offset: meta.attr_byte_offset,
                meta_type: meta.attr_type as u32,
                offset: attr_byte_offset as i32,
                attr_type: attr_type as u32,
            };
            let _ = bufmgr.close_file(file);
            return Err(err);
        }

        Ok(Self {
            bufmgr,
            file,
            index_path,
            attr_byte_offset,
            attr_type,
            root_page_no: meta.root_page_no,
            leaf_root: meta.leaf_root,
            scan: None,
            closed: false,
        })
    }

    fn create(
        bufmgr: Arc<BufferManager>,
        relation: &RelationFile,
        index_path: PathBuf,
        attr_byte_offset: usize,
        attr_type: AttrType,
    ) -> Result<Self> {
        let file = bufmgr.open_file(&index_path, true)?;

        let root_page_no = {
            let mut meta_guard = bufmgr.alloc_page(file)?;
            debug_assert_eq!(meta_guard.page_no(), META_PAGE_NO);

            let mut root_guard = bufmgr.alloc_page(file)?;
            let root_page_no = root_guard.page_no();
            LeafNode::init(&mut root_guard.data_mut()[..]);

            MetaNode::write(
                &mut meta_guard.data_mut()[..],
                &IndexMeta {
                    attr_byte_offset: attr_byte_offset as i32,
                    attr_type,
                    root_page_no,
                    leaf_root: true,
                },
            );
            root_page_no
        };

        let mut index = Self {
            bufmgr,
            file,
            index_path,
            attr_byte_offset,
            attr_type,
            root_page_no,
            leaf_root: true,
            scan: None,
            closed: false,
        };

        // Bulk build: feed every relation record through the insert path.
        let mut fscan = FileScan::new(relation)?;
        while let Some((rid, record)) = fscan.next()? {
            let key = key_at(&record, attr_byte_offset)?;
            index.insert_entry(key, rid)?;
        }

        Ok(index)
    }

    /// Returns the index file path.
    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Returns the buffer manager file handle of the index file.
    pub fn file_id(&self) -> FileId {
        self.file
    }

    /// Returns the current root page.
    pub fn root_page_no(&self) -> PageNo {
        self.root_page_no
    }

    /// Returns true while the root is still a leaf.
    pub fn is_leaf_root(&self) -> bool {
        self.leaf_root
    }

    /// Inserts a `<key, rid>` pair.
    ///
    /// Duplicated keys are allowed and always route to the rightmost
    /// matching position.
    pub fn insert_entry(&mut self, key: i32, rid: RecordId) -> Result<()> {
        let (root, root_is_leaf) = (self.root_page_no, self.leaf_root);

        match self.insert_into(root, root_is_leaf, key, rid)? {
            SplitOutcome::NoSplit => Ok(()),
            SplitOutcome::Split {
                separator,
                right_page_no,
                from_leaf,
            } => {
                // The root itself split: promote a fresh non-leaf root
                // holding one separator over the two halves.
                let bufmgr = self.bufmgr.clone();
                let mut guard = bufmgr.alloc_page(self.file)?;
                let new_root = guard.page_no();
                {
                    let mut data = guard.data_mut();
                    NonLeafNode::init(&mut data[..], if from_leaf { 1 } else { 0 });
                    NonLeafNode::set_num_entries(&mut data[..], 1);
                    NonLeafNode::set_key(&mut data[..], 0, separator);
                    NonLeafNode::set_child(&mut data[..], 0, root);
                    NonLeafNode::set_child(&mut data[..], 1, right_page_no);
                }
                drop(guard);

                self.root_page_no = new_root;
                self.leaf_root = false;
                Ok(())
            }
        }
    }

    fn insert_into(
        &mut self,
        page_no: PageNo,
        is_leaf: bool,
        key: i32,
        rid: RecordId,
    ) -> Result<SplitOutcome> {
        if is_leaf {
            self.insert_into_leaf(page_no, key, rid)
        } else {
            self.insert_into_nonleaf(page_no, key, rid)
        }
    }

    fn insert_into_leaf(&mut self, page_no: PageNo, key: i32, rid: RecordId) -> Result<SplitOutcome> {
        let bufmgr = self.bufmgr.clone();
        let mut guard = bufmgr.read_page(self.file, page_no)?;

        let num_entries = LeafNode::num_entries(&guard.data()[..]);
        if num_entries < LEAF_CAPACITY {
            LeafNode::insert_entry(&mut guard.data_mut()[..], key, rid);
            return Ok(SplitOutcome::NoSplit);
        }

        // Full leaf: stage every entry plus the new one, split the array,
        // and copy the right half into a fresh sibling.
        let mut right_guard = bufmgr.alloc_page(self.file)?;
        let right_page_no = right_guard.page_no();

        let mut data = guard.data_mut();
        let mut entries = LeafNode::entries(&data[..]);
        let slot = LeafNode::insert_slot(&data[..], key);
        entries.insert(slot, (key, rid));

        // Left keeps the larger half; the right leaf's first key is copied
        // up as the separator and stays stored in the leaf.
        let left_count = (LEAF_CAPACITY + 2) / 2;
        let separator = entries[left_count].0;

        let mut right_data = right_guard.data_mut();
        LeafNode::init(&mut right_data[..]);
        LeafNode::write_entries(&mut right_data[..], &entries[left_count..]);
        LeafNode::set_right_sibling(&mut right_data[..], LeafNode::right_sibling(&data[..]));

        LeafNode::write_entries(&mut data[..], &entries[..left_count]);
        LeafNode::set_right_sibling(&mut data[..], right_page_no);

        drop(right_data);
        drop(data);

        // A leaf split while the root was that leaf means the root stops
        // being a leaf; when it already was not, this is a no-op.
        self.leaf_root = false;

        Ok(SplitOutcome::Split {
            separator,
            right_page_no,
            from_leaf: true,
        })
    }

    fn insert_into_nonleaf(
        &mut self,
        page_no: PageNo,
        key: i32,
        rid: RecordId,
    ) -> Result<SplitOutcome> {
        let bufmgr = self.bufmgr.clone();
        let mut guard = bufmgr.read_page(self.file, page_no)?;

        let (slot, child_page_no, child_is_leaf) = {
            let data = guard.data();
            let slot = NonLeafNode::child_slot(&data[..], key);
            (
                slot,
                NonLeafNode::child(&data[..], slot),
                NonLeafNode::level(&data[..]) == 1,
            )
        };

        // The parent stays pinned across the descent; its pin is released
        // when `guard` drops after the child reports back.
        let (separator, right_page_no, from_leaf) =
            match self.insert_into(child_page_no, child_is_leaf, key, rid)? {
                SplitOutcome::NoSplit => return Ok(SplitOutcome::NoSplit),
                SplitOutcome::Split {
                    separator,
                    right_page_no,
                    from_leaf,
                } => (separator, right_page_no, from_leaf),
            };

        let num_entries = NonLeafNode::num_entries(&guard.data()[..]);
        if num_entries < NONLEAF_CAPACITY {
            NonLeafNode::insert_separator(&mut guard.data_mut()[..], slot, separator, right_page_no);
            return Ok(SplitOutcome::NoSplit);
        }

        // Full non-leaf: stage keys and children with the new entry, then
        // split with the middle key moving up (it is stored in neither
        // half).
        let mut right_guard = bufmgr.alloc_page(self.file)?;
        let new_right_page_no = right_guard.page_no();

        let mut data = guard.data_mut();
        let mut keys = NonLeafNode::keys(&data[..]);
        let mut children = NonLeafNode::children(&data[..]);
        keys.insert(slot, separator);
        children.insert(slot + 1, right_page_no);

        let left_count = (NONLEAF_CAPACITY + 1) / 2;
        let mid_key = keys[left_count];
        let level = if from_leaf { 1 } else { 0 };

        let mut right_data = right_guard.data_mut();
        NonLeafNode::init(&mut right_data[..], level);
        NonLeafNode::write_node(
            &mut right_data[..],
            &keys[left_count + 1..],
            &children[left_count + 1..],
        );

        NonLeafNode::set_level(&mut data[..], level);
        NonLeafNode::write_node(&mut data[..], &keys[..left_count], &children[..=left_count]);

        drop(right_data);
        drop(data);

        Ok(SplitOutcome::Split {
            separator: mid_key,
            right_page_no: new_right_page_no,
            from_leaf: false,
        })
    }

    /// Persists the meta page, flushes the index file, and releases it.
    ///
    /// An in-progress scan is terminated and its cursor unpinned first.
    pub fn close(mut self) -> Result<()> {
        self.close_inner()
    }

    fn close_inner(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if let Some(cursor) = self.scan.take() {
            let _ = self.bufmgr.unpin_page(self.file, cursor.page_no, false);
        }

        let bufmgr = self.bufmgr.clone();
        {
            let mut guard = bufmgr.read_page(self.file, META_PAGE_NO)?;
            MetaNode::write(
                &mut guard.data_mut()[..],
                &IndexMeta {
                    attr_byte_offset: self.attr_byte_offset as i32,
                    attr_type: self.attr_type,
                    root_page_no: self.root_page_no,
                    leaf_root: self.leaf_root,
                },
            );
        }
        bufmgr.flush_file(self.file)?;
        bufmgr.close_file(self.file)?;
        Ok(())
    }
}

impl Drop for BTreeIndex {
    fn drop(&mut self) {
        let _ = self.close_inner();
    }
}

/// Derives the index file name: `"<relation path>.<attr_byte_offset>"`.
fn index_file_name(relation_path: &Path, attr_byte_offset: usize) -> PathBuf {
    let mut name = relation_path.as_os_str().to_os_string();
    name.push(format!(".{attr_byte_offset}"));
    PathBuf::from(name)
}

/// Reads the 4-byte little-endian key at the attribute offset of a record.
fn key_at(record: &[u8], offset: usize) -> Result<i32> {
    if record.len() < offset + 4 {
        return Err(BurrowError::RecordTooShort {
            len: record.len(),
            offset,
        });
    }
    Ok(i32::from_le_bytes([
        record[offset],
        record[offset + 1],
        record[offset + 2],
        record[offset + 3],
    ]))
}
