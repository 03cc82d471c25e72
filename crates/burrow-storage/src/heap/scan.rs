//! Sequential scans over relation files.

use crate::heap::file::RelationFile;
use crate::heap::page::HeapPage;
use burrow_common::page::PageNo;
use burrow_common::types::RecordId;
use burrow_common::{BurrowError, Result};
use bytes::Bytes;

/// Cursor over every record of a relation, in file order.
///
/// Each call pins the current page, copies one record out, and unpins
/// before returning. Exhaustion is reported as `Ok(None)`.
pub struct FileScan<'a> {
    relation: &'a RelationFile,
    next_page: PageNo,
    next_slot: u16,
    num_pages: u32,
}

impl<'a> FileScan<'a> {
    /// Starts a scan at the first record of the relation.
    pub fn new(relation: &'a RelationFile) -> Result<Self> {
        Ok(Self {
            relation,
            next_page: 1,
            next_slot: 0,
            num_pages: relation.num_pages()?,
        })
    }

    /// Returns the next record and its ID, or None at end of file.
    pub fn next(&mut self) -> Result<Option<(RecordId, Bytes)>> {
        while self.next_page <= self.num_pages {
            let guard = self
                .relation
                .buffer_manager()
                .read_page(self.relation.file_id(), self.next_page)?;
            let data = guard.data();

            if (self.next_slot as usize) < HeapPage::num_records(&data[..]) {
                let rid = RecordId::new(self.next_page, self.next_slot);
                let record = HeapPage::record(&data[..], self.next_slot)
                    .map(Bytes::copy_from_slice)
                    .ok_or(BurrowError::RecordNotFound { rid })?;
                self.next_slot += 1;
                return Ok(Some((rid, record)));
            }

            drop(data);
            drop(guard);
            self.next_page += 1;
            self.next_slot = 0;
        }
        Ok(None)
    }
}
