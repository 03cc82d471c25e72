//! Page table mapping page IDs to buffer frames.

use crate::frame::FrameId;
use burrow_common::page::PageId;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Maps PageId to the frame currently holding that page.
pub struct PageTable {
    map: RwLock<HashMap<PageId, FrameId>>,
}

impl PageTable {
    /// Creates a new page table sized for the given number of frames.
    pub fn new(capacity: usize) -> Self {
        Self {
            map: RwLock::new(HashMap::with_capacity(capacity)),
        }
    }

    /// Looks up a page and returns its frame if resident.
    #[inline]
    pub fn get(&self, page_id: PageId) -> Option<FrameId> {
        self.map.read().get(&page_id).copied()
    }

    /// Returns true if the page is resident.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.map.read().contains_key(&page_id)
    }

    /// Maps a page to a frame.
    #[inline]
    pub fn insert(&self, page_id: PageId, frame_id: FrameId) {
        self.map.write().insert(page_id, frame_id);
    }

    /// Removes a page mapping, returning the frame it occupied.
    #[inline]
    pub fn remove(&self, page_id: PageId) -> Option<FrameId> {
        self.map.write().remove(&page_id)
    }

    /// Returns the number of resident pages.
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// Returns true if no pages are resident.
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    /// Visits every resident page.
    pub fn for_each(&self, mut f: impl FnMut(PageId, FrameId)) {
        for (&page_id, &frame_id) in self.map.read().iter() {
            f(page_id, frame_id);
        }
    }
}
