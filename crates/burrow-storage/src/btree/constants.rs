//! Node capacities, derived from the page size.

use burrow_common::page::PAGE_SIZE;

/// Size of a key on a node page (4-byte signed integer).
pub const KEY_SIZE: usize = 4;

/// Size of a record ID on a leaf page (page_no:4 + slot_no:2 + pad:2).
pub const RID_SIZE: usize = 8;

/// Size of a child page number on a non-leaf page.
pub const CHILD_SIZE: usize = 4;

/// Leaf header: num_entries:2 + pad:2 + right_sib_page_no:4.
pub const LEAF_HEADER_SIZE: usize = 8;

/// Non-leaf header: level:2 + num_entries:2 + pad:4.
pub const NONLEAF_HEADER_SIZE: usize = 8;

/// Number of `<key, rid>` pairs a leaf can hold.
pub const LEAF_CAPACITY: usize = (PAGE_SIZE - LEAF_HEADER_SIZE) / (KEY_SIZE + RID_SIZE);

/// Number of separator keys a non-leaf can hold (it holds one more child).
pub const NONLEAF_CAPACITY: usize =
    (PAGE_SIZE - NONLEAF_HEADER_SIZE - CHILD_SIZE) / (KEY_SIZE + CHILD_SIZE);
