//! Storage engine for BurrowDB.
//!
//! This crate provides:
//! - Relation (heap) files of variable-length records in slotted pages
//! - A file scanner feeding records to index builds
//! - The disk-resident B+ tree index: insert with split propagation and
//!   bounded range scans over the leaf sibling chain

pub mod btree;
pub mod heap;

pub use btree::{BTreeIndex, Operator, LEAF_CAPACITY, NONLEAF_CAPACITY};
pub use heap::{FileScan, RelationFile};
