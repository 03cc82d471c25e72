//! BurrowDB common types, errors, and utilities.
//!
//! This crate provides shared definitions used across all BurrowDB components.

pub mod error;
pub mod page;
pub mod types;

pub use error::{BurrowError, Result};
pub use page::{FileId, PageId, PageNo, NO_PAGE, PAGE_SIZE};
pub use types::{AttrType, RecordId};
