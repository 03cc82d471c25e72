//! Error types for BurrowDB.

use crate::page::{PageId, PageNo};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using BurrowError.
pub type Result<T> = std::result::Result<T, BurrowError>;

/// Errors that can occur in BurrowDB operations.
#[derive(Debug, Error)]
pub enum BurrowError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    // Buffer manager errors
    #[error("buffer pool full, unable to allocate frame")]
    BufferPoolFull,

    #[error("page not found: {page_id}")]
    PageNotFound { page_id: PageId },

    #[error("page {page_id} is pinned")]
    PagePinned { page_id: PageId },

    #[error("page {page_no} does not exist in {}", .path.display())]
    PageOutOfBounds { path: PathBuf, page_no: PageNo },

    // Relation file errors
    #[error("page full, unable to insert record")]
    PageFull,

    #[error("record too large: {size} bytes (max {max})")]
    RecordTooLarge { size: usize, max: usize },

    #[error("record of {len} bytes too short for key at offset {offset}")]
    RecordTooShort { len: usize, offset: usize },

    #[error("record not found: {rid}")]
    RecordNotFound { rid: crate::types::RecordId },

    // Index errors
    #[error("bad index info: meta records offset {meta_offset} type {meta_type}, caller gave offset {offset} type {attr_type}")]
    BadIndexInfo {
        meta_offset: i32,
        meta_type: u32,
        offset: i32,
        attr_type: u32,
    },

    // Scan errors
    #[error("bad opcodes: low must be GT/GTE and high must be LT/LTE")]
    BadOpcodes,

    #[error("bad scan range: low {low} exceeds high {high}")]
    BadScanRange { low: i32, high: i32 },

    #[error("no such key found")]
    NoSuchKeyFound,

    #[error("scan not initialized")]
    ScanNotInitialized,

    #[error("index scan completed")]
    IndexScanCompleted,

    // Internal errors
    #[error("internal error: {0}")]
    Internal(String),
}
