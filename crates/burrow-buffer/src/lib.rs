//! Buffer management for BurrowDB.
//!
//! This crate provides the paged I/O layer the index is built on:
//! - Blob files: named, page-addressable storage with ids growing from 1
//! - Fixed-size frame pool with clock eviction and dirty write-back
//! - Pin counting, with scoped [`PinGuard`]s so every pin is released
//!   exactly once on every exit path

mod file;
mod frame;
mod guard;
mod page_table;
mod pool;
mod replacer;

pub use file::BlobFile;
pub use frame::{BufferFrame, FrameId};
pub use guard::PinGuard;
pub use pool::{BufferManager, BufferManagerConfig};
pub use replacer::{ClockReplacer, Replacer};
