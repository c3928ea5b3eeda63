//! vanedb - a page-oriented storage engine core with a second-chance
//! buffer pool.
//!
//! # Architecture
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                         vanedb                            │
//! ├───────────────────────────────────────────────────────────┤
//! │  ┌───────────────────────────────────────────────────┐    │
//! │  │              Buffer Pool (buffer/)                │    │
//! │  │   BufferPoolManager + FrameMeta + PageIndex       │    │
//! │  │   ┌───────────────────────────────────────────┐   │    │
//! │  │   │   ClockReplacer (second chance sweep)     │   │    │
//! │  │   └───────────────────────────────────────────┘   │    │
//! │  └───────────────────────────────────────────────────┘    │
//! │                            ↓                              │
//! │  ┌───────────────────────────────────────────────────┐    │
//! │  │             Storage Layer (storage/)              │    │
//! │  │     PageFile trait + DiskManager + Page           │    │
//! │  └───────────────────────────────────────────────────┘    │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Record managers and index structures sit above the buffer pool and
//! consume its pin/unpin protocol; they are not part of this crate.
//!
//! # Modules
//! - [`common`] - Shared primitives (FileId, PageId, FrameId, Error, config)
//! - [`buffer`] - Buffer pool management and CLOCK replacement
//! - [`storage`] - Disk I/O and the page abstraction
//!
//! # Quick Start
//! ```no_run
//! use vanedb::buffer::BufferPoolManager;
//! use vanedb::storage::DiskManager;
//!
//! # fn main() -> vanedb::Result<()> {
//! let mut pool = BufferPoolManager::new(64);
//! let file_id = pool.attach_file(Box::new(DiskManager::create("my.db")?));
//!
//! // Materialize a page, write into it, return the pin
//! let (page_id, page) = pool.allocate_page(file_id)?;
//! page.as_mut_slice()[0] = 0xAB;
//! pool.unpin_page(file_id, page_id, true)?;
//!
//! // Persist and drop everything resident for the file
//! pool.flush_file(file_id)?;
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod common;
pub mod storage;

// Re-export commonly used items at crate root for convenience
pub use common::config::PAGE_SIZE;
pub use common::{Error, FileId, FrameId, PageId, Result};

pub use buffer::{BufferPoolManager, BufferPoolStats, SharedBufferPool, StatsSnapshot};
pub use storage::{DiskManager, Page, PageFile};
