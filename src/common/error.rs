//! Error types for vanedb.

use thiserror::Error;

use crate::common::{FileId, FrameId, PageId};

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
/// This is a common Rust pattern (see `std::io::Result`).
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in vanedb.
///
/// A single error type keeps error handling consistent across the storage
/// and buffer layers. Note that a page-index lookup miss is *not* an error:
/// "not resident" is the routine signal that a page must be fetched from
/// disk, and the index reports it as `Option::None`.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from disk operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Requested page does not exist in the file (never allocated, or
    /// deleted).
    #[error("{page_id} not found in {file_id}")]
    PageNotFound { file_id: FileId, page_id: PageId },

    /// The bounded clock sweep found no eligible frame: every frame is
    /// pinned. The caller must unpin something and retry; the pool never
    /// retries internally.
    #[error("buffer pool exhausted: all frames pinned")]
    PoolExhausted,

    /// Attempted to unpin a page that is not resident or has no active
    /// pins. Decrementing a pin count below zero is always a caller bug.
    #[error("{page_id} of {file_id} is not pinned")]
    PageNotPinned { file_id: FileId, page_id: PageId },

    /// An operation required a page to be unpinned but found it pinned.
    /// The caller must unpin and retry.
    #[error("{page_id} of {file_id} is still pinned")]
    PagePinned { file_id: FileId, page_id: PageId },

    /// Operation referenced a file that was never attached to the pool
    /// (or was already detached).
    #[error("{0} is not attached to the buffer pool")]
    FileNotAttached(FileId),

    /// An internal invariant was violated, e.g. an invalid frame claiming
    /// file ownership. Signals a bug in the buffer manager itself, not a
    /// caller error; not recoverable.
    #[error("corrupt buffer state at {0}")]
    BadBuffer(FrameId),
}
