//! File identifier type.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_FILE_ID: AtomicU64 = AtomicU64::new(0);

/// Stable, comparable handle identifying an open file.
///
/// The buffer pool keys its page index on `(FileId, PageId)` and records the
/// owning `FileId` in each frame descriptor, so a dirty victim can be written
/// back through the right file even when the eviction was triggered by a
/// fetch against a different file.
///
/// Ids are assigned once per file handle and never reused within a process,
/// so a stale id can never alias a newly opened file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u64);

impl FileId {
    /// Allocate the next process-unique file id.
    pub fn next() -> Self {
        FileId(NEXT_FILE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "File({})", self.0)
    }
}
