//! The file collaborator contract consumed by the buffer pool.

use crate::common::{FileId, PageId, Result};
use crate::storage::Page;

/// Fixed-size page storage for a single file.
///
/// This is the only interface the buffer pool needs from the storage layer:
/// read and write whole pages, materialize new zeroed pages, and delete
/// pages. [`DiskManager`] is the production implementation; tests substitute
/// instrumented doubles to observe exactly which pages are read and written
/// back.
///
/// Implementations own durability. The buffer pool only guarantees that a
/// dirty page is handed to `write_page` before its frame is reused.
///
/// `Send` so a pool holding attached files can live behind a shared
/// handle; see [`SharedBufferPool`].
///
/// [`DiskManager`]: crate::storage::DiskManager
/// [`SharedBufferPool`]: crate::buffer::SharedBufferPool
pub trait PageFile: Send {
    /// The stable identity of this file.
    ///
    /// Must not change for the lifetime of the value; the buffer pool keys
    /// its page index and frame ownership on it.
    fn file_id(&self) -> FileId;

    /// Read a page's bytes.
    ///
    /// # Errors
    /// `Error::PageNotFound` if the page was never allocated or has been
    /// deleted.
    fn read_page(&mut self, page_id: PageId) -> Result<Page>;

    /// Write a page's bytes.
    ///
    /// # Errors
    /// `Error::PageNotFound` if the page was never allocated or has been
    /// deleted.
    fn write_page(&mut self, page_id: PageId, page: &Page) -> Result<()>;

    /// Materialize a new zeroed page on disk and return its id.
    fn allocate_page(&mut self) -> Result<PageId>;

    /// Delete a page. Its id may be reused by a later `allocate_page`.
    fn delete_page(&mut self, page_id: PageId) -> Result<()>;
}
