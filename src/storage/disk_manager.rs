//! Disk Manager - low-level file I/O for database pages.
//!
//! The [`DiskManager`] handles all direct file operations:
//! - Reading and writing pages
//! - Allocating and deleting pages
//! - Managing the database file

use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::common::config::PAGE_SIZE;
use crate::common::{Error, FileId, PageId, Result};
use crate::storage::page::Page;
use crate::storage::page_file::PageFile;

/// Manages disk I/O for a single database file.
///
/// # File Layout
/// The database is stored as a single file with pages laid out sequentially:
/// ```text
/// ┌─────────┬─────────┬─────────┬─────────┬─────────┐
/// │ Page 0  │ Page 1  │ Page 2  │  ...    │ Page N  │
/// │ (4KB)   │ (4KB)   │ (4KB)   │         │ (4KB)   │
/// └─────────┴─────────┴─────────┴─────────┴─────────┘
/// Offset:  0      4096     8192    ...    N×4096
/// ```
///
/// Page N is located at file offset `N × PAGE_SIZE`.
///
/// # Page Deletion
/// `delete_page` zeroes the on-disk page and quarantines its id; a later
/// `allocate_page` reuses the lowest quarantined id before extending the
/// file. The free set lives in memory only; reopening a file brings every
/// page within its length back into play.
///
/// # Thread Safety
/// `DiskManager` is **single-threaded**. The buffer pool serializes access.
///
/// # Durability
/// All writes are followed by `fsync()` to ensure durability.
pub struct DiskManager {
    file: File,
    file_id: FileId,
    /// Number of page slots in the file, including deleted ones.
    page_count: u32,
    /// Ids of deleted pages, reusable by `allocate_page` (lowest first).
    free_pages: BTreeSet<u32>,
}

impl DiskManager {
    /// Create a new database file.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        Ok(Self {
            file,
            file_id: FileId::next(),
            page_count: 0,
            free_pages: BTreeSet::new(),
        })
    }

    /// Open an existing database file.
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist or cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        // Calculate page count from file size
        let metadata = file.metadata()?;
        let file_size = metadata.len();
        let page_count = (file_size / PAGE_SIZE as u64) as u32;

        Ok(Self {
            file,
            file_id: FileId::next(),
            page_count,
            free_pages: BTreeSet::new(),
        })
    }

    /// Open an existing database file, or create if it doesn't exist.
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    /// Get the number of live pages in the database.
    #[inline]
    pub fn page_count(&self) -> u32 {
        self.page_count - self.free_pages.len() as u32
    }

    /// Get the total size of the database file in bytes.
    #[inline]
    pub fn file_size(&self) -> u64 {
        (self.page_count as u64) * (PAGE_SIZE as u64)
    }

    fn check_live(&self, page_id: PageId) -> Result<()> {
        if page_id.0 >= self.page_count || self.free_pages.contains(&page_id.0) {
            return Err(Error::PageNotFound {
                file_id: self.file_id,
                page_id,
            });
        }
        Ok(())
    }

    fn write_zeros(&mut self, page_id: PageId) -> Result<()> {
        let offset = (page_id.0 as u64) * (PAGE_SIZE as u64);
        self.file.seek(SeekFrom::Start(offset))?;

        let zeros = [0u8; PAGE_SIZE];
        self.file.write_all(&zeros)?;
        self.file.sync_all()?;
        Ok(())
    }
}

impl PageFile for DiskManager {
    #[inline]
    fn file_id(&self) -> FileId {
        self.file_id
    }

    /// Read a page from disk.
    ///
    /// # Errors
    /// Returns `Error::PageNotFound` if the page doesn't exist.
    fn read_page(&mut self, page_id: PageId) -> Result<Page> {
        self.check_live(page_id)?;

        let offset = (page_id.0 as u64) * (PAGE_SIZE as u64);
        self.file.seek(SeekFrom::Start(offset))?;

        let mut page = Page::new();
        self.file.read_exact(page.as_mut_slice())?;

        Ok(page)
    }

    /// Write a page to disk.
    ///
    /// The page must have been previously allocated with `allocate_page()`.
    ///
    /// # Durability
    /// This method calls `fsync()` after writing to ensure the data is
    /// persisted to disk.
    ///
    /// # Errors
    /// Returns `Error::PageNotFound` if the page hasn't been allocated.
    fn write_page(&mut self, page_id: PageId, page: &Page) -> Result<()> {
        self.check_live(page_id)?;

        let offset = (page_id.0 as u64) * (PAGE_SIZE as u64);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(page.as_slice())?;
        self.file.sync_all()?; // fsync for durability

        Ok(())
    }

    /// Allocate a new page on disk.
    ///
    /// Returns the `PageId` of the newly allocated page, initialized with
    /// zeros. Reuses the lowest previously deleted id before extending the
    /// file.
    fn allocate_page(&mut self) -> Result<PageId> {
        if let Some(reused) = self.free_pages.pop_first() {
            let page_id = PageId::new(reused);
            self.write_zeros(page_id)?;
            return Ok(page_id);
        }

        let page_id = PageId::new(self.page_count);
        self.write_zeros(page_id)?;
        self.page_count += 1;
        Ok(page_id)
    }

    /// Delete a page on disk.
    ///
    /// The page content is zeroed and its id quarantined until reused.
    ///
    /// # Errors
    /// Returns `Error::PageNotFound` if the page doesn't exist.
    fn delete_page(&mut self, page_id: PageId) -> Result<()> {
        self.check_live(page_id)?;

        self.write_zeros(page_id)?;
        self.free_pages.insert(page_id.0);
        Ok(())
    }
}
