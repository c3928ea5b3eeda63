//! Buffer pool operation tests.
//!
//! These run against an in-memory `PageFile` double that logs every read
//! and write-back per page, so the tests can assert not just outcomes but
//! I/O counts and ordering (e.g. "written back exactly once, before the
//! replacement page was read").

use std::sync::Arc;

use parking_lot::Mutex;

use vanedb::{BufferPoolManager, Error, FileId, Page, PageFile, PageId, Result};

// ============================================================================
// Instrumented in-memory PageFile
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IoEvent {
    Read(PageId),
    Write(PageId),
}

#[derive(Default)]
struct IoLog {
    events: Vec<IoEvent>,
}

impl IoLog {
    fn reads_for(&self, page_id: PageId) -> usize {
        self.events
            .iter()
            .filter(|e| **e == IoEvent::Read(page_id))
            .count()
    }

    fn writes_for(&self, page_id: PageId) -> usize {
        self.events
            .iter()
            .filter(|e| **e == IoEvent::Write(page_id))
            .count()
    }

    fn position(&self, event: IoEvent) -> Option<usize> {
        self.events.iter().position(|e| *e == event)
    }
}

/// In-memory page storage logging all I/O.
struct MemFile {
    file_id: FileId,
    pages: Vec<Option<Page>>,
    log: Arc<Mutex<IoLog>>,
}

impl MemFile {
    /// A file with `pages` pre-allocated zeroed pages, plus a handle to
    /// its I/O log.
    fn with_pages(pages: u32) -> (Self, Arc<Mutex<IoLog>>) {
        let log = Arc::new(Mutex::new(IoLog::default()));
        let file = Self {
            file_id: FileId::next(),
            pages: (0..pages).map(|_| Some(Page::new())).collect(),
            log: Arc::clone(&log),
        };
        (file, log)
    }

    fn not_found(&self, page_id: PageId) -> Error {
        Error::PageNotFound {
            file_id: self.file_id,
            page_id,
        }
    }
}

impl PageFile for MemFile {
    fn file_id(&self) -> FileId {
        self.file_id
    }

    fn read_page(&mut self, page_id: PageId) -> Result<Page> {
        let slot = self
            .pages
            .get(page_id.0 as usize)
            .and_then(|slot| slot.as_ref())
            .ok_or_else(|| self.not_found(page_id))?;

        let mut page = Page::new();
        page.copy_from(slot);
        self.log.lock().events.push(IoEvent::Read(page_id));
        Ok(page)
    }

    fn write_page(&mut self, page_id: PageId, page: &Page) -> Result<()> {
        let not_found = self.not_found(page_id);
        let slot = self
            .pages
            .get_mut(page_id.0 as usize)
            .and_then(|slot| slot.as_mut())
            .ok_or(not_found)?;

        slot.copy_from(page);
        self.log.lock().events.push(IoEvent::Write(page_id));
        Ok(())
    }

    fn allocate_page(&mut self) -> Result<PageId> {
        if let Some(idx) = self.pages.iter().position(|slot| slot.is_none()) {
            self.pages[idx] = Some(Page::new());
            return Ok(PageId::new(idx as u32));
        }
        self.pages.push(Some(Page::new()));
        Ok(PageId::new(self.pages.len() as u32 - 1))
    }

    fn delete_page(&mut self, page_id: PageId) -> Result<()> {
        let not_found = self.not_found(page_id);
        match self.pages.get_mut(page_id.0 as usize) {
            Some(slot) if slot.is_some() => {
                *slot = None;
                Ok(())
            }
            _ => Err(not_found),
        }
    }
}

fn create_pool(pool_size: usize, pages: u32) -> (BufferPoolManager, FileId, Arc<Mutex<IoLog>>) {
    let (file, log) = MemFile::with_pages(pages);
    let mut pool = BufferPoolManager::new(pool_size);
    let file_id = pool.attach_file(Box::new(file));
    (pool, file_id, log)
}

// ============================================================================
// Pin accounting
// ============================================================================

/// Scenario: fetching the same page twice without an intervening unpin
/// doubles the pin count but keeps exactly one resident frame.
#[test]
fn test_double_fetch_single_residency() {
    let (mut pool, file_id, log) = create_pool(4, 2);
    let pid = PageId::new(0);

    pool.fetch_page(file_id, pid).unwrap();
    pool.fetch_page(file_id, pid).unwrap();

    assert_eq!(pool.pin_count(file_id, pid), Some(2));
    assert_eq!(pool.resident_count(), 1);
    assert_eq!(log.lock().reads_for(pid), 1);
    pool.assert_invariants();
}

/// Scenario: unpinning more times than pinned is a caller bug.
#[test]
fn test_over_unpin_fails() {
    let (mut pool, file_id, _log) = create_pool(4, 1);
    let pid = PageId::new(0);

    pool.fetch_page(file_id, pid).unwrap();
    pool.fetch_page(file_id, pid).unwrap();

    pool.unpin_page(file_id, pid, false).unwrap();
    pool.unpin_page(file_id, pid, false).unwrap();

    let result = pool.unpin_page(file_id, pid, false);
    assert!(matches!(result, Err(Error::PageNotPinned { .. })));
    assert_eq!(pool.pin_count(file_id, pid), Some(0));
}

// ============================================================================
// Exhaustion and eviction
// ============================================================================

/// Scenario: a pool of size N with N distinct pinned pages cannot admit an
/// (N+1)-th; the replacer never selects a pinned frame.
#[test]
fn test_pool_exhausted_when_all_pinned() {
    const FRAMES: usize = 3;
    let (mut pool, file_id, _log) = create_pool(FRAMES, FRAMES as u32 + 1);

    for i in 0..FRAMES {
        pool.fetch_page(file_id, PageId::new(i as u32)).unwrap();
    }

    let result = pool.fetch_page(file_id, PageId::new(FRAMES as u32));
    assert!(matches!(result, Err(Error::PoolExhausted)));

    // Nothing was evicted to make room
    for i in 0..FRAMES {
        assert!(pool.contains_page(file_id, PageId::new(i as u32)));
        assert_eq!(pool.pin_count(file_id, PageId::new(i as u32)), Some(1));
    }
    pool.assert_invariants();
}

/// Scenario (capacity 2): fetch A and B, both pinned; C fails with
/// PoolExhausted; unpin A dirty; C now succeeds, A is evicted, and A's
/// content is written back exactly once *before* C is read in.
#[test]
fn test_eviction_write_back_ordering() {
    let (mut pool, file_id, log) = create_pool(2, 3);
    let (a, b, c) = (PageId::new(0), PageId::new(1), PageId::new(2));

    let page = pool.fetch_page(file_id, a).unwrap();
    page.as_mut_slice()[0] = 0xAA;
    pool.fetch_page(file_id, b).unwrap();

    assert!(matches!(
        pool.fetch_page(file_id, c),
        Err(Error::PoolExhausted)
    ));

    pool.unpin_page(file_id, a, true).unwrap();

    pool.fetch_page(file_id, c).unwrap();

    assert!(!pool.contains_page(file_id, a));
    assert!(pool.contains_page(file_id, c));
    assert_eq!(pool.pin_count(file_id, c), Some(1));

    let log = log.lock();
    assert_eq!(log.writes_for(a), 1);
    let write_a = log.position(IoEvent::Write(a)).unwrap();
    let read_c = log.position(IoEvent::Read(c)).unwrap();
    assert!(write_a < read_c, "write-back must precede the install");
    pool.assert_invariants();
}

/// Scenario: the dirty bit actually carries the caller's bytes. Evict a
/// dirty page, refetch it, and find the mutation.
#[test]
fn test_evicted_dirty_page_survives_round_trip() {
    let (mut pool, file_id, log) = create_pool(1, 2);
    let (a, b) = (PageId::new(0), PageId::new(1));

    let page = pool.fetch_page(file_id, a).unwrap();
    page.as_mut_slice()[123] = 0x42;
    pool.unpin_page(file_id, a, true).unwrap();

    // Evict A
    pool.fetch_page(file_id, b).unwrap();
    pool.unpin_page(file_id, b, false).unwrap();

    // Re-read A from the file
    let page = pool.fetch_page(file_id, a).unwrap();
    assert_eq!(page.as_slice()[123], 0x42);
    assert_eq!(log.lock().reads_for(a), 2);
}

/// Scenario: with an unreferenced eligible frame available, a referenced
/// frame is passed over by the sweep (its second chance).
#[test]
fn test_referenced_frame_survives_sweep() {
    let (mut pool, file_id, _log) = create_pool(2, 4);
    let (a, b, c, d) = (
        PageId::new(0),
        PageId::new(1),
        PageId::new(2),
        PageId::new(3),
    );

    pool.fetch_page(file_id, a).unwrap();
    pool.unpin_page(file_id, a, false).unwrap();
    pool.fetch_page(file_id, b).unwrap();
    pool.unpin_page(file_id, b, false).unwrap();

    // This sweep clears A's and B's reference bits and evicts A;
    // C is installed referenced.
    pool.fetch_page(file_id, c).unwrap();
    pool.unpin_page(file_id, c, false).unwrap();

    // B is now unreferenced, C referenced: the next victim must be B.
    pool.fetch_page(file_id, d).unwrap();

    assert!(pool.contains_page(file_id, c));
    assert!(!pool.contains_page(file_id, b));
    pool.assert_invariants();
}

// ============================================================================
// Flush
// ============================================================================

/// Scenario: fetch P, unpin dirty, flush. P is written back exactly once,
/// its frame invalidated, and a refetch reads from the file rather than
/// serving stale cache.
#[test]
fn test_flush_then_refetch_reads_disk() {
    let (mut pool, file_id, log) = create_pool(4, 1);
    let pid = PageId::new(0);

    let page = pool.fetch_page(file_id, pid).unwrap();
    page.as_mut_slice()[0] = 0x99;
    pool.unpin_page(file_id, pid, true).unwrap();

    pool.flush_file(file_id).unwrap();

    assert_eq!(pool.resident_count(), 0);
    assert_eq!(log.lock().writes_for(pid), 1);

    let page = pool.fetch_page(file_id, pid).unwrap();
    assert_eq!(page.as_slice()[0], 0x99);
    assert_eq!(log.lock().reads_for(pid), 2);
}

/// flushFile never issues a write-back for a clean frame.
#[test]
fn test_flush_skips_clean_frames() {
    let (mut pool, file_id, log) = create_pool(4, 3);

    for i in 0..3 {
        pool.fetch_page(file_id, PageId::new(i)).unwrap();
        pool.unpin_page(file_id, PageId::new(i), false).unwrap();
    }

    pool.flush_file(file_id).unwrap();

    assert_eq!(pool.resident_count(), 0);
    assert!(log.lock().events.iter().all(|e| !matches!(*e, IoEvent::Write(_))));
}

/// A pinned page aborts the flush; the caller unpins and retries.
#[test]
fn test_flush_aborts_on_pinned_page() {
    let (mut pool, file_id, _log) = create_pool(4, 2);

    pool.fetch_page(file_id, PageId::new(0)).unwrap();
    pool.fetch_page(file_id, PageId::new(1)).unwrap();
    pool.unpin_page(file_id, PageId::new(1), true).unwrap();

    assert!(matches!(
        pool.flush_file(file_id),
        Err(Error::PagePinned { .. })
    ));

    pool.unpin_page(file_id, PageId::new(0), false).unwrap();
    pool.flush_file(file_id).unwrap();
    assert_eq!(pool.resident_count(), 0);
    pool.assert_invariants();
}

// ============================================================================
// Dispose
// ============================================================================

/// Disposal is unconditional: a pinned page is force-cleared, its frame
/// immediately reusable, and its content never written back.
#[test]
fn test_dispose_pinned_force_clears() {
    let (mut pool, file_id, log) = create_pool(1, 2);
    let (a, b) = (PageId::new(0), PageId::new(1));

    let page = pool.fetch_page(file_id, a).unwrap();
    page.as_mut_slice()[0] = 0xFF;
    // Still pinned and dirty when disposed
    pool.dispose_page(file_id, a).unwrap();

    assert!(!pool.contains_page(file_id, a));
    assert_eq!(log.lock().writes_for(a), 0);

    // The only frame is free again without any unpin
    pool.fetch_page(file_id, b).unwrap();
    pool.assert_invariants();

    // The leaked pin is the caller's bug
    assert!(matches!(
        pool.unpin_page(file_id, a, false),
        Err(Error::PageNotPinned { .. })
    ));
}

/// Disposing a non-resident page touches only the file.
#[test]
fn test_dispose_non_resident() {
    let (mut pool, file_id, _log) = create_pool(2, 2);
    let pid = PageId::new(1);

    pool.dispose_page(file_id, pid).unwrap();

    assert!(matches!(
        pool.fetch_page(file_id, pid),
        Err(Error::PageNotFound { .. })
    ));
    pool.assert_invariants();
}

/// A disposed page's id can come back from allocate_page; the new
/// incarnation starts zeroed, not with the old content.
#[test]
fn test_disposed_id_reincarnates_zeroed() {
    let (mut pool, file_id, _log) = create_pool(2, 0);

    let (pid, page) = pool.allocate_page(file_id).unwrap();
    page.as_mut_slice()[0] = 0x55;
    pool.unpin_page(file_id, pid, true).unwrap();

    pool.dispose_page(file_id, pid).unwrap();

    let (reused, page) = pool.allocate_page(file_id).unwrap();
    assert_eq!(reused, pid);
    assert!(page.as_slice().iter().all(|&b| b == 0));
    pool.assert_invariants();
}
