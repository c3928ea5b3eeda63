//! Buffer Pool Manager - the core page caching layer.
//!
//! The [`BufferPoolManager`] provides:
//! - Page caching between disk and memory across multiple files
//! - Pin-based reference counting
//! - Dirty page write-back on eviction and flush
//! - CLOCK (second chance) victim selection

use std::collections::HashMap;
use std::fmt;

use crate::buffer::frame::FrameMeta;
use crate::buffer::page_index::PageIndex;
use crate::buffer::replacer::ClockReplacer;
use crate::buffer::stats::BufferPoolStats;
use crate::common::{Error, FileId, FrameId, PageId, Result};
use crate::storage::{Page, PageFile};

/// Manages a fixed pool of frames caching pages from attached files.
///
/// # Architecture
/// ```text
/// ┌──────────────────────────────────────────────────────────────┐
/// │                     BufferPoolManager                        │
/// │  ┌────────────────────┐  ┌────────────────────────────────┐  │
/// │  │     page_index     │  │        pool: Vec<Page>         │  │
/// │  │(FileId,PageId)→Fid │─▶│  [Page0] [Page1] [Page2] ...   │  │
/// │  └────────────────────┘  │    frames: Vec<FrameMeta>      │  │
/// │  ┌────────────────────┐  │  [Meta0] [Meta1] [Meta2] ...   │  │
/// │  │ replacer (CLOCK)   │  └────────────────────────────────┘  │
/// │  └────────────────────┘  ┌────────────────────────────────┐  │
/// │  ┌────────────────────┐  │ files: FileId → dyn PageFile   │  │
/// │  │       stats        │  └────────────────────────────────┘  │
/// │  └────────────────────┘                                      │
/// └──────────────────────────────────────────────────────────────┘
/// ```
///
/// The pool and the descriptor table are parallel arrays; a [`FrameId`]
/// indexes both. Frame descriptors record the owning `FileId`, and the
/// attached-file registry resolves it back to a [`PageFile`], so evicting
/// a dirty victim writes it back through the right file even when the
/// eviction was triggered by a fetch against a different file.
///
/// # Pin protocol
/// A caller must hold a pin (via [`fetch_page`] or [`allocate_page`])
/// before reading or writing frame content, and must [`unpin_page`]
/// exactly once per successful pin, passing `mark_dirty = true` if it
/// mutated the page. A pin that is never returned keeps the frame
/// ineligible for eviction for the life of the pool.
///
/// # Thread Safety
/// None. Every operation takes `&mut self` and runs to completion; wrap
/// the manager in [`SharedBufferPool`] (or your own single lock) for
/// concurrent callers.
///
/// [`fetch_page`]: BufferPoolManager::fetch_page
/// [`allocate_page`]: BufferPoolManager::allocate_page
/// [`unpin_page`]: BufferPoolManager::unpin_page
/// [`SharedBufferPool`]: crate::buffer::SharedBufferPool
pub struct BufferPoolManager {
    /// Fixed pool of page-sized slots; the only place page bytes live.
    pool: Vec<Page>,

    /// Per-frame metadata, parallel to `pool`.
    frames: Vec<FrameMeta>,

    /// Maps resident (file, page) pairs to frame ids.
    page_index: PageIndex,

    /// CLOCK victim selection.
    replacer: ClockReplacer,

    /// Attached file collaborators, resolved by frame ownership.
    files: HashMap<FileId, Box<dyn PageFile>>,

    /// Performance statistics.
    stats: BufferPoolStats,

    /// Number of frames in the pool (immutable after construction).
    pool_size: usize,
}

impl BufferPoolManager {
    /// Create a new buffer pool manager with `pool_size` frames.
    ///
    /// All frames start invalid; no files are attached.
    ///
    /// # Panics
    /// Panics if `pool_size` is 0.
    pub fn new(pool_size: usize) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");

        Self {
            pool: (0..pool_size).map(|_| Page::new()).collect(),
            frames: (0..pool_size).map(|_| FrameMeta::new()).collect(),
            page_index: PageIndex::new(pool_size),
            replacer: ClockReplacer::new(pool_size),
            files: HashMap::new(),
            stats: BufferPoolStats::new(),
            pool_size,
        }
    }

    // ========================================================================
    // Public API: File registry
    // ========================================================================

    /// Attach a file so its pages can move through the pool.
    ///
    /// Returns the file's id for use with every other operation.
    pub fn attach_file(&mut self, file: Box<dyn PageFile>) -> FileId {
        let file_id = file.file_id();
        log::debug!("attaching {}", file_id);
        self.files.insert(file_id, file);
        file_id
    }

    /// Flush and detach a file, returning the collaborator.
    ///
    /// Every resident page of the file is evicted (dirty ones written
    /// back) before the file is handed back; see [`flush_file`].
    ///
    /// # Errors
    /// - `Error::FileNotAttached` if the file is unknown
    /// - `Error::PagePinned` if any of the file's pages is still pinned;
    ///   the file stays attached
    ///
    /// [`flush_file`]: BufferPoolManager::flush_file
    pub fn detach_file(&mut self, file_id: FileId) -> Result<Box<dyn PageFile>> {
        if !self.files.contains_key(&file_id) {
            return Err(Error::FileNotAttached(file_id));
        }
        self.flush_file(file_id)?;
        log::debug!("detaching {}", file_id);
        self.files
            .remove(&file_id)
            .ok_or(Error::FileNotAttached(file_id))
    }

    // ========================================================================
    // Public API: Page operations
    // ========================================================================

    /// Fetch a page, pinning it.
    ///
    /// On a hit the pin count is incremented and the reference bit set.
    /// On a miss a frame is obtained from the replacer (possibly writing
    /// back a dirty victim first), the page is read through its file, and
    /// the frame is installed pinned once.
    ///
    /// The caller owns one pin and must return it via [`unpin_page`].
    ///
    /// # Errors
    /// - `Error::FileNotAttached` if the file is unknown
    /// - `Error::PoolExhausted` if every frame is pinned
    /// - `Error::PageNotFound` if the file has no such page
    /// - `Error::Io` from disk I/O
    ///
    /// [`unpin_page`]: BufferPoolManager::unpin_page
    pub fn fetch_page(&mut self, file_id: FileId, page_id: PageId) -> Result<&mut Page> {
        if let Some(frame_id) = self.page_index.lookup(file_id, page_id) {
            self.stats.cache_hits += 1;
            self.frames[frame_id.0].pin();
            return Ok(&mut self.pool[frame_id.0]);
        }

        self.stats.cache_misses += 1;

        // Resolve the file before taking a frame, so a bad file id never
        // costs a resident page its slot.
        if !self.files.contains_key(&file_id) {
            return Err(Error::FileNotAttached(file_id));
        }

        let frame_id = self.take_frame()?;

        let page = match self.files.get_mut(&file_id) {
            Some(file) => file.read_page(page_id)?,
            None => return Err(Error::FileNotAttached(file_id)),
        };
        self.stats.pages_read += 1;

        self.pool[frame_id.0].copy_from(&page);
        self.frames[frame_id.0].set(file_id, page_id);
        self.page_index.insert(file_id, page_id, frame_id);

        log::trace!("installed {} of {} into {}", page_id, file_id, frame_id);
        Ok(&mut self.pool[frame_id.0])
    }

    /// Return one pin for a page, optionally marking it dirty.
    ///
    /// `mark_dirty` only ever sets the dirty bit; passing `false` never
    /// clears it. Unpinning performs no eviction and no flush.
    ///
    /// # Errors
    /// `Error::PageNotPinned` if the page is not resident or its pin
    /// count is already zero. Both are caller bugs: unpins must pair
    /// one-to-one with pins.
    pub fn unpin_page(&mut self, file_id: FileId, page_id: PageId, mark_dirty: bool) -> Result<()> {
        let not_pinned = Error::PageNotPinned { file_id, page_id };

        let Some(frame_id) = self.page_index.lookup(file_id, page_id) else {
            return Err(not_pinned);
        };

        let meta = &mut self.frames[frame_id.0];
        if !meta.is_pinned() {
            return Err(not_pinned);
        }

        meta.unpin();
        if mark_dirty {
            meta.mark_dirty();
        }
        Ok(())
    }

    /// Materialize a brand-new page on disk and pin it in a frame.
    ///
    /// Returns the new page id and the writable frame content, zeroed.
    /// The caller is expected to populate it and eventually unpin with
    /// `mark_dirty = true`.
    ///
    /// # Errors
    /// - `Error::FileNotAttached` if the file is unknown
    /// - `Error::PoolExhausted` if every frame is pinned; the page
    ///   allocated on disk is deleted again before the error propagates
    /// - `Error::Io` from disk I/O
    pub fn allocate_page(&mut self, file_id: FileId) -> Result<(PageId, &mut Page)> {
        let page_id = match self.files.get_mut(&file_id) {
            Some(file) => file.allocate_page()?,
            None => return Err(Error::FileNotAttached(file_id)),
        };

        let frame_id = match self.take_frame() {
            Ok(frame_id) => frame_id,
            Err(err) => {
                // Undo the disk allocation; the frame failure is the error
                // worth reporting.
                if let Some(file) = self.files.get_mut(&file_id) {
                    let _ = file.delete_page(page_id);
                }
                return Err(err);
            }
        };

        self.pool[frame_id.0].reset();
        self.frames[frame_id.0].set(file_id, page_id);
        self.page_index.insert(file_id, page_id, frame_id);

        log::trace!("allocated {} of {} into {}", page_id, file_id, frame_id);
        Ok((page_id, &mut self.pool[frame_id.0]))
    }

    /// Delete a page, evicting it from the pool if resident.
    ///
    /// The frame is force-cleared even while pinned: the caller requesting
    /// deletion is authoritative, and the page's content is discarded
    /// without write-back. Outstanding pins on a disposed page are caller
    /// bugs; their eventual unpins report `PageNotPinned`.
    ///
    /// If the page is not resident only the on-disk deletion occurs.
    ///
    /// # Errors
    /// - `Error::FileNotAttached` if the file is unknown
    /// - `Error::PageNotFound` if the file has no such page
    /// - `Error::Io` from disk I/O
    pub fn dispose_page(&mut self, file_id: FileId, page_id: PageId) -> Result<()> {
        if !self.files.contains_key(&file_id) {
            return Err(Error::FileNotAttached(file_id));
        }

        if let Some(frame_id) = self.page_index.lookup(file_id, page_id) {
            self.page_index.remove(file_id, page_id);
            self.frames[frame_id.0].reset();
            log::debug!("disposed resident {} of {} from {}", page_id, file_id, frame_id);
        }

        match self.files.get_mut(&file_id) {
            Some(file) => file.delete_page(page_id),
            None => Err(Error::FileNotAttached(file_id)),
        }
    }

    /// Evict every resident page of a file, writing back dirty ones.
    ///
    /// Used before a file is closed or dropped from the pool. After a
    /// successful flush no frame holds a page of this file, and every
    /// dirty page reached disk exactly once.
    ///
    /// # Errors
    /// - `Error::FileNotAttached` if the file is unknown
    /// - `Error::PagePinned` if a resident page of the file is pinned;
    ///   the remainder of the flush is aborted and the caller must retry
    ///   after unpinning
    /// - `Error::BadBuffer` if an invalid frame claims ownership for this
    ///   file; an internal invariant violation, not recoverable
    /// - `Error::Io` from disk I/O
    pub fn flush_file(&mut self, file_id: FileId) -> Result<()> {
        if !self.files.contains_key(&file_id) {
            return Err(Error::FileNotAttached(file_id));
        }

        for idx in 0..self.frames.len() {
            let Some((owner_file, owner_page)) = self.frames[idx].owner() else {
                continue;
            };
            if owner_file != file_id {
                continue;
            }

            // A frame can never hold file ownership without being valid.
            if !self.frames[idx].is_valid() {
                return Err(Error::BadBuffer(FrameId::new(idx)));
            }

            if self.frames[idx].is_pinned() {
                return Err(Error::PagePinned {
                    file_id,
                    page_id: owner_page,
                });
            }

            if self.frames[idx].is_dirty() {
                let page = &self.pool[idx];
                match self.files.get_mut(&file_id) {
                    Some(file) => file.write_page(owner_page, page)?,
                    None => return Err(Error::FileNotAttached(file_id)),
                }
                self.frames[idx].clear_dirty();
                self.stats.pages_written += 1;
                log::debug!("flushed dirty {} of {}", owner_page, file_id);
            }

            self.page_index.remove(owner_file, owner_page);
            self.frames[idx].reset();
        }

        Ok(())
    }

    // ========================================================================
    // Public API: Diagnostics
    // ========================================================================

    /// Snapshot every frame's validity, ownership, and pin state.
    ///
    /// Observability only; no invariant effect.
    pub fn describe_state(&self) -> PoolState {
        let frames: Vec<FrameState> = self
            .frames
            .iter()
            .enumerate()
            .map(|(idx, meta)| FrameState {
                frame_id: FrameId::new(idx),
                valid: meta.is_valid(),
                owner: meta.owner(),
                pin_count: meta.pin_count(),
                dirty: meta.is_dirty(),
            })
            .collect();

        let valid_frames = frames.iter().filter(|f| f.valid).count();
        PoolState {
            frames,
            valid_frames,
        }
    }

    /// Get buffer pool statistics.
    pub fn stats(&self) -> &BufferPoolStats {
        &self.stats
    }

    /// Get the pool size.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Get the number of resident pages.
    pub fn resident_count(&self) -> usize {
        self.page_index.len()
    }

    /// Check whether a page is resident.
    pub fn contains_page(&self, file_id: FileId, page_id: PageId) -> bool {
        self.page_index.lookup(file_id, page_id).is_some()
    }

    /// Current pin count of a page, or `None` if not resident.
    pub fn pin_count(&self, file_id: FileId, page_id: PageId) -> Option<u32> {
        self.page_index
            .lookup(file_id, page_id)
            .map(|frame_id| self.frames[frame_id.0].pin_count())
    }

    /// Audit hook for tests: panics unless the descriptor table and page
    /// index satisfy the pool's structural invariants.
    #[doc(hidden)]
    pub fn assert_invariants(&self) {
        let mut valid_frames = 0;
        for (idx, meta) in self.frames.iter().enumerate() {
            if meta.is_valid() {
                let (file_id, page_id) = match meta.owner() {
                    Some(owner) => owner,
                    None => panic!("valid {} has no owner", FrameId::new(idx)),
                };
                assert_eq!(
                    self.page_index.lookup(file_id, page_id),
                    Some(FrameId::new(idx)),
                    "index entry missing or misdirected for valid {}",
                    FrameId::new(idx)
                );
                valid_frames += 1;
            } else {
                assert_eq!(meta.pin_count(), 0, "invalid frame with pins");
                assert!(!meta.is_dirty(), "invalid frame marked dirty");
                assert!(meta.owner().is_none(), "invalid frame with owner");
            }
        }
        // One entry per valid frame and vice versa
        assert_eq!(valid_frames, self.page_index.len());
    }

    // ========================================================================
    // Internal: Frame acquisition and eviction
    // ========================================================================

    /// Obtain a free frame, evicting a victim if necessary.
    ///
    /// On return the frame is invalid, unowned, and absent from the page
    /// index. A dirty victim is written back through its owning file
    /// before any metadata changes, so an I/O failure leaves the table
    /// and index exactly as they were.
    fn take_frame(&mut self) -> Result<FrameId> {
        let frame_id = self
            .replacer
            .select(&mut self.frames)
            .ok_or(Error::PoolExhausted)?;
        let idx = frame_id.0;

        if let Some((owner_file, owner_page)) = self.frames[idx].owner() {
            if self.frames[idx].is_dirty() {
                let page = &self.pool[idx];
                // A valid frame whose owner is not in the registry means
                // the bookkeeping is corrupt, not that the caller erred.
                let file = self
                    .files
                    .get_mut(&owner_file)
                    .ok_or(Error::BadBuffer(frame_id))?;
                file.write_page(owner_page, page)?;
                self.stats.pages_written += 1;
                log::debug!("wrote back dirty {} of {}", owner_page, owner_file);
            }

            self.page_index.remove(owner_file, owner_page);
            self.frames[idx].reset();
            self.stats.evictions += 1;
            log::debug!("evicted {} of {} from {}", owner_page, owner_file, frame_id);
        }

        Ok(frame_id)
    }
}

/// Per-frame entry in a [`PoolState`] listing.
#[derive(Debug, Clone, Copy)]
pub struct FrameState {
    pub frame_id: FrameId,
    pub valid: bool,
    pub owner: Option<(FileId, PageId)>,
    pub pin_count: u32,
    pub dirty: bool,
}

/// Point-in-time listing of every frame, for observability.
#[derive(Debug, Clone)]
pub struct PoolState {
    pub frames: Vec<FrameState>,
    pub valid_frames: usize,
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for frame in &self.frames {
            match frame.owner {
                Some((file_id, page_id)) => writeln!(
                    f,
                    "{}: {} of {} pins={}{}",
                    frame.frame_id,
                    page_id,
                    file_id,
                    frame.pin_count,
                    if frame.dirty { " dirty" } else { "" }
                )?,
                None => writeln!(f, "{}: empty", frame.frame_id)?,
            }
        }
        write!(f, "valid frames: {}", self.valid_frames)
    }
}
