//! CLOCK (second chance) replacement policy.

use crate::buffer::frame::FrameMeta;
use crate::common::FrameId;

/// Second-chance victim selection over the frame descriptor table.
///
/// The replacer owns only the rotating hand position; the descriptor table
/// is passed in by the pool on each call. Selection may clear reference
/// bits but never touches validity, pin counts, ownership, or the page
/// index. Write-back and descriptor reset stay in the pool so a failed
/// eviction leaves all metadata untouched.
///
/// # Algorithm
/// Advance the hand circularly. At each frame:
/// - invalid → select it immediately (free slot)
/// - reference bit set → clear the bit and move on (second chance)
/// - pinned → move on (in-use pages are never victims)
/// - otherwise → this is the victim
///
/// The sweep visits every frame at most twice: the second pass lets frames
/// whose reference bit was cleared on the first pass become eligible. If
/// nothing is eligible after two full passes (every frame pinned), the
/// sweep terminates with `None` instead of spinning.
#[derive(Debug)]
pub struct ClockReplacer {
    /// Current hand position; advanced before each examination.
    hand: usize,
    capacity: usize,
}

impl ClockReplacer {
    /// Create a replacer for a pool of `capacity` frames.
    ///
    /// # Panics
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be > 0");
        Self {
            // One slot before frame 0, so the first sweep examines frame 0
            // first.
            hand: capacity - 1,
            capacity,
        }
    }

    /// Advance the hand with wraparound.
    fn advance(&mut self) {
        self.hand = (self.hand + 1) % self.capacity;
    }

    /// Select a free frame or an eviction victim.
    ///
    /// Returns `None` when no frame is eligible within two full passes.
    /// A returned frame is either invalid (free) or valid, unpinned, and
    /// unreferenced; the pool handles write-back and reuse.
    pub fn select(&mut self, frames: &mut [FrameMeta]) -> Option<FrameId> {
        debug_assert_eq!(frames.len(), self.capacity);

        for _ in 0..self.capacity * 2 {
            self.advance();
            let meta = &mut frames[self.hand];

            if !meta.is_valid() {
                return Some(FrameId::new(self.hand));
            }
            if meta.is_referenced() {
                meta.clear_ref();
                continue;
            }
            if meta.is_pinned() {
                continue;
            }
            return Some(FrameId::new(self.hand));
        }

        None
    }
}
