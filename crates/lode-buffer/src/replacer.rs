//! Victim-selection policies for the buffer pool.

use crate::frame::FrameId;
use lode_common::ReplacerKind;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};

/// Trait for victim-selection algorithms.
///
/// A replacer tracks the evictable frames of one pool instance: a frame is
/// added by `unpin` when its pin count reaches zero and removed by `pin`
/// (or by being chosen as a victim). All methods are safe to call from any
/// thread; state checks happen under the replacer's own mutex.
pub trait Replacer: Send + Sync {
    /// Selects a frame to evict and removes it from the replacer.
    ///
    /// Returns None if no frames are evictable.
    fn victim(&self) -> Option<FrameId>;

    /// Marks a frame as in use; if tracked, removes it.
    fn pin(&self, frame_id: FrameId);

    /// Makes a frame evictable; no-op if it is already tracked.
    fn unpin(&self, frame_id: FrameId);

    /// Returns the number of evictable frames.
    fn size(&self) -> usize;
}

/// Builds the replacer selected by configuration.
pub fn build_replacer(kind: ReplacerKind, capacity: usize) -> Box<dyn Replacer> {
    match kind {
        ReplacerKind::Lru => Box::new(LruReplacer::new(capacity)),
        ReplacerKind::Clock => Box::new(ClockReplacer::new(capacity)),
    }
}

/// Least-recently-unpinned replacement.
///
/// Keeps evictable frames ordered with the most-recently-unpinned at the
/// front; victims are taken from the back. The buffer pool only unpins a
/// frame when its pin count reaches zero, so unpin order is recency order
/// and no timestamps are needed.
pub struct LruReplacer {
    capacity: usize,
    inner: Mutex<LruInner>,
}

struct LruInner {
    /// Evictable frames, most-recently-unpinned first.
    queue: VecDeque<FrameId>,
    /// Membership index over `queue`.
    tracked: HashSet<FrameId>,
}

impl LruReplacer {
    /// Creates an LRU replacer for a pool of `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(LruInner {
                queue: VecDeque::with_capacity(capacity),
                tracked: HashSet::with_capacity(capacity),
            }),
        }
    }
}

impl Replacer for LruReplacer {
    fn victim(&self) -> Option<FrameId> {
        let mut inner = self.inner.lock();
        let frame_id = inner.queue.pop_back()?;
        inner.tracked.remove(&frame_id);
        Some(frame_id)
    }

    fn pin(&self, frame_id: FrameId) {
        let mut inner = self.inner.lock();
        if inner.tracked.remove(&frame_id) {
            inner.queue.retain(|&f| f != frame_id);
        }
    }

    fn unpin(&self, frame_id: FrameId) {
        let mut inner = self.inner.lock();
        if inner.tracked.contains(&frame_id) {
            return;
        }
        if inner.queue.len() == self.capacity {
            if let Some(back) = inner.queue.pop_back() {
                inner.tracked.remove(&back);
            }
        }
        inner.queue.push_front(frame_id);
        inner.tracked.insert(frame_id);
    }

    fn size(&self) -> usize {
        self.inner.lock().queue.len()
    }
}

/// Clock (second-chance) replacement.
///
/// A sweep hand walks the frame range; tracked frames with their reference
/// bit set get a second chance, tracked frames with it clear are evicted,
/// untracked slots are skipped.
pub struct ClockReplacer {
    capacity: usize,
    inner: Mutex<ClockInner>,
}

struct ClockInner {
    tracked: HashSet<FrameId>,
    ref_bits: Vec<bool>,
    hand: usize,
}

impl ClockReplacer {
    /// Creates a clock replacer for a pool of `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(ClockInner {
                tracked: HashSet::with_capacity(capacity),
                ref_bits: vec![false; capacity],
                hand: 0,
            }),
        }
    }
}

impl Replacer for ClockReplacer {
    fn victim(&self) -> Option<FrameId> {
        let mut inner = self.inner.lock();
        if inner.tracked.is_empty() {
            return None;
        }

        // One rotation clears every surviving reference bit, so two
        // rotations are enough to find a victim.
        for _ in 0..2 * self.capacity {
            let hand = inner.hand;
            let frame_id = FrameId(hand as u32);
            if inner.tracked.contains(&frame_id) {
                if inner.ref_bits[hand] {
                    inner.ref_bits[hand] = false;
                } else {
                    inner.tracked.remove(&frame_id);
                    inner.hand = (hand + 1) % self.capacity;
                    return Some(frame_id);
                }
            }
            inner.hand = (hand + 1) % self.capacity;
        }

        None
    }

    fn pin(&self, frame_id: FrameId) {
        let idx = frame_id.0 as usize;
        if idx >= self.capacity {
            return;
        }
        let mut inner = self.inner.lock();
        inner.tracked.remove(&frame_id);
        inner.ref_bits[idx] = false;
    }

    fn unpin(&self, frame_id: FrameId) {
        let idx = frame_id.0 as usize;
        if idx >= self.capacity {
            return;
        }
        let mut inner = self.inner.lock();
        if inner.tracked.contains(&frame_id) {
            return;
        }
        inner.tracked.insert(frame_id);
        inner.ref_bits[idx] = true;
    }

    fn size(&self) -> usize {
        self.inner.lock().tracked.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_unpin_order_is_victim_order() {
        let replacer = LruReplacer::new(7);

        for i in [1, 2, 3, 4, 5, 6] {
            replacer.unpin(FrameId(i));
        }
        // Re-unpinning a tracked frame is a no-op.
        replacer.unpin(FrameId(1));

        assert_eq!(replacer.size(), 6);
        for expected in [1, 2, 3, 4, 5, 6] {
            assert_eq!(replacer.victim(), Some(FrameId(expected)));
        }
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_lru_pin_removes() {
        let replacer = LruReplacer::new(7);

        replacer.unpin(FrameId(1));
        replacer.unpin(FrameId(2));
        replacer.unpin(FrameId(3));

        replacer.pin(FrameId(2));
        assert_eq!(replacer.size(), 2);

        assert_eq!(replacer.victim(), Some(FrameId(1)));
        assert_eq!(replacer.victim(), Some(FrameId(3)));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_lru_pin_untracked_is_noop() {
        let replacer = LruReplacer::new(3);
        replacer.pin(FrameId(0));
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_lru_never_exceeds_capacity() {
        let replacer = LruReplacer::new(3);
        for i in 0..5 {
            replacer.unpin(FrameId(i));
        }
        assert_eq!(replacer.size(), 3);
    }

    #[test]
    fn test_lru_reunpin_after_victim() {
        let replacer = LruReplacer::new(4);

        replacer.unpin(FrameId(0));
        replacer.unpin(FrameId(1));
        assert_eq!(replacer.victim(), Some(FrameId(0)));

        // Frame 0 can be tracked again once evicted.
        replacer.unpin(FrameId(0));
        assert_eq!(replacer.victim(), Some(FrameId(1)));
        assert_eq!(replacer.victim(), Some(FrameId(0)));
    }

    #[test]
    fn test_clock_victim_empty() {
        let replacer = ClockReplacer::new(10);
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_clock_second_chance() {
        let replacer = ClockReplacer::new(3);

        replacer.unpin(FrameId(0));
        replacer.unpin(FrameId(1));
        replacer.unpin(FrameId(2));

        // All reference bits are set; the sweep clears 0, 1, 2 and then
        // evicts 0 on the second rotation.
        assert_eq!(replacer.victim(), Some(FrameId(0)));
        assert_eq!(replacer.size(), 2);

        // Bits for 1 and 2 are now clear, so eviction follows the hand.
        assert_eq!(replacer.victim(), Some(FrameId(1)));
        assert_eq!(replacer.victim(), Some(FrameId(2)));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_clock_pin_removes() {
        let replacer = ClockReplacer::new(4);

        replacer.unpin(FrameId(0));
        replacer.unpin(FrameId(1));
        replacer.pin(FrameId(0));

        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.victim(), Some(FrameId(1)));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_clock_unpin_tracked_is_noop() {
        let replacer = ClockReplacer::new(4);

        replacer.unpin(FrameId(2));
        replacer.unpin(FrameId(2));
        assert_eq!(replacer.size(), 1);
    }

    #[test]
    fn test_clock_skips_untracked_slots() {
        let replacer = ClockReplacer::new(8);

        replacer.unpin(FrameId(5));
        assert_eq!(replacer.victim(), Some(FrameId(5)));
    }

    #[test]
    fn test_clock_out_of_bounds_ignored() {
        let replacer = ClockReplacer::new(4);

        replacer.unpin(FrameId(100));
        replacer.pin(FrameId(100));
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_build_replacer_kinds() {
        let lru = build_replacer(ReplacerKind::Lru, 4);
        lru.unpin(FrameId(0));
        assert_eq!(lru.victim(), Some(FrameId(0)));

        let clock = build_replacer(ReplacerKind::Clock, 4);
        clock.unpin(FrameId(0));
        assert_eq!(clock.victim(), Some(FrameId(0)));
    }
}
