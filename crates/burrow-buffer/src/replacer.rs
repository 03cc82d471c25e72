//! Page replacement policies for the buffer pool.

use crate::frame::FrameId;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Trait for page replacement algorithms.
pub trait Replacer: Send + Sync {
    /// Records that the given frame was accessed.
    fn record_access(&self, frame_id: FrameId);

    /// Selects a victim frame for eviction.
    ///
    /// `can_evict` reports whether a candidate frame may be evicted
    /// (it holds a page and is not pinned). Returns None if no frame
    /// qualifies.
    fn evict(&self, can_evict: &dyn Fn(FrameId) -> bool) -> Option<FrameId>;

    /// Forgets any state held for a frame.
    fn remove(&self, frame_id: FrameId);
}

/// Clock (second chance) replacement.
///
/// Reference bits are atomic so access recording never takes the lock;
/// only the clock hand is lock-protected.
pub struct ClockReplacer {
    num_frames: usize,
    reference_bits: Vec<AtomicBool>,
    clock_hand: Mutex<usize>,
}

impl ClockReplacer {
    /// Creates a new clock replacer over the given number of frames.
    pub fn new(num_frames: usize) -> Self {
        Self {
            num_frames,
            reference_bits: (0..num_frames).map(|_| AtomicBool::new(false)).collect(),
            clock_hand: Mutex::new(0),
        }
    }

    /// Returns the total frame capacity.
    pub fn capacity(&self) -> usize {
        self.num_frames
    }
}

impl Replacer for ClockReplacer {
    #[inline]
    fn record_access(&self, frame_id: FrameId) {
        let idx = frame_id.0 as usize;
        if idx < self.num_frames {
            self.reference_bits[idx].store(true, Ordering::Relaxed);
        }
    }

    fn evict(&self, can_evict: &dyn Fn(FrameId) -> bool) -> Option<FrameId> {
        let mut hand = self.clock_hand.lock();

        // Two full rotations: the first clears reference bits, the second
        // is guaranteed to see every evictable frame with its bit down.
        for _ in 0..(2 * self.num_frames) {
            let pos = *hand;
            *hand = (pos + 1) % self.num_frames;

            let frame_id = FrameId(pos as u32);
            if !can_evict(frame_id) {
                continue;
            }

            if self.reference_bits[pos].load(Ordering::Relaxed) {
                self.reference_bits[pos].store(false, Ordering::Relaxed);
            } else {
                return Some(frame_id);
            }
        }

        None
    }

    fn remove(&self, frame_id: FrameId) {
        let idx = frame_id.0 as usize;
        if idx < self.num_frames {
            self.reference_bits[idx].store(false, Ordering::Relaxed);
        }
    }
}
