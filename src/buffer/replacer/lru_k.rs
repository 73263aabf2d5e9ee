//! LRU-K replacement policy.
//!
//! Plain LRU is blind to frequency: one sequential scan touches every frame
//! once and pushes the real working set out. LRU-K instead ranks frames by
//! *backward k-distance*, the age of the k-th most recent access. A frame
//! that has not yet been touched k times has infinite distance and is
//! evicted first, so scan pages never outrank pages with a full history.
//! Among the infinite-distance frames the one touched earliest goes first,
//! which is ordinary LRU over the newcomers.

use std::collections::{HashMap, VecDeque};

use crate::common::FrameId;

/// Per-frame access bookkeeping.
struct FrameAccess {
    /// Up to k logical timestamps, oldest first.
    history: VecDeque<u64>,
    /// Whether the buffer pool currently allows evicting this frame.
    evictable: bool,
}

impl FrameAccess {
    fn new() -> Self {
        Self {
            history: VecDeque::new(),
            evictable: false,
        }
    }
}

/// Selects eviction victims by largest backward k-distance.
///
/// The replacer is a pure policy engine over frame ids: it knows nothing of
/// pages, pin counts, or dirty bits. The buffer pool tells it which frames
/// are evictable and asks `evict` for a victim; tracked frames start
/// non-evictable because every access happens on behalf of a pinned frame.
///
/// Methods take `&mut self`; the owning pool serializes calls under its
/// latch. Timestamps come from one monotonic counter, so there is a total
/// order on access events across all frames.
pub struct LruKReplacer {
    /// Access history per tracked frame.
    frames: HashMap<FrameId, FrameAccess>,
    /// Logical clock, bumped on every recorded access.
    current_ts: u64,
    /// Number of tracked frames with the evictable flag set.
    evictable_count: usize,
    /// Frame ids must be below this bound.
    num_frames: usize,
    k: usize,
}

impl LruKReplacer {
    /// Create a replacer for `num_frames` frames using the k-th most recent
    /// access as the distance metric.
    ///
    /// # Panics
    /// Panics if `k` is 0.
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k >= 1, "LRU-K requires k >= 1");

        Self {
            frames: HashMap::new(),
            current_ts: 0,
            evictable_count: 0,
            num_frames,
            k,
        }
    }

    /// Record an access to a frame, creating its entry on first touch.
    ///
    /// Only the k most recent timestamps are kept.
    ///
    /// # Panics
    /// Panics if the frame id is out of range.
    pub fn record_access(&mut self, frame_id: FrameId) {
        self.check_bounds(frame_id);

        let access = self.frames.entry(frame_id).or_insert_with(FrameAccess::new);
        access.history.push_back(self.current_ts);
        if access.history.len() > self.k {
            access.history.pop_front();
        }

        self.current_ts += 1;
    }

    /// Set whether a frame may be evicted. Untracked frames are ignored.
    ///
    /// # Panics
    /// Panics if the frame id is out of range.
    pub fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        self.check_bounds(frame_id);

        let Some(access) = self.frames.get_mut(&frame_id) else {
            return;
        };
        if access.evictable == evictable {
            return;
        }

        access.evictable = evictable;
        if evictable {
            self.evictable_count += 1;
        } else {
            self.evictable_count -= 1;
        }
    }

    /// Drop a frame's history entirely, e.g. when its page is deleted.
    ///
    /// Removing a frame the pool still considers in use is a bug in the
    /// caller, hence the assertion rather than an error return.
    ///
    /// # Panics
    /// Panics if the frame id is out of range or the frame is tracked but
    /// not evictable.
    pub fn remove(&mut self, frame_id: FrameId) {
        self.check_bounds(frame_id);

        let Some(access) = self.frames.get(&frame_id) else {
            return;
        };
        assert!(access.evictable, "cannot remove a non-evictable frame");

        self.frames.remove(&frame_id);
        self.evictable_count -= 1;
    }

    /// Evict the evictable frame with the largest backward k-distance.
    ///
    /// Frames with fewer than k recorded accesses count as infinitely
    /// distant and are preferred; ties among them go to the earliest first
    /// access. The victim's history is dropped.
    ///
    /// Returns `None` iff no frame is evictable.
    pub fn evict(&mut self) -> Option<FrameId> {
        if self.evictable_count == 0 {
            return None;
        }

        let mut victim: Option<FrameId> = None;
        let mut max_distance: u64 = 0;
        let mut earliest_first_ts: u64 = u64::MAX;

        for (&frame_id, access) in &self.frames {
            if !access.evictable {
                continue;
            }

            if access.history.len() < self.k {
                // Infinite distance. Break ties by the oldest first access.
                let first_ts = access.history.front().copied().unwrap_or(0);
                if max_distance < u64::MAX || first_ts < earliest_first_ts {
                    max_distance = u64::MAX;
                    earliest_first_ts = first_ts;
                    victim = Some(frame_id);
                }
            } else {
                // The front of the bounded history is the k-th most recent
                // access; distances are unique because timestamps are.
                let kth_ts = access.history.front().copied().unwrap_or(0);
                let distance = self.current_ts - kth_ts;
                if distance > max_distance {
                    max_distance = distance;
                    victim = Some(frame_id);
                }
            }
        }

        let frame_id = victim.expect("evictable_count > 0 but no victim found");
        self.frames.remove(&frame_id);
        self.evictable_count -= 1;

        Some(frame_id)
    }

    /// Number of evictable frames.
    pub fn size(&self) -> usize {
        self.evictable_count
    }

    fn check_bounds(&self, frame_id: FrameId) {
        assert!(
            frame_id.0 < self.num_frames,
            "frame id {} out of range (pool has {} frames)",
            frame_id,
            self.num_frames
        );
    }
}
