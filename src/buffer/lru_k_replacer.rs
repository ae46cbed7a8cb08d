use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::common::{FrameId, Timestamp};

use super::Replacer;

#[derive(Debug, Default)]
struct AccessHistory {
    /// Up to the last k access times, oldest first
    accesses: VecDeque<Timestamp>,
    evictable: bool,
}

impl AccessHistory {
    fn record(&mut self, now: Timestamp, k: usize) {
        self.accesses.push_back(now);
        if self.accesses.len() > k {
            self.accesses.pop_front();
        }
    }

    /// Eviction rank: frames with fewer than k accesses (infinite backward
    /// k-distance) come first, ordered by their earliest access; the rest are
    /// ordered by the time of their k-th most recent access.
    fn rank(&self, k: usize) -> (bool, Timestamp) {
        let oldest = self.accesses.front().copied().unwrap_or(0);
        (self.accesses.len() >= k, oldest)
    }
}

struct LruKState {
    clock: Timestamp,
    frames: HashMap<FrameId, AccessHistory>,
    num_evictable: usize,
}

/// LRU-K eviction: evicts the frame whose k-th most recent access lies
/// furthest in the past.
pub struct LruKReplacer {
    k: usize,
    num_frames: usize,
    state: Mutex<LruKState>,
}

impl LruKReplacer {
    pub fn new(k: usize, num_frames: usize) -> Self {
        assert!(k > 0, "LRU-K needs k >= 1");
        Self {
            k,
            num_frames,
            state: Mutex::new(LruKState {
                clock: 0,
                frames: HashMap::with_capacity(num_frames),
                num_evictable: 0,
            }),
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    fn set_evictable(state: &mut LruKState, frame_id: FrameId, evictable: bool) {
        let history = state.frames.entry(frame_id).or_default();
        if history.evictable == evictable {
            return;
        }
        history.evictable = evictable;
        if evictable {
            state.num_evictable += 1;
        } else {
            state.num_evictable -= 1;
        }
    }
}

impl Replacer for LruKReplacer {
    fn victim(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        let frame_id = state
            .frames
            .iter()
            .filter(|(_, history)| history.evictable)
            .min_by_key(|(_, history)| history.rank(self.k))
            .map(|(&frame_id, _)| frame_id)?;

        state.frames.remove(&frame_id);
        state.num_evictable -= 1;
        Some(frame_id)
    }

    /// Records an access and makes the frame non-evictable.
    fn pin(&self, frame_id: FrameId) {
        debug_assert!(frame_id.as_usize() < self.num_frames);
        let mut state = self.state.lock();
        let now = state.clock;
        state.clock += 1;
        state.frames.entry(frame_id).or_default().record(now, self.k);
        Self::set_evictable(&mut state, frame_id, false);
    }

    fn unpin(&self, frame_id: FrameId) {
        debug_assert!(frame_id.as_usize() < self.num_frames);
        let mut state = self.state.lock();
        Self::set_evictable(&mut state, frame_id, true);
    }

    fn size(&self) -> usize {
        self.state.lock().num_evictable
    }

    fn remove(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        if let Some(history) = state.frames.remove(&frame_id) {
            if history.evictable {
                state.num_evictable -= 1;
            }
        }
    }
}
