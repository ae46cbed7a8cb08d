use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;

use crate::common::FrameId;

use super::Replacer;

struct LruState {
    /// Candidate frame -> the stamp it was unpinned at
    stamps: HashMap<FrameId, u64>,
    /// Stamp -> candidate frame, oldest first
    order: BTreeMap<u64, FrameId>,
    next_stamp: u64,
}

/// Least-recently-unpinned eviction.
///
/// A frame joins the candidate set when it is unpinned and keeps its position
/// until it is pinned again or chosen as the victim.
pub struct LruReplacer {
    num_frames: usize,
    state: Mutex<LruState>,
}

impl LruReplacer {
    pub fn new(num_frames: usize) -> Self {
        Self {
            num_frames,
            state: Mutex::new(LruState {
                stamps: HashMap::with_capacity(num_frames),
                order: BTreeMap::new(),
                next_stamp: 0,
            }),
        }
    }
}

impl Replacer for LruReplacer {
    fn victim(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        let (_, frame_id) = state.order.pop_first()?;
        state.stamps.remove(&frame_id);
        Some(frame_id)
    }

    fn pin(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        if let Some(stamp) = state.stamps.remove(&frame_id) {
            state.order.remove(&stamp);
        }
    }

    fn unpin(&self, frame_id: FrameId) {
        debug_assert!(frame_id.as_usize() < self.num_frames);
        let mut state = self.state.lock();
        if state.stamps.contains_key(&frame_id) {
            return;
        }
        let stamp = state.next_stamp;
        state.next_stamp += 1;
        state.stamps.insert(frame_id, stamp);
        state.order.insert(stamp, frame_id);
    }

    fn size(&self) -> usize {
        self.state.lock().stamps.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_replacer_victim_order() {
        let replacer = LruReplacer::new(7);
        for i in [1, 2, 3, 4, 5, 6, 1] {
            replacer.unpin(FrameId::new(i));
        }
        assert_eq!(replacer.size(), 6);

        assert_eq!(replacer.victim(), Some(FrameId::new(1)));
        assert_eq!(replacer.victim(), Some(FrameId::new(2)));
        assert_eq!(replacer.victim(), Some(FrameId::new(3)));

        replacer.pin(FrameId::new(3));
        replacer.pin(FrameId::new(4));
        assert_eq!(replacer.size(), 2);

        replacer.unpin(FrameId::new(4));
        assert_eq!(replacer.victim(), Some(FrameId::new(5)));
        assert_eq!(replacer.victim(), Some(FrameId::new(6)));
        assert_eq!(replacer.victim(), Some(FrameId::new(4)));
        assert_eq!(replacer.victim(), None);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_lru_replacer_remove() {
        let replacer = LruReplacer::new(3);
        replacer.unpin(FrameId::new(0));
        replacer.unpin(FrameId::new(1));
        replacer.remove(FrameId::new(0));
        assert_eq!(replacer.victim(), Some(FrameId::new(1)));
        assert_eq!(replacer.victim(), None);
    }
}
