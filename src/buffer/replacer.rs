use crate::common::FrameId;

/// Eviction policy over the frames of one buffer pool.
///
/// The pool calls `pin` every time a frame is handed out and `unpin` when its
/// pin count drops to zero; only unpinned frames may be chosen as victims.
pub trait Replacer: Send + Sync {
    /// Removes and returns the frame to evict, or `None` if nothing is evictable.
    fn victim(&self) -> Option<FrameId>;

    /// Marks a frame as in use. No-op if the frame is not a candidate.
    fn pin(&self, frame_id: FrameId);

    /// Marks a frame as evictable. Unpinning an evictable frame again does nothing.
    fn unpin(&self, frame_id: FrameId);

    /// Number of evictable frames.
    fn size(&self) -> usize;

    /// Forgets everything about a frame that has been returned to the free list.
    fn remove(&self, frame_id: FrameId) {
        self.pin(frame_id);
    }
}
