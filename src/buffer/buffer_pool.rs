use std::sync::Arc;

use crate::common::{PageId, Result};

use super::{FrameHeader, ReadPageGuard, WritePageGuard};

/// The page cache interface shared by a single pool and a sharded pool.
///
/// `fetch_page` and `new_page` hand out a pinned frame; every such pin must be
/// balanced by exactly one `unpin_page`. The guard variants pin and latch in
/// one step and balance the pin themselves when dropped.
pub trait BufferPool: Send + Sync {
    /// Pins the page, reading it from disk if it is not resident.
    fn fetch_page(&self, page_id: PageId) -> Result<Arc<FrameHeader>>;

    /// Allocates a zeroed page, persists it, and returns it pinned.
    fn new_page(&self) -> Result<(PageId, Arc<FrameHeader>)>;

    /// Drops one pin. `is_dirty` is sticky: passing false never clears it.
    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<()>;

    /// Writes a resident page to disk whether or not it is dirty.
    fn flush_page(&self, page_id: PageId) -> Result<()>;

    fn flush_all_pages(&self) -> Result<()>;

    /// Evicts the page without writing it back and releases its id.
    /// Succeeds trivially for a page that is not resident.
    fn delete_page(&self, page_id: PageId) -> Result<()>;

    /// Total number of frames.
    fn pool_size(&self) -> usize;

    fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard>;

    fn fetch_page_write(&self, page_id: PageId) -> Result<WritePageGuard>;

    /// `new_page` returning a write guard instead of a bare pin.
    fn new_page_guarded(&self) -> Result<WritePageGuard>;
}
