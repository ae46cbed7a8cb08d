use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::{FrameId, PageId, INVALID_PAGE_ID, PAGE_SIZE};

pub type PageData = Box<[u8; PAGE_SIZE]>;

/// One frame of the buffer pool: the bytes of whichever page currently lives
/// in it plus the bookkeeping the pool keeps about that page.
///
/// `page_id`, `pin_count` and `is_dirty` are only changed while the owning
/// pool's lock is held; they are atomics so they can be read without it.
/// The page bytes sit behind their own latch, independent of the pool lock.
pub struct FrameHeader {
    frame_id: FrameId,
    page_id: AtomicU32,
    pin_count: AtomicU32,
    is_dirty: AtomicBool,
    pub(crate) data: RwLock<PageData>,
}

impl FrameHeader {
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            page_id: AtomicU32::new(INVALID_PAGE_ID.as_u32()),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
            data: RwLock::new(Box::new([0u8; PAGE_SIZE])),
        }
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Page held by this frame, `INVALID_PAGE_ID` when the frame is free.
    pub fn page_id(&self) -> PageId {
        PageId::new(self.page_id.load(Ordering::Acquire))
    }

    pub(crate) fn set_page_id(&self, page_id: PageId) {
        self.page_id.store(page_id.as_u32(), Ordering::Release);
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Increments the pin count and returns the new value.
    pub(crate) fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrements the pin count and returns the new value,
    /// or `None` if it was already zero.
    pub(crate) fn unpin(&self) -> Option<u32> {
        self.pin_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| count.checked_sub(1))
            .ok()
            .map(|previous| previous - 1)
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    pub(crate) fn set_dirty(&self, dirty: bool) {
        self.is_dirty.store(dirty, Ordering::Release);
    }

    /// Takes the page latch in shared mode.
    pub fn read_data(&self) -> RwLockReadGuard<'_, PageData> {
        self.data.read()
    }

    /// Takes the page latch in exclusive mode. Callers that modify the bytes
    /// must report the page dirty when they unpin it.
    pub fn write_data(&self) -> RwLockWriteGuard<'_, PageData> {
        self.data.write()
    }

    pub(crate) fn copy_from(&self, data: &[u8]) {
        self.data.write().copy_from_slice(data);
    }

    /// Returns the frame to its never-used state.
    pub(crate) fn reset(&self) {
        self.set_page_id(INVALID_PAGE_ID);
        self.pin_count.store(0, Ordering::Release);
        self.set_dirty(false);
        self.data.write().fill(0);
    }
}
