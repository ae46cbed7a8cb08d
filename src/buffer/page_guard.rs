use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::PageId;

use super::{FrameHeader, PageData};

/// Called once when a guard is dropped, with the page id and whether the
/// guard modified the page.
pub(crate) type ReleaseCallback = Box<dyn FnOnce(PageId, bool) + Send + Sync>;

/// Shared part of both guards: the pinned frame and the pending unpin.
struct PinnedPage {
    page_id: PageId,
    /// Keeps the frame (and so the latched data) alive for the guard's lifetime
    _frame: Arc<FrameHeader>,
    release: Option<ReleaseCallback>,
}

impl PinnedPage {
    fn release(&mut self, is_dirty: bool) {
        if let Some(release) = self.release.take() {
            release(self.page_id, is_dirty);
        }
    }
}

/// A pinned page held in shared mode. Dropping it releases the latch and
/// then unpins the page.
pub struct ReadPageGuard {
    latch: Option<RwLockReadGuard<'static, PageData>>,
    page: PinnedPage,
}

impl ReadPageGuard {
    /// Latches an already pinned frame.
    ///
    /// # Safety
    /// `frame` must be pinned on behalf of this guard; the guard keeps the
    /// `Arc` alive so the extended latch lifetime never outlives the data.
    pub(crate) unsafe fn new(page_id: PageId, frame: Arc<FrameHeader>, release: ReleaseCallback) -> Self {
        let latch: RwLockReadGuard<'static, PageData> = std::mem::transmute(frame.data.read());
        Self {
            latch: Some(latch),
            page: PinnedPage {
                page_id,
                _frame: frame,
                release: Some(release),
            },
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page.page_id
    }

    pub fn data(&self) -> &[u8] {
        match &self.latch {
            Some(latch) => &latch[..],
            None => &[],
        }
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        self.latch.take();
        self.page.release(false);
    }
}

/// A pinned page held in exclusive mode. The first mutable access marks the
/// page dirty; dropping the guard releases the latch and then unpins.
pub struct WritePageGuard {
    latch: Option<RwLockWriteGuard<'static, PageData>>,
    page: PinnedPage,
    is_dirty: bool,
}

impl WritePageGuard {
    /// Latches an already pinned frame exclusively.
    ///
    /// # Safety
    /// Same contract as [`ReadPageGuard::new`].
    pub(crate) unsafe fn new(page_id: PageId, frame: Arc<FrameHeader>, release: ReleaseCallback) -> Self {
        let latch: RwLockWriteGuard<'static, PageData> = std::mem::transmute(frame.data.write());
        Self {
            latch: Some(latch),
            page: PinnedPage {
                page_id,
                _frame: frame,
                release: Some(release),
            },
            is_dirty: false,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page.page_id
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    pub fn data(&self) -> &[u8] {
        match &self.latch {
            Some(latch) => &latch[..],
            None => &[],
        }
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.is_dirty = true;
        match &mut self.latch {
            Some(latch) => &mut latch[..],
            None => &mut [],
        }
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.data_mut()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        self.latch.take();
        self.page.release(self.is_dirty);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{FrameId, PAGE_SIZE};
    use parking_lot::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<(PageId, bool)>>>, ReleaseCallback) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let release: ReleaseCallback = Box::new(move |pid, dirty| sink.lock().push((pid, dirty)));
        (log, release)
    }

    #[test]
    fn test_read_page_guard_releases_once() {
        let frame = Arc::new(FrameHeader::new(FrameId::new(0)));
        frame.write_data()[0] = 42;
        let (log, release) = recorder();

        let guard = unsafe { ReadPageGuard::new(PageId::new(1), Arc::clone(&frame), release) };
        assert_eq!(guard.page_id(), PageId::new(1));
        assert_eq!(guard[0], 42);
        assert_eq!(guard.len(), PAGE_SIZE);
        assert!(log.lock().is_empty());

        drop(guard);
        assert_eq!(*log.lock(), vec![(PageId::new(1), false)]);
    }

    #[test]
    fn test_write_page_guard_reports_dirty() {
        let frame = Arc::new(FrameHeader::new(FrameId::new(0)));
        let (log, release) = recorder();

        let mut guard = unsafe { WritePageGuard::new(PageId::new(2), Arc::clone(&frame), release) };
        assert!(!guard.is_dirty());
        guard[7] = 9;
        assert!(guard.is_dirty());
        drop(guard);

        assert_eq!(*log.lock(), vec![(PageId::new(2), true)]);
        assert_eq!(frame.read_data()[7], 9);
    }

    #[test]
    fn test_write_page_guard_clean_when_only_read() {
        let frame = Arc::new(FrameHeader::new(FrameId::new(0)));
        let (log, release) = recorder();

        let guard = unsafe { WritePageGuard::new(PageId::new(3), Arc::clone(&frame), release) };
        assert_eq!(guard.data()[0], 0);
        drop(guard);

        assert_eq!(*log.lock(), vec![(PageId::new(3), false)]);
    }

    #[test]
    fn test_guard_releases_latch_before_callback() {
        let frame = Arc::new(FrameHeader::new(FrameId::new(0)));
        let probe = Arc::clone(&frame);
        let relatched = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&relatched);

        let guard = unsafe {
            WritePageGuard::new(
                PageId::new(4),
                Arc::clone(&frame),
                Box::new(move |_, _| *flag.lock() = probe.data.try_write().is_some()),
            )
        };
        drop(guard);
        assert!(*relatched.lock());
    }
}
