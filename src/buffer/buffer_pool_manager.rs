use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::common::{FrameId, PageId, Result, SiloError, INVALID_PAGE_ID, PAGE_SIZE};
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::{
    BufferPool, FrameHeader, LruReplacer, ReadPageGuard, ReleaseCallback, Replacer, WritePageGuard,
};

static ZERO_PAGE: [u8; PAGE_SIZE] = [0u8; PAGE_SIZE];

/// Bookkeeping guarded by the pool lock
struct PoolState {
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
    /// Next never-used page id this pool will hand out
    next_page_id: u32,
    /// Ids released by `delete_page`, reused most recent first
    free_page_ids: Vec<PageId>,
}

/// The part of the pool that page guards call back into when they drop.
struct PoolCore {
    frames: Vec<Arc<FrameHeader>>,
    state: Mutex<PoolState>,
    replacer: Box<dyn Replacer>,
}

impl PoolCore {
    fn unpin(&self, page_id: PageId, is_dirty: bool) -> Result<()> {
        let state = self.state.lock();
        let frame_id = *state
            .page_table
            .get(&page_id)
            .ok_or(SiloError::PageNotFound(page_id))?;
        let frame = &self.frames[frame_id.as_usize()];

        if frame.pin_count() == 0 {
            return Err(SiloError::PageNotPinned(page_id));
        }
        if is_dirty {
            frame.set_dirty(true);
        }
        if frame.unpin() == Some(0) {
            self.replacer.unpin(frame_id);
        }
        Ok(())
    }

    fn release_callback(self: &Arc<Self>) -> ReleaseCallback {
        let core = Arc::clone(self);
        Box::new(move |page_id, is_dirty| {
            if let Err(e) = core.unpin(page_id, is_dirty) {
                log::warn!("page guard release for {} failed: {}", page_id, e);
            }
        })
    }
}

/// BufferPoolManager caches a fixed number of pages in memory, reading them
/// from disk on demand and writing dirty pages back when their frame is
/// reused.
///
/// One pool lock serializes the page table, free list, id allocator and
/// replacer, and is held across the disk I/O of a miss, an eviction or a
/// flush. Page contents are protected separately by each frame's latch.
///
/// A pool can be one shard of a [`ParallelBufferPoolManager`](super::ParallelBufferPoolManager):
/// shard `i` of `n` only allocates page ids congruent to `i` mod `n`.
pub struct BufferPoolManager {
    pool_size: usize,
    num_instances: u32,
    instance_index: u32,
    core: Arc<PoolCore>,
    disk_scheduler: DiskScheduler,
}

impl BufferPoolManager {
    /// Creates a stand-alone pool with LRU replacement.
    pub fn new(pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        Self::with_replacer(
            pool_size,
            1,
            0,
            disk_manager,
            Box::new(LruReplacer::new(pool_size)),
        )
    }

    /// Creates shard `instance_index` of `num_instances` with the given replacer.
    pub fn with_replacer(
        pool_size: usize,
        num_instances: u32,
        instance_index: u32,
        disk_manager: Arc<DiskManager>,
        replacer: Box<dyn Replacer>,
    ) -> Self {
        assert!(num_instances > 0, "a buffer pool needs at least one instance");
        assert!(
            instance_index < num_instances,
            "instance index {} out of range for {} instances",
            instance_index,
            num_instances
        );

        let frames = (0..pool_size)
            .map(|i| Arc::new(FrameHeader::new(FrameId::new(i as u32))))
            .collect();
        let free_list = (0..pool_size).map(|i| FrameId::new(i as u32)).collect();

        // Never hand out an id that already has a page on disk.
        let next_page_id =
            first_page_id(disk_manager.num_pages(), num_instances, instance_index);

        let core = Arc::new(PoolCore {
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::with_capacity(pool_size),
                free_list,
                next_page_id,
                free_page_ids: Vec::new(),
            }),
            replacer,
        });

        Self {
            pool_size,
            num_instances,
            instance_index,
            core,
            disk_scheduler: DiskScheduler::new(disk_manager),
        }
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        self.disk_scheduler.disk_manager()
    }

    /// Pin count of a resident page.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.core.state.lock();
        state
            .page_table
            .get(&page_id)
            .map(|fid| self.core.frames[fid.as_usize()].pin_count())
    }

    /// Dirty flag of a resident page.
    pub fn is_dirty(&self, page_id: PageId) -> Option<bool> {
        let state = self.core.state.lock();
        state
            .page_table
            .get(&page_id)
            .map(|fid| self.core.frames[fid.as_usize()].is_dirty())
    }

    pub fn free_frame_count(&self) -> usize {
        self.core.state.lock().free_list.len()
    }

    /// Number of resident pages that could be evicted right now.
    pub fn evictable_count(&self) -> usize {
        self.core.replacer.size()
    }

    fn allocate_page_id(&self, state: &mut PoolState) -> PageId {
        if let Some(page_id) = state.free_page_ids.pop() {
            return page_id;
        }
        let page_id = PageId::new(state.next_page_id);
        state.next_page_id += self.num_instances;
        debug_assert_eq!(page_id.as_u32() % self.num_instances, self.instance_index);
        page_id
    }

    /// Makes `page_id` available to `allocate_page_id` again if this pool
    /// handed it out and has not already taken it back.
    fn release_page_id(&self, state: &mut PoolState, page_id: PageId) {
        let id = page_id.as_u32();
        if id % self.num_instances != self.instance_index
            || id >= state.next_page_id
            || state.free_page_ids.contains(&page_id)
        {
            return;
        }
        state.free_page_ids.push(page_id);
        self.disk_manager().deallocate_page(page_id);
    }

    /// Finds a frame for a new resident page: a free frame if there is one,
    /// otherwise the replacer's victim after writing it back if dirty.
    fn acquire_frame(&self, state: &mut PoolState) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = self.core.replacer.victim().ok_or(SiloError::BufferPoolFull)?;
        let frame = &self.core.frames[frame_id.as_usize()];
        let victim_page_id = frame.page_id();

        if frame.is_dirty() {
            log::trace!("writing back {} from {} before eviction", victim_page_id, frame_id);
            let data = Bytes::copy_from_slice(&frame.read_data()[..]);
            if let Err(e) = self.disk_scheduler.write_page_sync(victim_page_id, data) {
                self.core.replacer.unpin(frame_id);
                return Err(e);
            }
        }

        log::trace!("evicted {} from {}", victim_page_id, frame_id);
        state.page_table.remove(&victim_page_id);
        frame.reset();
        Ok(frame_id)
    }

    /// Installs `page_id` in a freshly acquired frame with one pin.
    fn install(&self, state: &mut PoolState, page_id: PageId, frame_id: FrameId) -> Arc<FrameHeader> {
        let frame = &self.core.frames[frame_id.as_usize()];
        frame.set_page_id(page_id);
        frame.pin();
        state.page_table.insert(page_id, frame_id);
        self.core.replacer.pin(frame_id);
        Arc::clone(frame)
    }

    /// Writes the frame's current bytes for `page_id`. Caller holds the pool lock.
    fn write_back(&self, page_id: PageId, frame: &FrameHeader) -> Result<()> {
        let data = {
            let latch = frame.read_data();
            frame.set_dirty(false);
            Bytes::copy_from_slice(&latch[..])
        };
        self.disk_scheduler.write_page_sync(page_id, data).map_err(|e| {
            frame.set_dirty(true);
            e
        })
    }
}

impl BufferPool for BufferPoolManager {
    fn fetch_page(&self, page_id: PageId) -> Result<Arc<FrameHeader>> {
        if page_id == INVALID_PAGE_ID {
            return Err(SiloError::InvalidPageId(page_id));
        }

        let mut state = self.core.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frame = &self.core.frames[frame_id.as_usize()];
            frame.pin();
            self.core.replacer.pin(frame_id);
            log::trace!("fetch {} hit in {}", page_id, frame_id);
            return Ok(Arc::clone(frame));
        }

        let frame_id = self.acquire_frame(&mut state)?;
        let data = match self.disk_scheduler.read_page_sync(page_id) {
            Ok(data) => data,
            Err(e) => {
                state.free_list.push_back(frame_id);
                return Err(e);
            }
        };
        self.core.frames[frame_id.as_usize()].copy_from(&data);
        log::trace!("fetch {} miss, loaded into {}", page_id, frame_id);

        Ok(self.install(&mut state, page_id, frame_id))
    }

    fn new_page(&self) -> Result<(PageId, Arc<FrameHeader>)> {
        let mut state = self.core.state.lock();

        let frame_id = self.acquire_frame(&mut state)?;
        let page_id = self.allocate_page_id(&mut state);

        if let Err(e) = self
            .disk_scheduler
            .write_page_sync(page_id, Bytes::from_static(&ZERO_PAGE))
        {
            state.free_page_ids.push(page_id);
            state.free_list.push_back(frame_id);
            return Err(e);
        }
        log::trace!("new {} in {}", page_id, frame_id);

        let frame = self.install(&mut state, page_id, frame_id);
        Ok((page_id, frame))
    }

    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<()> {
        self.core.unpin(page_id, is_dirty)
    }

    fn flush_page(&self, page_id: PageId) -> Result<()> {
        if page_id == INVALID_PAGE_ID {
            return Err(SiloError::InvalidPageId(page_id));
        }

        // The pool lock keeps the frame mapped for the duration of the write.
        // Flushing is not an access, so the replacer is left alone.
        let state = self.core.state.lock();
        let frame_id = *state
            .page_table
            .get(&page_id)
            .ok_or(SiloError::PageNotFound(page_id))?;
        self.write_back(page_id, &self.core.frames[frame_id.as_usize()])?;
        log::trace!("flushed {}", page_id);
        Ok(())
    }

    fn flush_all_pages(&self) -> Result<()> {
        let state = self.core.state.lock();
        for (&page_id, frame_id) in &state.page_table {
            self.write_back(page_id, &self.core.frames[frame_id.as_usize()])?;
        }
        log::trace!("flushed {} resident pages", state.page_table.len());
        Ok(())
    }

    fn delete_page(&self, page_id: PageId) -> Result<()> {
        let mut state = self.core.state.lock();

        let frame_id = match state.page_table.get(&page_id).copied() {
            Some(frame_id) => frame_id,
            None => {
                self.release_page_id(&mut state, page_id);
                return Ok(());
            }
        };

        let frame = &self.core.frames[frame_id.as_usize()];
        if frame.pin_count() > 0 {
            return Err(SiloError::PageStillPinned(page_id));
        }

        state.page_table.remove(&page_id);
        self.core.replacer.remove(frame_id);
        frame.reset();
        state.free_list.push_back(frame_id);
        self.release_page_id(&mut state, page_id);
        log::trace!("deleted {}, {} is free", page_id, frame_id);
        Ok(())
    }

    fn pool_size(&self) -> usize {
        self.pool_size
    }

    fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard> {
        let frame = self.fetch_page(page_id)?;
        // SAFETY: the frame was pinned for this guard and the guard owns the Arc.
        Ok(unsafe { ReadPageGuard::new(page_id, frame, self.core.release_callback()) })
    }

    fn fetch_page_write(&self, page_id: PageId) -> Result<WritePageGuard> {
        let frame = self.fetch_page(page_id)?;
        // SAFETY: as above.
        Ok(unsafe { WritePageGuard::new(page_id, frame, self.core.release_callback()) })
    }

    fn new_page_guarded(&self) -> Result<WritePageGuard> {
        let (page_id, frame) = self.new_page()?;
        // SAFETY: as above.
        Ok(unsafe { WritePageGuard::new(page_id, frame, self.core.release_callback()) })
    }
}

/// Smallest id `>= existing_pages` that belongs to the given shard.
fn first_page_id(existing_pages: u32, num_instances: u32, instance_index: u32) -> u32 {
    let rounded = existing_pages.div_ceil(num_instances) * num_instances;
    rounded + instance_index
}
