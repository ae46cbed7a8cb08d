use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::common::{PageId, ReplacerPolicy, Result, SiloError};
use crate::storage::disk::DiskManager;

use super::{BufferPool, BufferPoolManager, FrameHeader, ReadPageGuard, WritePageGuard};

/// A buffer pool split into independent shards to spread lock contention.
///
/// Every page id belongs to shard `page_id % num_instances`, and each shard
/// only allocates ids it owns, so routing needs no shared state. New pages are
/// spread over the shards round-robin.
pub struct ParallelBufferPoolManager {
    instances: Vec<BufferPoolManager>,
    /// Shard the next `new_page` starts at
    next_instance: AtomicUsize,
}

impl ParallelBufferPoolManager {
    /// Creates `num_instances` LRU shards of `pool_size` frames each.
    pub fn new(num_instances: usize, pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        Self::with_policy(num_instances, pool_size, disk_manager, ReplacerPolicy::Lru)
    }

    pub fn with_policy(
        num_instances: usize,
        pool_size: usize,
        disk_manager: Arc<DiskManager>,
        policy: ReplacerPolicy,
    ) -> Self {
        assert!(num_instances > 0, "a parallel buffer pool needs at least one shard");

        let instances = (0..num_instances)
            .map(|i| {
                BufferPoolManager::with_replacer(
                    pool_size,
                    num_instances as u32,
                    i as u32,
                    Arc::clone(&disk_manager),
                    policy.create(pool_size),
                )
            })
            .collect();

        Self {
            instances,
            next_instance: AtomicUsize::new(0),
        }
    }

    pub fn num_instances(&self) -> usize {
        self.instances.len()
    }

    /// The shard responsible for `page_id`.
    pub fn instance_for(&self, page_id: PageId) -> &BufferPoolManager {
        &self.instances[page_id.as_u32() as usize % self.instances.len()]
    }

    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        self.instance_for(page_id).pin_count(page_id)
    }

    pub fn free_frame_count(&self) -> usize {
        self.instances.iter().map(|bpm| bpm.free_frame_count()).sum()
    }

    /// Runs an allocation on each shard once, starting at the round-robin
    /// cursor, until one of them has a frame to spare.
    fn allocate_round_robin<T>(&self, allocate: impl Fn(&BufferPoolManager) -> Result<T>) -> Result<T> {
        let n = self.instances.len();
        let start = self.next_instance.fetch_add(1, Ordering::Relaxed) % n;

        for offset in 0..n {
            match allocate(&self.instances[(start + offset) % n]) {
                Err(SiloError::BufferPoolFull) => continue,
                result => return result,
            }
        }
        Err(SiloError::BufferPoolFull)
    }
}

impl BufferPool for ParallelBufferPoolManager {
    fn fetch_page(&self, page_id: PageId) -> Result<Arc<FrameHeader>> {
        self.instance_for(page_id).fetch_page(page_id)
    }

    fn new_page(&self) -> Result<(PageId, Arc<FrameHeader>)> {
        self.allocate_round_robin(|bpm| bpm.new_page())
    }

    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<()> {
        self.instance_for(page_id).unpin_page(page_id, is_dirty)
    }

    fn flush_page(&self, page_id: PageId) -> Result<()> {
        self.instance_for(page_id).flush_page(page_id)
    }

    fn flush_all_pages(&self) -> Result<()> {
        for bpm in &self.instances {
            bpm.flush_all_pages()?;
        }
        Ok(())
    }

    fn delete_page(&self, page_id: PageId) -> Result<()> {
        self.instance_for(page_id).delete_page(page_id)
    }

    fn pool_size(&self) -> usize {
        self.instances.iter().map(|bpm| bpm.pool_size()).sum()
    }

    fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard> {
        self.instance_for(page_id).fetch_page_read(page_id)
    }

    fn fetch_page_write(&self, page_id: PageId) -> Result<WritePageGuard> {
        self.instance_for(page_id).fetch_page_write(page_id)
    }

    fn new_page_guarded(&self) -> Result<WritePageGuard> {
        self.allocate_round_robin(|bpm| bpm.new_page_guarded())
    }
}
