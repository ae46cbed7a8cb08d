use std::sync::Arc;

use super::types::PageId;
use crate::buffer::{
    BufferPool, BufferPoolManager, LruKReplacer, LruReplacer, ParallelBufferPoolManager, Replacer,
};
use crate::storage::disk::DiskManager;

/// Size of a page in bytes (4 KB)
pub const PAGE_SIZE: usize = 4096;

/// Invalid page ID constant
pub const INVALID_PAGE_ID: PageId = PageId(u32::MAX);

/// Default K value for LRU-K replacement policy
pub const DEFAULT_LRUK_K: usize = 2;

/// Default buffer pool size (number of frames per pool instance)
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 10;

/// Default number of buffer pool instances
pub const DEFAULT_NUM_INSTANCES: usize = 1;

/// Number of directory slots that fit in one hash directory page.
/// 1024 page ids would leave no room for the depth array, so the directory
/// tops out at 512 slots.
pub const DIRECTORY_ARRAY_SIZE: usize = 512;

/// Largest global depth the hash directory can reach (2^9 = 512 slots)
pub const MAX_GLOBAL_DEPTH: u32 = 9;

/// Eviction policy used by each buffer pool instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplacerPolicy {
    /// Evict the least recently unpinned frame
    Lru,
    /// Evict the frame with the largest backward k-distance
    LruK(usize),
}

impl ReplacerPolicy {
    pub(crate) fn create(&self, num_frames: usize) -> Box<dyn Replacer> {
        match *self {
            ReplacerPolicy::Lru => Box::new(LruReplacer::new(num_frames)),
            ReplacerPolicy::LruK(k) => Box::new(LruKReplacer::new(k, num_frames)),
        }
    }
}

/// Runtime configuration of the buffer pool layer
#[derive(Debug, Clone)]
pub struct BufferPoolConfig {
    /// Frames per pool instance
    pub pool_size: usize,
    /// Number of independent instances; page ids are routed by `page_id % num_instances`
    pub num_instances: usize,
    pub replacer: ReplacerPolicy,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_BUFFER_POOL_SIZE,
            num_instances: DEFAULT_NUM_INSTANCES,
            replacer: ReplacerPolicy::Lru,
        }
    }
}

impl BufferPoolConfig {
    /// Builds a single pool, or a sharded pool when more than one instance is configured.
    pub fn build(&self, disk_manager: Arc<DiskManager>) -> Arc<dyn BufferPool> {
        if self.num_instances <= 1 {
            Arc::new(BufferPoolManager::with_replacer(
                self.pool_size,
                1,
                0,
                disk_manager,
                self.replacer.create(self.pool_size),
            ))
        } else {
            Arc::new(ParallelBufferPoolManager::with_policy(
                self.num_instances,
                self.pool_size,
                disk_manager,
                self.replacer,
            ))
        }
    }
}
