mod buffer_pool;
mod buffer_pool_manager;
mod frame_header;
mod lru_k_replacer;
mod lru_replacer;
mod page_guard;
mod parallel_buffer_pool_manager;
mod replacer;

pub use buffer_pool::BufferPool;
pub use buffer_pool_manager::BufferPoolManager;
pub use frame_header::{FrameHeader, PageData};
pub use lru_k_replacer::LruKReplacer;
pub use lru_replacer::LruReplacer;
pub(crate) use page_guard::ReleaseCallback;
pub use page_guard::{ReadPageGuard, WritePageGuard};
pub use parallel_buffer_pool_manager::ParallelBufferPoolManager;
pub use replacer::Replacer;
