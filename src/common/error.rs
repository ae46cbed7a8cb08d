use thiserror::Error;

use super::types::PageId;

/// Storage error types
#[derive(Error, Debug)]
pub enum SiloError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Page {0} not found in the buffer pool")]
    PageNotFound(PageId),

    #[error("Buffer pool is full, no evictable frames available")]
    BufferPoolFull,

    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),

    #[error("Page {0} is still pinned")]
    PageStillPinned(PageId),

    #[error("Page {0} is not pinned")]
    PageNotPinned(PageId),

    #[error("Disk scheduler error: {0}")]
    DiskScheduler(String),

    #[error("Hash directory cannot grow beyond global depth {0}")]
    DirectoryFull(u32),

    #[error("Bucket {0} overflows: every entry has the same hash")]
    BucketOverflow(PageId),

    #[error("Index corrupted: {0}")]
    IndexCorrupted(String),
}

pub type Result<T> = std::result::Result<T, SiloError>;
