//! Silo - a buffer pool and a disk-resident extendible hash index
//!
//! The crate provides the storage core of a disk-oriented database: a bounded
//! in-memory page cache in front of a flat database file, and a hash index
//! whose directory and buckets are ordinary pages managed by that cache.
//!
//! # Architecture
//!
//! - **Storage Layer** (`storage`)
//!   - `DiskManager`: reads and writes fixed-size pages of one file
//!   - `DiskScheduler`: background worker that performs page I/O
//!   - `HashTableDirectoryPage` / `HashTableBucketPage`: byte views over hash index pages
//!
//! - **Buffer Pool** (`buffer`)
//!   - `BufferPoolManager`: caches pages in a fixed set of frames
//!   - `ParallelBufferPoolManager`: several pools sharded by page id
//!   - `LruReplacer` / `LruKReplacer`: eviction policies behind the `Replacer` trait
//!   - `ReadPageGuard` / `WritePageGuard`: RAII pin + latch
//!
//! - **Index** (`index`)
//!   - `ExtendibleHashTable`: hash index that splits and merges buckets as it grows and shrinks
//!   - `KeyComparator`, `HashFunction` and `GenericKey` for pluggable key types
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use silo::buffer::{BufferPool, BufferPoolManager};
//! use silo::index::{DefaultHashFunction, ExtendibleHashTable, IntegerComparator};
//! use silo::storage::disk::DiskManager;
//!
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//! let bpm: Arc<dyn BufferPool> = Arc::new(BufferPoolManager::new(64, disk_manager));
//!
//! let index: ExtendibleHashTable<i32, i32, _, _> =
//!     ExtendibleHashTable::new("orders_pk", bpm, IntegerComparator, DefaultHashFunction).unwrap();
//!
//! index.insert(&42, &7).unwrap();
//! assert_eq!(index.get_value(&42).unwrap(), vec![7]);
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

pub use common::{PageId, RecordId, Result, SiloError, SlotId};
