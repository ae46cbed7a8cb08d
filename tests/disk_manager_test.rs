//! Integration tests for the disk manager and scheduler

use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use rand::seq::SliceRandom;
use rand::thread_rng;
use silo::common::{PageId, PAGE_SIZE};
use silo::storage::disk::{DiskManager, DiskScheduler};
use tempfile::NamedTempFile;

fn page_with(tag: u32) -> [u8; PAGE_SIZE] {
    let mut data = [0u8; PAGE_SIZE];
    data[..4].copy_from_slice(&tag.to_le_bytes());
    data[PAGE_SIZE - 4..].copy_from_slice(&tag.to_le_bytes());
    data
}

fn tag_of(data: &[u8]) -> u32 {
    u32::from_le_bytes([data[0], data[1], data[2], data[3]])
}

#[test]
fn test_disk_manager_random_order_writes() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();

    let mut ids: Vec<u32> = (0..64).collect();
    ids.shuffle(&mut thread_rng());
    for &id in &ids {
        dm.write_page(PageId::new(id), &page_with(id * 7)).unwrap();
    }
    assert_eq!(dm.num_pages(), 64);
    assert_eq!(dm.num_writes(), 64);

    for id in 0..64u32 {
        let mut data = [0u8; PAGE_SIZE];
        dm.read_page(PageId::new(id), &mut data).unwrap();
        assert_eq!(tag_of(&data), id * 7);
        assert_eq!(tag_of(&data[PAGE_SIZE - 4..]), id * 7);
    }
}

#[test]
fn test_disk_manager_sparse_file_reads_zero() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();

    dm.write_page(PageId::new(5), &page_with(5)).unwrap();
    assert_eq!(dm.num_pages(), 6);

    let mut hole = [0xffu8; PAGE_SIZE];
    dm.read_page(PageId::new(2), &mut hole).unwrap();
    assert!(hole.iter().all(|&b| b == 0));
}

#[test]
fn test_disk_manager_reopen_keeps_pages() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();

    {
        let dm = DiskManager::new(&path).unwrap();
        for id in 0..3 {
            dm.write_page(PageId::new(id), &page_with(100 + id)).unwrap();
        }
        dm.sync().unwrap();
    }

    let dm = DiskManager::new(&path).unwrap();
    assert_eq!(dm.num_pages(), 3);
    assert_eq!(dm.db_path(), path.to_string_lossy());
    for id in 0..3 {
        let mut data = [0u8; PAGE_SIZE];
        dm.read_page(PageId::new(id), &mut data).unwrap();
        assert_eq!(tag_of(&data), 100 + id);
    }
}

#[test]
fn test_disk_scheduler_concurrent_requests() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let scheduler = Arc::new(DiskScheduler::new(Arc::clone(&dm)));

    let handles: Vec<_> = (0..8u32)
        .map(|t| {
            let scheduler = Arc::clone(&scheduler);
            thread::spawn(move || {
                for i in 0..16u32 {
                    let id = t * 16 + i;
                    let data = Bytes::copy_from_slice(&page_with(id));
                    scheduler.write_page_sync(PageId::new(id), data).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    for id in 0..128u32 {
        let data = scheduler.read_page_sync(PageId::new(id)).unwrap();
        assert_eq!(tag_of(&data), id);
    }
    assert_eq!(dm.num_writes(), 128);
    assert_eq!(dm.num_reads(), 128);
}
