use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::common::{PageId, Result, PAGE_SIZE};

/// DiskManager reads and writes pages of a single flat database file.
/// Page `n` lives at byte offset `n * PAGE_SIZE`.
pub struct DiskManager {
    db_file: Mutex<File>,
    db_path: String,
    /// Number of pages the file currently spans
    num_pages: AtomicU32,
    num_reads: AtomicU32,
    num_writes: AtomicU32,
    num_deallocations: AtomicU32,
}

impl DiskManager {
    /// Creates a new DiskManager for the given database file path.
    /// Creates the file if it doesn't exist.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path_str = db_path.as_ref().to_string_lossy().to_string();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&db_path)?;

        let file_size = file.metadata()?.len();
        let num_pages = (file_size / PAGE_SIZE as u64) as u32;

        Ok(Self {
            db_file: Mutex::new(file),
            db_path: path_str,
            num_pages: AtomicU32::new(num_pages),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
            num_deallocations: AtomicU32::new(0),
        })
    }

    /// Reads a page from disk into the provided buffer.
    /// Bytes past the end of the file read as zero.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(page_id.file_offset(PAGE_SIZE)))?;

        let mut filled = 0;
        while filled < PAGE_SIZE {
            let n = file.read(&mut data[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        data[filled..].fill(0);

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes a page to disk from the provided buffer.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(page_id.file_offset(PAGE_SIZE)))?;
        file.write_all(data)?;
        file.flush()?;

        self.num_pages
            .fetch_max(page_id.as_u32() + 1, Ordering::Relaxed);
        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Records that a page id has been released. The space is not reclaimed;
    /// the buffer pool that owns the id hands it out again.
    pub fn deallocate_page(&self, _page_id: PageId) {
        self.num_deallocations.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of pages the file spans.
    pub fn num_pages(&self) -> u32 {
        self.num_pages.load(Ordering::Relaxed)
    }

    pub fn num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    pub fn num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    pub fn num_deallocations(&self) -> u32 {
        self.num_deallocations.load(Ordering::Relaxed)
    }

    /// Returns the path to the database file.
    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// Flushes any buffered writes to disk.
    pub fn sync(&self) -> Result<()> {
        let file = self.db_file.lock();
        file.sync_all()?;
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let file = self.db_file.get_mut();
        if let Err(e) = file.sync_all() {
            log::warn!("failed to sync {} on close: {}", self.db_path, e);
        }
    }
}
