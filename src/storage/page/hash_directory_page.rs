use std::collections::HashMap;

use crate::common::{
    PageId, Result, SiloError, DIRECTORY_ARRAY_SIZE, INVALID_PAGE_ID, MAX_GLOBAL_DEPTH, PAGE_SIZE,
};

use super::Storable;

const GLOBAL_DEPTH_OFFSET: usize = 0;
const BUCKET_PAGE_IDS_OFFSET: usize = 4;
const LOCAL_DEPTHS_OFFSET: usize = BUCKET_PAGE_IDS_OFFSET + DIRECTORY_ARRAY_SIZE * PageId::SIZE;

/// View over the directory page of an extendible hash table.
///
/// Layout:
/// ```text
/// | global_depth (4) | bucket_page_id (4) x 512 | local_depth (1) x 512 |
/// ```
/// Only the first `2^global_depth` slots are meaningful.
pub struct HashTableDirectoryPage<T> {
    data: T,
}

impl<T: AsRef<[u8]>> HashTableDirectoryPage<T> {
    pub fn new(data: T) -> Self {
        assert_eq!(data.as_ref().len(), PAGE_SIZE);
        Self { data }
    }

    fn bytes(&self) -> &[u8] {
        self.data.as_ref()
    }

    pub fn global_depth(&self) -> u32 {
        u32::read_from(&self.bytes()[GLOBAL_DEPTH_OFFSET..])
    }

    /// Mask selecting the low `global_depth` bits of a hash.
    pub fn global_depth_mask(&self) -> u32 {
        (1u32 << self.global_depth()) - 1
    }

    /// Number of live directory slots, `2^global_depth`.
    pub fn size(&self) -> usize {
        1 << self.global_depth()
    }

    /// Directory slot a hash value routes to.
    pub fn hash_to_index(&self, hash: u32) -> usize {
        (hash & self.global_depth_mask()) as usize
    }

    pub fn bucket_page_id(&self, bucket_idx: usize) -> PageId {
        debug_assert!(bucket_idx < DIRECTORY_ARRAY_SIZE);
        PageId::read_from(&self.bytes()[BUCKET_PAGE_IDS_OFFSET + bucket_idx * PageId::SIZE..])
    }

    pub fn local_depth(&self, bucket_idx: usize) -> u32 {
        self.bytes()[LOCAL_DEPTHS_OFFSET + bucket_idx] as u32
    }

    /// Mask selecting the low `local_depth` bits of the slot's index.
    pub fn local_depth_mask(&self, bucket_idx: usize) -> u32 {
        (1u32 << self.local_depth(bucket_idx)) - 1
    }

    /// The bit that tells a bucket apart from its split image, 0 at local depth 0.
    pub fn local_high_bit(&self, bucket_idx: usize) -> u32 {
        match self.local_depth(bucket_idx) {
            0 => 0,
            depth => 1 << (depth - 1),
        }
    }

    /// Slot of the bucket this slot's bucket was split from (or would merge with).
    /// A slot at local depth 0 is its own image.
    pub fn split_image_index(&self, bucket_idx: usize) -> usize {
        let index = bucket_idx as u32;
        ((index ^ self.local_high_bit(bucket_idx)) & self.local_depth_mask(bucket_idx)) as usize
    }

    /// True when every slot's local depth is below the global depth,
    /// meaning the upper half of the directory mirrors the lower half.
    pub fn can_shrink(&self) -> bool {
        let global_depth = self.global_depth();
        global_depth > 0 && (0..self.size()).all(|i| self.local_depth(i) < global_depth)
    }

    /// Number of distinct bucket pages referenced by the directory.
    pub fn num_buckets(&self) -> usize {
        let mut pages: Vec<PageId> = (0..self.size()).map(|i| self.bucket_page_id(i)).collect();
        pages.sort_unstable();
        pages.dedup();
        pages.len()
    }

    /// Checks the directory invariants:
    /// (1) every local depth is at most the global depth,
    /// (2) each bucket is referenced by exactly `2^(GD - LD)` slots,
    /// (3) all slots referencing a bucket agree on its local depth.
    pub fn verify_integrity(&self) -> Result<()> {
        let global_depth = self.global_depth();
        let mut page_id_to_count: HashMap<PageId, u32> = HashMap::new();
        let mut page_id_to_ld: HashMap<PageId, u32> = HashMap::new();

        for idx in 0..self.size() {
            let page_id = self.bucket_page_id(idx);
            let local_depth = self.local_depth(idx);

            if local_depth > global_depth {
                return Err(self.corrupted(format!(
                    "slot {} has local depth {} above global depth {}",
                    idx, local_depth, global_depth
                )));
            }

            *page_id_to_count.entry(page_id).or_insert(0) += 1;

            match page_id_to_ld.get(&page_id) {
                Some(&seen) if seen != local_depth => {
                    return Err(self.corrupted(format!(
                        "{} has local depth {} at slot {} but {} elsewhere",
                        page_id, local_depth, idx, seen
                    )));
                }
                Some(_) => {}
                None => {
                    page_id_to_ld.insert(page_id, local_depth);
                }
            }
        }

        for (page_id, count) in page_id_to_count {
            let required = 1u32 << (global_depth - page_id_to_ld[&page_id]);
            if count != required {
                return Err(self.corrupted(format!(
                    "{} is referenced by {} slots, expected {}",
                    page_id, count, required
                )));
            }
        }

        Ok(())
    }

    fn corrupted(&self, reason: String) -> SiloError {
        log::warn!("verify integrity: {}", reason);
        self.log_directory(log::Level::Warn);
        SiloError::IndexCorrupted(reason)
    }

    /// Dumps the live slots at the given level.
    pub fn log_directory(&self, level: log::Level) {
        log::log!(level, "======== DIRECTORY (global_depth: {}) ========", self.global_depth());
        log::log!(level, "| bucket_idx | page_id | local_depth |");
        for idx in 0..self.size() {
            log::log!(
                level,
                "| {:>10} | {:>7} | {:>11} |",
                idx,
                self.bucket_page_id(idx).as_u32(),
                self.local_depth(idx)
            );
        }
        log::log!(level, "================ END DIRECTORY ================");
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> HashTableDirectoryPage<T> {
    fn bytes_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }

    /// Formats an empty directory: global depth 0 and one slot pointing at `bucket_page_id`.
    pub fn init(&mut self, bucket_page_id: PageId) {
        self.bytes_mut().fill(0);
        for idx in 0..DIRECTORY_ARRAY_SIZE {
            self.set_bucket_page_id(idx, INVALID_PAGE_ID);
        }
        self.set_bucket_page_id(0, bucket_page_id);
        self.set_local_depth(0, 0);
    }

    fn set_global_depth(&mut self, depth: u32) {
        depth.write_to(&mut self.bytes_mut()[GLOBAL_DEPTH_OFFSET..]);
    }

    /// Doubles the addressable directory. Slot contents of the new upper half
    /// are left for the caller to fill in.
    pub fn incr_global_depth(&mut self) -> Result<()> {
        let depth = self.global_depth();
        if depth >= MAX_GLOBAL_DEPTH {
            return Err(SiloError::DirectoryFull(MAX_GLOBAL_DEPTH));
        }
        self.set_global_depth(depth + 1);
        Ok(())
    }

    /// Halves the directory, discarding the upper half.
    pub fn decr_global_depth(&mut self) {
        let depth = self.global_depth();
        debug_assert!(depth > 0);
        let old_size = self.size();
        self.set_global_depth(depth - 1);
        for idx in self.size()..old_size {
            self.set_bucket_page_id(idx, INVALID_PAGE_ID);
            self.set_local_depth(idx, 0);
        }
    }

    pub fn set_bucket_page_id(&mut self, bucket_idx: usize, bucket_page_id: PageId) {
        let offset = BUCKET_PAGE_IDS_OFFSET + bucket_idx * PageId::SIZE;
        bucket_page_id.write_to(&mut self.bytes_mut()[offset..]);
    }

    pub fn set_local_depth(&mut self, bucket_idx: usize, local_depth: u32) {
        debug_assert!(local_depth <= MAX_GLOBAL_DEPTH);
        self.bytes_mut()[LOCAL_DEPTHS_OFFSET + bucket_idx] = local_depth as u8;
    }

    pub fn incr_local_depth(&mut self, bucket_idx: usize) {
        let depth = self.local_depth(bucket_idx);
        self.set_local_depth(bucket_idx, depth + 1);
    }

    pub fn decr_local_depth(&mut self, bucket_idx: usize) {
        let depth = self.local_depth(bucket_idx);
        debug_assert!(depth > 0);
        self.set_local_depth(bucket_idx, depth - 1);
    }
}
