use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::buffer::{BufferPool, FrameHeader};
use crate::common::{PageId, Result, SiloError, MAX_GLOBAL_DEPTH};
use crate::storage::page::{HashTableBucketPage, HashTableDirectoryPage, InsertOutcome, Storable};

use super::{HashFunction, KeyComparator};

/// A disk-resident extendible hash index.
///
/// The directory lives in one page that stays pinned for the life of the
/// table; buckets are ordinary pages fetched through the buffer pool on
/// demand. Keys may repeat, but each (key, value) pair is stored at most once.
///
/// Concurrency: lookups and single-bucket inserts and removes share the table
/// latch; splits and merges take it exclusively. Bucket bytes are only touched
/// under the bucket's page latch, at most one page latch is held at a time, and
/// no buffer pool call is made while one is held.
pub struct ExtendibleHashTable<K, V, C, H> {
    name: String,
    bpm: Arc<dyn BufferPool>,
    comparator: C,
    hash_fn: H,
    directory_page_id: PageId,
    directory: Arc<FrameHeader>,
    table_latch: RwLock<()>,
    _marker: PhantomData<fn() -> (K, V)>,
}

type DirectoryView<'a> = HashTableDirectoryPage<&'a [u8]>;
type DirectoryViewMut<'a> = HashTableDirectoryPage<&'a mut [u8]>;

impl<K, V, C, H> ExtendibleHashTable<K, V, C, H>
where
    K: Storable,
    V: Storable + PartialEq,
    C: KeyComparator<K>,
    H: HashFunction<K>,
{
    /// Number of (key, value) pairs a single bucket page holds.
    pub const BUCKET_CAPACITY: usize = HashTableBucketPage::<&'static [u8], K, V>::CAPACITY;

    /// Creates an empty table: a directory of global depth 0 whose only slot
    /// points at a fresh empty bucket.
    pub fn new(name: impl Into<String>, bpm: Arc<dyn BufferPool>, comparator: C, hash_fn: H) -> Result<Self> {
        let name = name.into();
        let (directory_page_id, directory) = bpm.new_page()?;

        let bucket_page_id = match bpm.new_page() {
            Ok((bucket_page_id, _)) => bucket_page_id,
            Err(e) => {
                bpm.unpin_page(directory_page_id, false)?;
                bpm.delete_page(directory_page_id)?;
                return Err(e);
            }
        };

        HashTableDirectoryPage::new(&mut directory.write_data()[..]).init(bucket_page_id);
        // A zeroed page is already a valid empty bucket.
        bpm.unpin_page(bucket_page_id, false)?;

        log::debug!(
            "created hash table {} with directory {} and bucket {}",
            name,
            directory_page_id,
            bucket_page_id
        );

        Ok(Self {
            name,
            bpm,
            comparator,
            hash_fn,
            directory_page_id,
            directory,
            table_latch: RwLock::new(()),
            _marker: PhantomData,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn directory_page_id(&self) -> PageId {
        self.directory_page_id
    }

    fn hash(&self, key: &K) -> u32 {
        self.hash_fn.hash(key)
    }

    fn read_directory<R>(&self, f: impl FnOnce(&DirectoryView<'_>) -> R) -> R {
        let data = self.directory.read_data();
        f(&HashTableDirectoryPage::new(&data[..]))
    }

    fn write_directory<R>(&self, f: impl FnOnce(&mut DirectoryViewMut<'_>) -> R) -> R {
        let mut data = self.directory.write_data();
        f(&mut HashTableDirectoryPage::new(&mut data[..]))
    }

    /// Directory slot and bucket page the key currently routes to.
    fn route(&self, key: &K) -> (usize, PageId) {
        let hash = self.hash(key);
        self.read_directory(|dir| {
            let bucket_idx = dir.hash_to_index(hash);
            (bucket_idx, dir.bucket_page_id(bucket_idx))
        })
    }

    fn bucket_is_empty(&self, bucket_page_id: PageId) -> Result<bool> {
        let guard = self.bpm.fetch_page_read(bucket_page_id)?;
        Ok(HashTableBucketPage::<_, K, V>::new(&guard[..]).is_empty())
    }

    /// Every value stored under `key`.
    pub fn get_value(&self, key: &K) -> Result<Vec<V>> {
        let _table = self.table_latch.read();
        let (_, bucket_page_id) = self.route(key);

        let guard = self.bpm.fetch_page_read(bucket_page_id)?;
        let bucket = HashTableBucketPage::<_, K, V>::new(&guard[..]);
        Ok(bucket.get_value(key, &self.comparator))
    }

    /// Inserts the pair, splitting buckets as needed. Returns `Ok(false)` if
    /// the exact pair is already present.
    pub fn insert(&self, key: &K, value: &V) -> Result<bool> {
        {
            let _table = self.table_latch.read();
            let (_, bucket_page_id) = self.route(key);

            let mut guard = self.bpm.fetch_page_write(bucket_page_id)?;
            let mut bucket = HashTableBucketPage::<_, K, V>::new(guard.data_mut());
            match bucket.insert(key, value, &self.comparator) {
                InsertOutcome::Inserted => return Ok(true),
                InsertOutcome::Duplicate => return Ok(false),
                InsertOutcome::Full => {}
            }
        }
        self.split_insert(key, value)
    }

    /// Slow path of `insert`: splits the target bucket until the pair fits.
    fn split_insert(&self, key: &K, value: &V) -> Result<bool> {
        let _table = self.table_latch.write();
        let key_hash = self.hash(key);

        loop {
            let (bucket_idx, bucket_page_id) = self.route(key);
            {
                let mut guard = self.bpm.fetch_page_write(bucket_page_id)?;
                let mut bucket = HashTableBucketPage::<_, K, V>::new(guard.data_mut());
                match bucket.insert(key, value, &self.comparator) {
                    InsertOutcome::Inserted => return Ok(true),
                    InsertOutcome::Duplicate => return Ok(false),
                    InsertOutcome::Full => {
                        // No split can separate entries that share the key's full hash.
                        let inseparable = bucket
                            .entries()
                            .iter()
                            .all(|(k, _)| self.hash(k) == key_hash);
                        if inseparable {
                            log::warn!(
                                "{}: bucket {} is full of entries hashing to {:#x}",
                                self.name,
                                bucket_page_id,
                                key_hash
                            );
                            return Err(SiloError::BucketOverflow(bucket_page_id));
                        }
                    }
                }
            }
            self.split_bucket(bucket_idx, bucket_page_id)?;
        }
    }

    /// Splits the bucket at `bucket_idx` in two, growing the directory if the
    /// bucket is already at the global depth. Caller holds the table write latch.
    fn split_bucket(&self, bucket_idx: usize, old_page_id: PageId) -> Result<()> {
        let local_depth = self.read_directory(|dir| dir.local_depth(bucket_idx));
        if local_depth >= MAX_GLOBAL_DEPTH {
            return Err(SiloError::DirectoryFull(MAX_GLOBAL_DEPTH));
        }

        // Pin both buckets up front so nothing below can fail on a full pool
        // once the directory has been changed.
        let old_frame = self.bpm.fetch_page(old_page_id)?;
        let (new_page_id, new_frame) = match self.bpm.new_page() {
            Ok(page) => page,
            Err(e) => {
                self.bpm.unpin_page(old_page_id, false)?;
                return Err(e);
            }
        };

        let result = self.redistribute(bucket_idx, &old_frame, &new_frame, new_page_id);

        self.bpm.unpin_page(old_page_id, result.is_ok())?;
        self.bpm.unpin_page(new_page_id, result.is_ok())?;
        if result.is_err() {
            self.bpm.delete_page(new_page_id)?;
        }
        result
    }

    fn redistribute(
        &self,
        bucket_idx: usize,
        old_frame: &FrameHeader,
        new_frame: &FrameHeader,
        new_page_id: PageId,
    ) -> Result<()> {
        let split_bit = self.write_directory(|dir| -> Result<u32> {
            let old_depth = dir.local_depth(bucket_idx);

            if old_depth == dir.global_depth() {
                let size = dir.size();
                dir.incr_global_depth()?;
                for i in 0..size {
                    let (page_id, depth) = (dir.bucket_page_id(i), dir.local_depth(i));
                    dir.set_bucket_page_id(i + size, page_id);
                    dir.set_local_depth(i + size, depth);
                }
                log::debug!("directory grew to global depth {}", dir.global_depth());
            }

            // Every slot sharing the bucket's low `old_depth` bits deepens by one;
            // those with the next bit set now point at the new bucket.
            let old_mask = (1u32 << old_depth) - 1;
            let low_bits = bucket_idx as u32 & old_mask;
            let split_bit = 1u32 << old_depth;
            for i in 0..dir.size() {
                if i as u32 & old_mask == low_bits {
                    dir.incr_local_depth(i);
                    if i as u32 & split_bit != 0 {
                        dir.set_bucket_page_id(i, new_page_id);
                    }
                }
            }
            Ok(split_bit)
        })?;

        let moved = {
            let mut data = old_frame.write_data();
            let mut old_bucket = HashTableBucketPage::<_, K, V>::new(&mut data[..]);
            old_bucket.take_matching(|k| self.hash(k) & split_bit != 0)
        };
        {
            let mut data = new_frame.write_data();
            let mut new_bucket = HashTableBucketPage::<_, K, V>::new(&mut data[..]);
            for (k, v) in &moved {
                let outcome = new_bucket.insert(k, v, &self.comparator);
                debug_assert_eq!(outcome, InsertOutcome::Inserted);
            }
        }

        log::debug!(
            "{}: split {} at slot {}, moved {} entries to {}",
            self.name,
            old_frame.page_id(),
            bucket_idx,
            moved.len(),
            new_page_id
        );
        Ok(())
    }

    /// Removes the exact pair. Returns `Ok(false)` if it was not present.
    /// A bucket left empty is merged into its split image.
    pub fn remove(&self, key: &K, value: &V) -> Result<bool> {
        let now_empty = {
            let _table = self.table_latch.read();
            let (_, bucket_page_id) = self.route(key);

            let mut guard = self.bpm.fetch_page_write(bucket_page_id)?;
            let mut bucket = HashTableBucketPage::<_, K, V>::new(guard.data_mut());
            if !bucket.remove(key, value, &self.comparator) {
                return Ok(false);
            }
            bucket.is_empty()
        };

        if now_empty {
            let _table = self.table_latch.write();
            while self.merge(key)? {}
        }
        Ok(true)
    }

    /// Folds the key's bucket and its split image together if they have the
    /// same local depth and one of them is empty. Returns whether it did.
    /// Caller holds the table write latch.
    fn merge(&self, key: &K) -> Result<bool> {
        let hash = self.hash(key);
        let (bucket_page_id, image_page_id, local_depth) = self.read_directory(|dir| {
            let bucket_idx = dir.hash_to_index(hash);
            let image_idx = dir.split_image_index(bucket_idx);
            let local_depth = dir.local_depth(bucket_idx);
            let image_depth = dir.local_depth(image_idx);
            (
                dir.bucket_page_id(bucket_idx),
                dir.bucket_page_id(image_idx),
                (local_depth == image_depth).then_some(local_depth),
            )
        });

        let Some(local_depth) = local_depth else {
            return Ok(false);
        };
        if local_depth == 0 || bucket_page_id == image_page_id {
            return Ok(false);
        }

        // A concurrent insert may have refilled the bucket before we got here.
        let (empty, survivor) = if self.bucket_is_empty(bucket_page_id)? {
            (bucket_page_id, image_page_id)
        } else if self.bucket_is_empty(image_page_id)? {
            (image_page_id, bucket_page_id)
        } else {
            return Ok(false);
        };

        self.write_directory(|dir| {
            for i in 0..dir.size() {
                if dir.bucket_page_id(i) == empty {
                    dir.set_bucket_page_id(i, survivor);
                }
                if dir.bucket_page_id(i) == survivor {
                    dir.decr_local_depth(i);
                }
            }
            while dir.can_shrink() {
                dir.decr_global_depth();
                log::debug!("directory shrank to global depth {}", dir.global_depth());
            }
        });

        log::debug!(
            "{}: merged empty bucket {} into {} at local depth {}",
            self.name,
            empty,
            survivor,
            local_depth - 1
        );
        self.bpm.delete_page(empty)?;
        Ok(true)
    }

    pub fn global_depth(&self) -> u32 {
        let _table = self.table_latch.read();
        self.read_directory(|dir| dir.global_depth())
    }

    /// Number of distinct bucket pages.
    pub fn num_buckets(&self) -> usize {
        let _table = self.table_latch.read();
        self.read_directory(|dir| dir.num_buckets())
    }

    /// Checks the directory invariants, logging the directory on failure.
    pub fn verify_integrity(&self) -> Result<()> {
        let _table = self.table_latch.read();
        self.read_directory(|dir| dir.verify_integrity())
    }

    /// Dumps the directory and every bucket at debug level.
    pub fn log_directory(&self) -> Result<()> {
        let _table = self.table_latch.read();
        let bucket_page_ids = self.read_directory(|dir| {
            dir.log_directory(log::Level::Debug);
            let mut ids: Vec<PageId> = (0..dir.size()).map(|i| dir.bucket_page_id(i)).collect();
            ids.sort_unstable();
            ids.dedup();
            ids
        });

        for bucket_page_id in bucket_page_ids {
            let guard = self.bpm.fetch_page_read(bucket_page_id)?;
            log::debug!("{}: bucket {}", self.name, bucket_page_id);
            HashTableBucketPage::<_, K, V>::new(&guard[..]).log_bucket(log::Level::Debug);
        }
        Ok(())
    }
}

impl<K, V, C, H> Drop for ExtendibleHashTable<K, V, C, H> {
    fn drop(&mut self) {
        if let Err(e) = self.bpm.unpin_page(self.directory_page_id, true) {
            log::warn!(
                "{}: failed to release directory {}: {}",
                self.name,
                self.directory_page_id,
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPoolManager;
    use crate::index::{DefaultHashFunction, IntegerComparator};
    use crate::storage::disk::DiskManager;
    use tempfile::NamedTempFile;

    /// Routes a key by its own value so tests can aim at specific slots.
    struct IdentityHash;

    impl HashFunction<i32> for IdentityHash {
        fn hash(&self, key: &i32) -> u32 {
            *key as u32
        }
    }

    type IdentityTable = ExtendibleHashTable<i32, i32, IntegerComparator, IdentityHash>;

    fn create_bpm(pool_size: usize) -> (Arc<BufferPoolManager>, NamedTempFile) {
        let _ = env_logger::builder().is_test(true).try_init();
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        (Arc::new(BufferPoolManager::new(pool_size, dm)), temp_file)
    }

    #[test]
    fn test_hash_table_new_is_empty() {
        let (bpm, _temp) = create_bpm(8);
        let table = IdentityTable::new("t", bpm.clone(), IntegerComparator, IdentityHash).unwrap();

        assert_eq!(table.name(), "t");
        assert_eq!(table.global_depth(), 0);
        assert_eq!(table.num_buckets(), 1);
        assert_eq!(bpm.pin_count(table.directory_page_id()), Some(1));
        assert!(table.get_value(&1).unwrap().is_empty());
        table.verify_integrity().unwrap();
    }

    #[test]
    fn test_hash_table_split_on_overflow() {
        let (bpm, _temp) = create_bpm(8);
        let table = IdentityTable::new("t", bpm, IntegerComparator, IdentityHash).unwrap();
        let cap = IdentityTable::BUCKET_CAPACITY as i32;

        for k in 0..cap {
            assert!(table.insert(&k, &k).unwrap());
        }
        assert_eq!(table.global_depth(), 0);

        assert!(table.insert(&cap, &cap).unwrap());
        assert_eq!(table.global_depth(), 1);
        assert_eq!(table.num_buckets(), 2);
        table.verify_integrity().unwrap();

        for k in 0..=cap {
            assert_eq!(table.get_value(&k).unwrap(), vec![k]);
        }
    }

    #[test]
    fn test_hash_table_log_directory_visits_buckets() {
        let (bpm, _temp) = create_bpm(4);
        let table = IdentityTable::new("t", bpm.clone(), IntegerComparator, IdentityHash).unwrap();
        let cap = IdentityTable::BUCKET_CAPACITY as i32;
        for k in 0..=cap {
            table.insert(&k, &k).unwrap();
        }

        let reads = bpm.disk_manager().num_reads();
        table.log_directory().unwrap();
        // Both buckets are still resident.
        assert_eq!(bpm.disk_manager().num_reads(), reads);
        assert_eq!(bpm.pin_count(table.directory_page_id()), Some(1));
        assert_eq!(bpm.evictable_count(), 2);
    }

    #[test]
    fn test_hash_table_repeated_split_for_skewed_keys() {
        let (bpm, _temp) = create_bpm(8);
        let table = IdentityTable::new("t", bpm, IntegerComparator, IdentityHash).unwrap();
        let cap = IdentityTable::BUCKET_CAPACITY as i32;

        // Multiples of 4 agree on the two lowest bits, so the first split
        // leaves them together and a second one is needed.
        for i in 0..=cap {
            assert!(table.insert(&(i * 4), &i).unwrap());
        }
        assert_eq!(table.global_depth(), 2);
        assert_eq!(table.num_buckets(), 3);
        table.verify_integrity().unwrap();
        for i in 0..=cap {
            assert_eq!(table.get_value(&(i * 4)).unwrap(), vec![i]);
        }
    }

    #[test]
    fn test_hash_table_bucket_overflow() {
        let (bpm, _temp) = create_bpm(8);
        let table = IdentityTable::new("t", bpm, IntegerComparator, IdentityHash).unwrap();
        let cap = IdentityTable::BUCKET_CAPACITY as i32;

        for v in 0..cap {
            assert!(table.insert(&7, &v).unwrap());
        }
        assert!(matches!(
            table.insert(&7, &cap),
            Err(SiloError::BucketOverflow(_))
        ));
        assert_eq!(table.get_value(&7).unwrap().len(), cap as usize);
        table.verify_integrity().unwrap();
    }

    #[test]
    fn test_hash_table_directory_full() {
        let (bpm, _temp) = create_bpm(8);
        let table = IdentityTable::new("t", bpm, IntegerComparator, IdentityHash).unwrap();
        let cap = IdentityTable::BUCKET_CAPACITY as i32;

        // Distinct hashes that agree on the low 9 bits can never be split apart.
        for i in 0..cap {
            assert!(table.insert(&(i << 9), &i).unwrap());
        }
        assert!(matches!(
            table.insert(&(cap << 9), &cap),
            Err(SiloError::DirectoryFull(MAX_GLOBAL_DEPTH))
        ));
        table.verify_integrity().unwrap();
        for i in 0..cap {
            assert_eq!(table.get_value(&(i << 9)).unwrap(), vec![i]);
        }
    }

    #[test]
    fn test_hash_table_merge_and_shrink() {
        let (bpm, _temp) = create_bpm(8);
        let table = IdentityTable::new("t", bpm.clone(), IntegerComparator, IdentityHash).unwrap();
        let cap = IdentityTable::BUCKET_CAPACITY as i32;

        for k in 0..=cap {
            table.insert(&k, &k).unwrap();
        }
        assert_eq!(table.global_depth(), 1);

        // Empty the odd bucket.
        for k in (1..=cap).step_by(2) {
            assert!(table.remove(&k, &k).unwrap());
        }
        assert_eq!(table.global_depth(), 0);
        assert_eq!(table.num_buckets(), 1);
        table.verify_integrity().unwrap();

        for k in (0..=cap).step_by(2) {
            assert_eq!(table.get_value(&k).unwrap(), vec![k]);
        }
        assert!(!table.remove(&1, &1).unwrap());
    }

    #[test]
    fn test_hash_table_default_hash_round_trip() {
        let (bpm, _temp) = create_bpm(16);
        let table: ExtendibleHashTable<i64, i64, IntegerComparator, DefaultHashFunction> =
            ExtendibleHashTable::new("fx", bpm, IntegerComparator, DefaultHashFunction).unwrap();

        for k in 0..2000i64 {
            assert!(table.insert(&k, &(k * 2)).unwrap());
        }
        assert!(!table.insert(&5, &10).unwrap());
        table.verify_integrity().unwrap();

        for k in 0..2000i64 {
            assert_eq!(table.get_value(&k).unwrap(), vec![k * 2]);
        }
        for k in 0..2000i64 {
            assert!(table.remove(&k, &(k * 2)).unwrap());
        }
        table.verify_integrity().unwrap();
        assert!(table.get_value(&0).unwrap().is_empty());
    }

    #[test]
    fn test_hash_table_drop_releases_directory() {
        let (bpm, _temp) = create_bpm(4);
        let directory_page_id = {
            let table = IdentityTable::new("t", bpm.clone(), IntegerComparator, IdentityHash).unwrap();
            table.insert(&1, &1).unwrap();
            table.directory_page_id()
        };
        assert_eq!(bpm.pin_count(directory_page_id), Some(0));
        assert_eq!(bpm.is_dirty(directory_page_id), Some(true));
    }
}
