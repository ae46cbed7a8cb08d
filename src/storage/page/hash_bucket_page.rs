use std::marker::PhantomData;

use crate::common::PAGE_SIZE;
use crate::index::KeyComparator;

use super::Storable;

/// Result of inserting into a bucket page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The exact (key, value) pair is already present
    Duplicate,
    /// No free slot is left
    Full,
}

/// View over a bucket page of an extendible hash table.
///
/// Layout:
/// ```text
/// | occupied bitmap | readable bitmap | (key, value) x CAPACITY |
/// ```
/// A slot is *occupied* once it has ever held an entry and *readable* while it
/// holds a live one. Occupied slots always form a prefix, so scans stop at the
/// first unoccupied slot. Removal only clears the readable bit.
pub struct HashTableBucketPage<T, K, V> {
    data: T,
    _marker: PhantomData<(K, V)>,
}

impl<T, K: Storable, V: Storable> HashTableBucketPage<T, K, V> {
    const PAIR_SIZE: usize = K::SIZE + V::SIZE;

    /// Number of (key, value) slots: each slot costs its pair plus two bitmap bits.
    pub const CAPACITY: usize = 4 * PAGE_SIZE / (4 * Self::PAIR_SIZE + 1);

    const BITMAP_SIZE: usize = (Self::CAPACITY + 7) / 8;
    const OCCUPIED_OFFSET: usize = 0;
    const READABLE_OFFSET: usize = Self::BITMAP_SIZE;
    const ARRAY_OFFSET: usize = 2 * Self::BITMAP_SIZE;

    fn pair_offset(bucket_idx: usize) -> usize {
        Self::ARRAY_OFFSET + bucket_idx * Self::PAIR_SIZE
    }
}

impl<T: AsRef<[u8]>, K: Storable, V: Storable + PartialEq> HashTableBucketPage<T, K, V> {
    pub fn new(data: T) -> Self {
        assert_eq!(data.as_ref().len(), PAGE_SIZE);
        debug_assert!(Self::ARRAY_OFFSET + Self::CAPACITY * Self::PAIR_SIZE <= PAGE_SIZE);
        Self {
            data,
            _marker: PhantomData,
        }
    }

    fn bytes(&self) -> &[u8] {
        self.data.as_ref()
    }

    fn bit(&self, base: usize, bucket_idx: usize) -> bool {
        self.bytes()[base + bucket_idx / 8] & (1 << (bucket_idx % 8)) != 0
    }

    pub fn is_occupied(&self, bucket_idx: usize) -> bool {
        self.bit(Self::OCCUPIED_OFFSET, bucket_idx)
    }

    pub fn is_readable(&self, bucket_idx: usize) -> bool {
        self.bit(Self::READABLE_OFFSET, bucket_idx)
    }

    pub fn key_at(&self, bucket_idx: usize) -> K {
        K::read_from(&self.bytes()[Self::pair_offset(bucket_idx)..])
    }

    pub fn value_at(&self, bucket_idx: usize) -> V {
        V::read_from(&self.bytes()[Self::pair_offset(bucket_idx) + K::SIZE..])
    }

    /// Slots that may hold live entries: everything before the first unoccupied slot.
    fn scan_range(&self) -> impl Iterator<Item = usize> + '_ {
        (0..Self::CAPACITY).take_while(move |&i| self.is_occupied(i))
    }

    /// Collects every value stored under `key`.
    pub fn get_value<C: KeyComparator<K>>(&self, key: &K, comparator: &C) -> Vec<V> {
        self.scan_range()
            .filter(|&i| self.is_readable(i) && comparator.compare(&self.key_at(i), key).is_eq())
            .map(|i| self.value_at(i))
            .collect()
    }

    fn find_pair<C: KeyComparator<K>>(&self, key: &K, value: &V, comparator: &C) -> Option<usize> {
        self.scan_range().find(|&i| {
            self.is_readable(i)
                && comparator.compare(&self.key_at(i), key).is_eq()
                && self.value_at(i) == *value
        })
    }

    pub fn num_readable(&self) -> usize {
        let bitmap = &self.bytes()[Self::READABLE_OFFSET..Self::READABLE_OFFSET + Self::BITMAP_SIZE];
        bitmap.iter().map(|b| b.count_ones() as usize).sum()
    }

    pub fn is_full(&self) -> bool {
        self.num_readable() == Self::CAPACITY
    }

    pub fn is_empty(&self) -> bool {
        self.num_readable() == 0
    }

    /// Live entries in slot order.
    pub fn entries(&self) -> Vec<(K, V)> {
        self.scan_range()
            .filter(|&i| self.is_readable(i))
            .map(|i| (self.key_at(i), self.value_at(i)))
            .collect()
    }

    pub fn log_bucket(&self, level: log::Level) {
        let size = self.scan_range().count();
        let taken = self.num_readable();
        log::log!(
            level,
            "bucket capacity: {}, size: {}, taken: {}, free: {}",
            Self::CAPACITY,
            size,
            taken,
            Self::CAPACITY - taken
        );
    }
}

impl<T, K, V> HashTableBucketPage<T, K, V>
where
    T: AsRef<[u8]> + AsMut<[u8]>,
    K: Storable,
    V: Storable + PartialEq,
{
    fn bytes_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }

    fn set_bit(&mut self, base: usize, bucket_idx: usize, on: bool) {
        let byte = &mut self.bytes_mut()[base + bucket_idx / 8];
        if on {
            *byte |= 1 << (bucket_idx % 8);
        } else {
            *byte &= !(1 << (bucket_idx % 8));
        }
    }

    pub fn set_occupied(&mut self, bucket_idx: usize) {
        self.set_bit(Self::OCCUPIED_OFFSET, bucket_idx, true);
    }

    pub fn set_readable(&mut self, bucket_idx: usize) {
        self.set_bit(Self::READABLE_OFFSET, bucket_idx, true);
    }

    pub fn set_unreadable(&mut self, bucket_idx: usize) {
        self.set_bit(Self::READABLE_OFFSET, bucket_idx, false);
    }

    /// Inserts the pair into the first slot without a live entry.
    pub fn insert<C: KeyComparator<K>>(&mut self, key: &K, value: &V, comparator: &C) -> InsertOutcome {
        if self.find_pair(key, value, comparator).is_some() {
            return InsertOutcome::Duplicate;
        }

        let Some(slot) = (0..Self::CAPACITY).find(|&i| !self.is_readable(i)) else {
            return InsertOutcome::Full;
        };

        let offset = Self::pair_offset(slot);
        key.write_to(&mut self.bytes_mut()[offset..]);
        value.write_to(&mut self.bytes_mut()[offset + K::SIZE..]);
        self.set_occupied(slot);
        self.set_readable(slot);
        InsertOutcome::Inserted
    }

    /// Removes the exact pair; returns false if it is not present.
    pub fn remove<C: KeyComparator<K>>(&mut self, key: &K, value: &V, comparator: &C) -> bool {
        match self.find_pair(key, value, comparator) {
            Some(slot) => {
                self.remove_at(slot);
                true
            }
            None => false,
        }
    }

    /// Tombstones a slot. It stays occupied so later scans keep going past it.
    pub fn remove_at(&mut self, bucket_idx: usize) {
        self.set_unreadable(bucket_idx);
    }

    /// Removes and returns every live entry whose key satisfies `pred`.
    pub fn take_matching(&mut self, mut pred: impl FnMut(&K) -> bool) -> Vec<(K, V)> {
        let mut taken = Vec::new();
        for slot in 0..Self::CAPACITY {
            if !self.is_occupied(slot) {
                break;
            }
            if !self.is_readable(slot) {
                continue;
            }
            let key = self.key_at(slot);
            if pred(&key) {
                taken.push((key, self.value_at(slot)));
                self.remove_at(slot);
            }
        }
        taken
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IntegerComparator;

    type IntBucket<'a> = HashTableBucketPage<&'a mut [u8], i32, i32>;

    #[test]
    fn test_bucket_capacity() {
        assert_eq!(IntBucket::CAPACITY, 496);
        assert_eq!(HashTableBucketPage::<&[u8], i64, i64>::CAPACITY, 252);
    }

    #[test]
    fn test_bucket_insert_get_remove() {
        let mut data = [0u8; PAGE_SIZE];
        let mut bucket = IntBucket::new(&mut data[..]);
        let cmp = IntegerComparator;

        assert!(bucket.is_empty());
        assert_eq!(bucket.insert(&1, &10, &cmp), InsertOutcome::Inserted);
        assert_eq!(bucket.insert(&1, &11, &cmp), InsertOutcome::Inserted);
        assert_eq!(bucket.insert(&2, &20, &cmp), InsertOutcome::Inserted);
        assert_eq!(bucket.insert(&1, &10, &cmp), InsertOutcome::Duplicate);

        assert_eq!(bucket.get_value(&1, &cmp), vec![10, 11]);
        assert_eq!(bucket.get_value(&2, &cmp), vec![20]);
        assert!(bucket.get_value(&3, &cmp).is_empty());
        assert_eq!(bucket.num_readable(), 3);

        assert!(bucket.remove(&1, &10, &cmp));
        assert!(!bucket.remove(&1, &10, &cmp));
        assert_eq!(bucket.get_value(&1, &cmp), vec![11]);
        assert!(bucket.is_occupied(0));
        assert!(!bucket.is_readable(0));
    }

    #[test]
    fn test_bucket_reuses_tombstone() {
        let mut data = [0u8; PAGE_SIZE];
        let mut bucket = IntBucket::new(&mut data[..]);
        let cmp = IntegerComparator;

        for i in 0..3 {
            bucket.insert(&i, &i, &cmp);
        }
        bucket.remove(&1, &1, &cmp);
        bucket.insert(&9, &9, &cmp);

        assert_eq!(bucket.key_at(1), 9);
        assert_eq!(bucket.entries(), vec![(0, 0), (9, 9), (2, 2)]);
        assert!(!bucket.is_occupied(3));
    }

    #[test]
    fn test_bucket_take_matching() {
        let mut data = [0u8; PAGE_SIZE];
        let mut bucket = IntBucket::new(&mut data[..]);
        let cmp = IntegerComparator;

        for i in 0..6 {
            bucket.insert(&i, &(i * 10), &cmp);
        }
        bucket.remove(&4, &40, &cmp);

        let odd = bucket.take_matching(|k| k % 2 == 1);
        assert_eq!(odd, vec![(1, 10), (3, 30), (5, 50)]);
        assert_eq!(bucket.entries(), vec![(0, 0), (2, 20)]);
    }

    #[test]
    fn test_bucket_full() {
        let mut data = [0u8; PAGE_SIZE];
        let mut bucket = IntBucket::new(&mut data[..]);
        let cmp = IntegerComparator;

        for i in 0..IntBucket::CAPACITY as i32 {
            assert_eq!(bucket.insert(&i, &i, &cmp), InsertOutcome::Inserted);
        }
        assert!(bucket.is_full());
        assert_eq!(bucket.insert(&-1, &-1, &cmp), InsertOutcome::Full);
        // A duplicate is still reported as such when full.
        assert_eq!(bucket.insert(&0, &0, &cmp), InsertOutcome::Duplicate);

        bucket.remove(&7, &7, &cmp);
        assert!(!bucket.is_full());
        assert_eq!(bucket.insert(&-1, &-1, &cmp), InsertOutcome::Inserted);
        assert_eq!(bucket.key_at(7), -1);
    }
}
