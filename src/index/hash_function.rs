use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

/// Maps a key to the 32-bit hash the directory routes on.
pub trait HashFunction<K>: Send + Sync {
    fn hash(&self, key: &K) -> u32;
}

/// FxHash of the key, folded from 64 to 32 bits. Deterministic across runs,
/// which an on-disk index depends on.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHashFunction;

impl<K: Hash> HashFunction<K> for DefaultHashFunction {
    fn hash(&self, key: &K) -> u32 {
        let mut hasher = FxHasher::default();
        key.hash(&mut hasher);
        let h = hasher.finish();
        (h ^ (h >> 32)) as u32
    }
}
