use std::cmp::Ordering;

use super::GenericKey;

/// Total order over index keys. Equality under `compare` is what the hash
/// index treats as "the same key".
pub trait KeyComparator<K>: Send + Sync {
    fn compare(&self, a: &K, b: &K) -> Ordering;
}

/// Natural order of machine integers.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerComparator;

macro_rules! impl_integer_comparator {
    ($($t:ty),*) => {
        $(
            impl KeyComparator<$t> for IntegerComparator {
                fn compare(&self, a: &$t, b: &$t) -> Ordering {
                    a.cmp(b)
                }
            }
        )*
    };
}

impl_integer_comparator!(i32, u32, i64, u64);

/// Lexicographic order of the raw key bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytewiseComparator;

impl<const N: usize> KeyComparator<GenericKey<N>> for BytewiseComparator {
    fn compare(&self, a: &GenericKey<N>, b: &GenericKey<N>) -> Ordering {
        a.as_bytes().cmp(b.as_bytes())
    }
}
