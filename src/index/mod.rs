mod extendible_hash_table;
mod generic_key;
mod hash_function;
mod key_comparator;

pub use extendible_hash_table::ExtendibleHashTable;
pub use generic_key::{GenericKey, GenericKey16, GenericKey32, GenericKey4, GenericKey64, GenericKey8};
pub use hash_function::{DefaultHashFunction, HashFunction};
pub use key_comparator::{BytewiseComparator, IntegerComparator, KeyComparator};
