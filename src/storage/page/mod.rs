mod hash_bucket_page;
mod hash_directory_page;
mod storable;

pub use hash_bucket_page::{HashTableBucketPage, InsertOutcome};
pub use hash_directory_page::HashTableDirectoryPage;
pub use storable::Storable;
