//! On-disk extendible hash index.

mod bucket;
mod directory;
mod table;

pub use bucket::{bucket_capacity, BucketInsert, HashBucketPage};
pub use directory::{HashDirectoryPage, DIRECTORY_ARRAY_SIZE};
pub use table::ExtendibleHashTable;
