//! On-disk index structures for LodeDB.
//!
//! This crate provides:
//! - A file-backed disk manager for page-level I/O
//! - Key/value codecs, comparators, and hashers for index records
//! - The header page registry mapping index names to root pages
//! - An extendible hash index
//! - A B+-tree index

pub mod btree;
pub mod hash;

mod disk;
mod header;
mod keys;

pub use btree::{leaf_capacity, BPlusTree};
pub use disk::FileDiskManager;
pub use hash::{bucket_capacity, ExtendibleHashTable, DIRECTORY_ARRAY_SIZE};
pub use header::{create_header_page, HeaderPage, HEADER_PAGE_ID, MAX_NAME_LEN};
pub use keys::{
    DefaultKeyHasher, FixedCodec, IdentityHasher, KeyComparator, KeyHasher, OrdComparator,
};
