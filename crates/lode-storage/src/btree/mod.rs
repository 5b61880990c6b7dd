//! On-disk B+-tree index.

mod internal;
mod leaf;
mod page;
mod tree;

pub use internal::{internal_capacity, InternalPage};
pub use leaf::{leaf_capacity, LeafPage};
pub use page::{node_type, NodeType};
pub use tree::BPlusTree;
