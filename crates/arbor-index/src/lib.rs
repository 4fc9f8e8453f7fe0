//! B+ tree index for ArborDB.
//!
//! This crate provides an on-disk B+ tree mapping fixed-width ordered keys
//! to record identifiers, mediated through the `arbor-buffer` page cache:
//! - Leaf and internal page layouts over raw page bytes
//! - Tree driver with point lookup, insert (cascading splits), and
//!   remove (borrow/merge rebalancing with root collapse)
//! - Forward iteration over the leaf linked list
//! - Root persistence via catalog records on the reserved header page

mod catalog;
mod iterator;
mod node;
mod tree;
mod types;

pub use catalog::CatalogPage;
pub use iterator::TreeIterator;
pub use node::{InternalNode, LeafNode, Node, NodeHeader};
pub use tree::BPlusTree;
pub use types::{BytewiseComparator, I64Comparator, KeyComparator, NodeKind, RecordId};
