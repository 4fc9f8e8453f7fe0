//! Forward iteration over the leaf linked list.

use crate::node::{LeafNode, NodeHeader};
use crate::types::RecordId;
use arbor_buffer::{BufferPool, PageGuard};
use arbor_common::page::PageId;
use arbor_common::Result;
use bytes::Bytes;
use std::sync::Arc;

/// Forward cursor over a B+ tree's entries in ascending key order.
///
/// The cursor holds exactly one pinned leaf at a time; advancing past a
/// leaf's last entry transfers the pin to the next leaf via the leaf
/// chain. The end position holds no pin and compares equal to any other
/// end position of the same tree.
pub struct TreeIterator {
    bpm: Arc<BufferPool>,
    /// The held pin; None at end.
    guard: Option<PageGuard>,
    /// Current leaf, INVALID at end.
    page_id: PageId,
    /// Slot index within the current leaf.
    index: usize,
}

impl TreeIterator {
    /// Creates a cursor over a pinned leaf, normalizing past-the-end
    /// positions forward to the next leaf with entries.
    pub(crate) fn new(bpm: Arc<BufferPool>, guard: PageGuard, index: usize) -> Result<Self> {
        let mut iter = Self {
            bpm,
            page_id: guard.page_id(),
            guard: Some(guard),
            index,
        };
        iter.normalize()?;
        Ok(iter)
    }

    /// Creates the end sentinel in O(1).
    pub(crate) fn end(bpm: Arc<BufferPool>) -> Self {
        Self {
            bpm,
            guard: None,
            page_id: PageId::INVALID,
            index: 0,
        }
    }

    /// Returns true if the cursor is past the last entry.
    pub fn is_end(&self) -> bool {
        self.guard.is_none()
    }

    /// Returns the current key, or None at end.
    pub fn key(&self) -> Option<Bytes> {
        self.guard.as_ref().map(|guard| {
            let data = guard.read();
            Bytes::copy_from_slice(LeafNode::key_at_in_slice(&data[..], self.index))
        })
    }

    /// Returns the current record id, or None at end.
    pub fn record_id(&self) -> Option<RecordId> {
        self.guard.as_ref().map(|guard| {
            let data = guard.read();
            LeafNode::record_at_in_slice(&data[..], self.index)
        })
    }

    /// Returns the current `(key, record id)` pair, or None at end.
    pub fn entry(&self) -> Option<(Bytes, RecordId)> {
        self.guard.as_ref().map(|guard| {
            let data = guard.read();
            (
                Bytes::copy_from_slice(LeafNode::key_at_in_slice(&data[..], self.index)),
                LeafNode::record_at_in_slice(&data[..], self.index),
            )
        })
    }

    /// Steps to the next entry. A no-op at end.
    pub fn advance(&mut self) -> Result<()> {
        if self.is_end() {
            return Ok(());
        }
        self.index += 1;
        self.normalize()
    }

    /// Hops forward through the leaf chain until the index points at a
    /// live entry, releasing each exhausted leaf's pin as it goes.
    fn normalize(&mut self) -> Result<()> {
        while let Some(guard) = &self.guard {
            let (size, next_leaf) = {
                let data = guard.read();
                let header = NodeHeader::from_bytes(&data[..]);
                (header.size as usize, header.next_leaf)
            };

            if self.index < size {
                return Ok(());
            }

            // Exhausted this leaf; drop its pin before pinning the next
            self.guard = None;

            if !next_leaf.is_valid() {
                self.page_id = PageId::INVALID;
                self.index = 0;
                return Ok(());
            }

            let next = self.bpm.fetch_page(next_leaf)?;
            self.page_id = next_leaf;
            self.index = 0;
            self.guard = Some(next);
        }
        Ok(())
    }
}

impl PartialEq for TreeIterator {
    fn eq(&self, other: &Self) -> bool {
        self.page_id == other.page_id && self.index == other.index
    }
}

impl Eq for TreeIterator {}

impl std::fmt::Debug for TreeIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeIterator")
            .field("page_id", &self.page_id)
            .field("index", &self.index)
            .finish()
    }
}
