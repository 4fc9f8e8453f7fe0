//! B+ tree driver: root tracking, search, insert with cascading splits,
//! remove with merge/redistribution, and iterator construction.

use crate::catalog::CatalogPage;
use crate::iterator::TreeIterator;
use crate::node::{InternalNode, LeafNode, Node, NodeHeader};
use crate::types::{KeyComparator, NodeKind, RecordId};
use arbor_buffer::{BufferPool, PageGuard};
use arbor_common::page::PageId;
use arbor_common::{ArborError, Result};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Root identity, kept in lockstep with the catalog record.
struct RootState {
    /// Current root page; INVALID when the tree is empty.
    page_id: PageId,
    /// Whether the catalog already holds a record for this index.
    published: bool,
}

/// Header-level operations shared by both node kinds during splits.
trait SplitSibling {
    fn page_id(&self) -> PageId;
    fn parent_id(&self) -> PageId;
    fn set_parent_id(&mut self, parent: PageId);
}

impl SplitSibling for LeafNode {
    fn page_id(&self) -> PageId {
        LeafNode::page_id(self)
    }
    fn parent_id(&self) -> PageId {
        LeafNode::parent_id(self)
    }
    fn set_parent_id(&mut self, parent: PageId) {
        LeafNode::set_parent_id(self, parent)
    }
}

impl SplitSibling for InternalNode {
    fn page_id(&self) -> PageId {
        InternalNode::page_id(self)
    }
    fn parent_id(&self) -> PageId {
        InternalNode::parent_id(self)
    }
    fn set_parent_id(&mut self, parent: PageId) {
        InternalNode::set_parent_id(self, parent)
    }
}

/// On-disk B+ tree index mapping fixed-width ordered keys to record ids.
///
/// All pages live in the buffer pool; the tree holds only transient pins
/// for the duration of an operation. A single tree-wide lock serializes
/// `get`, `insert`, `remove`, and iterator construction.
pub struct BPlusTree<C: KeyComparator> {
    /// Name of this index in the catalog.
    index_name: String,
    /// The page cache mediating all disk access.
    bpm: Arc<BufferPool>,
    /// Key order.
    comparator: C,
    /// Fixed key width in bytes.
    key_size: usize,
    /// Leaf split threshold.
    leaf_max: u16,
    /// Internal split threshold (child count).
    internal_max: u16,
    /// Root identity; the lock doubles as the tree-wide exclusion.
    root: Mutex<RootState>,
}

impl<C: KeyComparator> BPlusTree<C> {
    /// Creates a tree handle over the given buffer pool.
    ///
    /// If the catalog already holds a record for `name`, the persisted
    /// root is adopted and the handle resumes the existing tree;
    /// otherwise the tree starts empty.
    pub fn new(
        name: impl Into<String>,
        bpm: Arc<BufferPool>,
        comparator: C,
        leaf_max: u16,
        internal_max: u16,
    ) -> Result<Self> {
        let index_name = name.into();
        if index_name.is_empty() || index_name.len() > CatalogPage::NAME_MAX {
            return Err(ArborError::InvalidIndexName {
                len: index_name.len(),
                max: CatalogPage::NAME_MAX,
            });
        }

        let key_size = comparator.key_size();
        if key_size == 0 {
            return Err(ArborError::InvalidParameter {
                name: "key_size".to_string(),
                value: "0".to_string(),
            });
        }
        if leaf_max < 2 {
            return Err(ArborError::InvalidParameter {
                name: "leaf_max".to_string(),
                value: leaf_max.to_string(),
            });
        }
        if internal_max < 3 {
            return Err(ArborError::InvalidParameter {
                name: "internal_max".to_string(),
                value: internal_max.to_string(),
            });
        }
        // A node may transiently hold max_size + 1 slots (merge followed
        // by one insert), so the page must have room for one extra.
        if leaf_max as usize + 1 > LeafNode::capacity(key_size) {
            return Err(ArborError::InvalidParameter {
                name: "leaf_max".to_string(),
                value: leaf_max.to_string(),
            });
        }
        if internal_max as usize + 1 > InternalNode::capacity(key_size) {
            return Err(ArborError::InvalidParameter {
                name: "internal_max".to_string(),
                value: internal_max.to_string(),
            });
        }

        // Adopt a previously published root, if any
        let (page_id, published) = {
            let guard = bpm.fetch_page(PageId::HEADER)?;
            let catalog = CatalogPage::from_bytes(&guard.read());
            match catalog.record(&index_name) {
                Some(root) => (root, true),
                None => (PageId::INVALID, false),
            }
        };

        Ok(Self {
            index_name,
            bpm,
            comparator,
            key_size,
            leaf_max,
            internal_max,
            root: Mutex::new(RootState { page_id, published }),
        })
    }

    /// Returns the index name.
    pub fn name(&self) -> &str {
        &self.index_name
    }

    /// Returns true iff the tree holds no entries.
    pub fn is_empty(&self) -> bool {
        !self.root.lock().page_id.is_valid()
    }

    fn check_key(&self, key: &[u8]) -> Result<()> {
        if key.len() != self.key_size {
            return Err(ArborError::KeySizeMismatch {
                expected: self.key_size,
                actual: key.len(),
            });
        }
        Ok(())
    }

    /// Point query: returns the record id stored under `key`, if any.
    pub fn get(&self, key: &[u8]) -> Result<Option<RecordId>> {
        self.check_key(key)?;
        let state = self.root.lock();
        if !state.page_id.is_valid() {
            return Ok(None);
        }

        let guard = self.find_leaf(state.page_id, key, false)?;
        let result = LeafNode::lookup_in_slice(&guard.read()[..], key, &self.comparator);
        Ok(result)
    }

    /// Inserts a pair. Returns false if the key is already present.
    pub fn insert(&self, key: &[u8], rid: RecordId) -> Result<bool> {
        self.check_key(key)?;
        let mut state = self.root.lock();

        if !state.page_id.is_valid() {
            self.start_new_tree(&mut state, key, rid)?;
            return Ok(true);
        }
        self.insert_into_leaf(&mut state, key, rid)
    }

    /// Removes `key` if present. Silently returns if the tree is empty or
    /// the key is absent.
    pub fn remove(&self, key: &[u8]) -> Result<()> {
        self.check_key(key)?;
        let mut state = self.root.lock();
        if !state.page_id.is_valid() {
            return Ok(());
        }

        let guard = self.find_leaf(state.page_id, key, false)?;
        self.delete_entry(&mut state, guard, Bytes::copy_from_slice(key))
    }

    /// Returns a cursor positioned at the smallest key.
    pub fn begin(&self) -> Result<TreeIterator> {
        let state = self.root.lock();
        if !state.page_id.is_valid() {
            return Ok(TreeIterator::end(Arc::clone(&self.bpm)));
        }

        let guard = self.find_leaf(state.page_id, &[], true)?;
        TreeIterator::new(Arc::clone(&self.bpm), guard, 0)
    }

    /// Returns a cursor positioned at the first key >= `key`.
    pub fn begin_at(&self, key: &[u8]) -> Result<TreeIterator> {
        self.check_key(key)?;
        let state = self.root.lock();
        if !state.page_id.is_valid() {
            return Ok(TreeIterator::end(Arc::clone(&self.bpm)));
        }

        let guard = self.find_leaf(state.page_id, key, false)?;
        let index = LeafNode::key_index_in_slice(&guard.read()[..], key, &self.comparator);
        TreeIterator::new(Arc::clone(&self.bpm), guard, index)
    }

    /// Returns the end cursor.
    pub fn end(&self) -> TreeIterator {
        TreeIterator::end(Arc::clone(&self.bpm))
    }

    /// Descends from the root to the leaf covering `key` (or the leftmost
    /// leaf). Interior pages are unpinned clean as soon as the next child
    /// is chosen; the returned leaf stays pinned for the caller.
    fn find_leaf(&self, root: PageId, key: &[u8], left_most: bool) -> Result<PageGuard> {
        let mut page_id = root;
        loop {
            let guard = self.bpm.fetch_page(page_id)?;
            let next = {
                let data = guard.read();
                let header = NodeHeader::from_bytes(&data[..]);
                if header.kind == NodeKind::Leaf {
                    None
                } else if left_most {
                    Some(InternalNode::child_at_in_slice(&data[..], 0))
                } else {
                    Some(InternalNode::lookup_in_slice(&data[..], key, &self.comparator))
                }
            };
            match next {
                None => return Ok(guard),
                Some(child) => page_id = child,
            }
        }
    }

    /// Creates the first leaf and publishes it as the root.
    fn start_new_tree(&self, state: &mut RootState, key: &[u8], rid: RecordId) -> Result<()> {
        let guard = self.bpm.new_page()?;
        let page_id = guard.page_id();

        let mut leaf = LeafNode::new(page_id, PageId::INVALID, self.key_size as u16, self.leaf_max);
        leaf.insert(key, rid, &self.comparator);

        state.page_id = page_id;
        if let Err(e) = self.update_root_page_id(state) {
            state.page_id = PageId::INVALID;
            drop(guard);
            self.bpm.delete_page(page_id);
            return Err(e);
        }

        guard.write().copy_from_slice(leaf.as_bytes());
        debug!(root = %page_id, index = %self.index_name, "started new tree");
        Ok(())
    }

    /// Inserts into the target leaf, splitting it if it fills up.
    fn insert_into_leaf(&self, state: &mut RootState, key: &[u8], rid: RecordId) -> Result<bool> {
        let guard = self.find_leaf(state.page_id, key, false)?;
        let mut leaf = LeafNode::from_bytes(&guard.read());

        let old_size = leaf.size();
        let new_size = leaf.insert(key, rid, &self.comparator);
        if new_size == old_size {
            warn!(index = %self.index_name, "duplicate key rejected");
            return Ok(false);
        }

        if new_size >= self.leaf_max {
            // On failure the in-memory copy is discarded without being
            // written back, so the page keeps its pre-insert contents.
            self.split_leaf(state, &mut leaf)?;
        }

        guard.write().copy_from_slice(leaf.as_bytes());
        Ok(true)
    }

    /// Splits a full leaf into itself plus a new right sibling.
    fn split_leaf(&self, state: &mut RootState, node: &mut LeafNode) -> Result<()> {
        if node.size() < node.max_size() {
            return Err(ArborError::TreeCorrupted(format!(
                "split of non-full leaf {}",
                node.page_id()
            )));
        }

        let right_guard = self.bpm.new_page()?;
        let right_pid = right_guard.page_id();
        let mut right = LeafNode::new(
            right_pid,
            node.parent_id(),
            self.key_size as u16,
            self.leaf_max,
        );

        node.move_half_to(&mut right);
        let separator = Bytes::copy_from_slice(right.key_at(0));

        if let Err(e) = self.insert_into_parent(state, node, &separator, &mut right) {
            // Unlinked sibling must not outlive the failed split
            drop(right_guard);
            self.bpm.delete_page(right_pid);
            return Err(e);
        }

        right_guard.write().copy_from_slice(right.as_bytes());
        debug!(left = %node.page_id(), right = %right_pid, "split leaf");
        Ok(())
    }

    /// Splits a full internal node into itself plus a new right sibling.
    fn split_internal(&self, state: &mut RootState, node: &mut InternalNode) -> Result<()> {
        if node.size() < node.max_size() {
            return Err(ArborError::TreeCorrupted(format!(
                "split of non-full internal {}",
                node.page_id()
            )));
        }

        let right_guard = self.bpm.new_page()?;
        let right_pid = right_guard.page_id();
        let mut right = InternalNode::new(
            right_pid,
            node.parent_id(),
            self.key_size as u16,
            self.internal_max,
        );

        node.move_half_to(&mut right, &self.bpm)?;
        // The pivot sits in the sibling's slot 0; it travels up to the
        // parent and the slot-0 key is undefined from here on.
        let separator = Bytes::copy_from_slice(right.key_at(0));

        if let Err(e) = self.insert_into_parent(state, node, &separator, &mut right) {
            drop(right_guard);
            self.bpm.delete_page(right_pid);
            return Err(e);
        }

        right_guard.write().copy_from_slice(right.as_bytes());
        debug!(left = %node.page_id(), right = %right_pid, "split internal");
        Ok(())
    }

    /// Links a freshly split sibling into the parent, growing a new root
    /// when the old node was the root and recursing when the parent
    /// fills up.
    fn insert_into_parent<N: SplitSibling>(
        &self,
        state: &mut RootState,
        old: &mut N,
        separator: &Bytes,
        new: &mut N,
    ) -> Result<()> {
        if !old.parent_id().is_valid() {
            // The root split: grow the tree by one level
            let root_guard = self.bpm.new_page()?;
            let root_pid = root_guard.page_id();

            let mut root = InternalNode::new(
                root_pid,
                PageId::INVALID,
                self.key_size as u16,
                self.internal_max,
            );
            root.populate_new_root(old.page_id(), separator, new.page_id());
            old.set_parent_id(root_pid);
            new.set_parent_id(root_pid);

            state.page_id = root_pid;
            if let Err(e) = self.update_root_page_id(state) {
                state.page_id = old.page_id();
                drop(root_guard);
                self.bpm.delete_page(root_pid);
                return Err(e);
            }

            root_guard.write().copy_from_slice(root.as_bytes());
            debug!(root = %root_pid, "grew new root");
            return Ok(());
        }

        let parent_guard = self.bpm.fetch_page(old.parent_id())?;
        let mut parent = InternalNode::from_bytes(&parent_guard.read());
        parent.insert_node_after(old.page_id(), separator, new.page_id())?;

        if parent.size() >= parent.max_size() {
            self.split_internal(state, &mut parent)?;
        }

        parent_guard.write().copy_from_slice(parent.as_bytes());
        Ok(())
    }

    /// Removes `key` from the pinned node and rebalances bottom-up.
    ///
    /// Consumes the caller's pin on every path. On a leaf the pair under
    /// `key` is removed; on an internal node (the recursive case) the
    /// slot whose subtree `key` selects is removed.
    fn delete_entry(&self, state: &mut RootState, guard: PageGuard, key: Bytes) -> Result<()> {
        let mut node = Node::from_bytes(&guard.read())?;

        match &mut node {
            Node::Leaf(leaf) => {
                leaf.remove(&key, &self.comparator);
            }
            Node::Internal(internal) => {
                let child = internal.lookup(&key, &self.comparator);
                let idx = internal.child_index(child).ok_or_else(|| {
                    ArborError::TreeCorrupted(format!(
                        "child {} missing from internal {}",
                        child,
                        internal.page_id()
                    ))
                })?;
                internal.remove(idx);
            }
        }

        if node.is_root() {
            let collapse = self.adjust_root(state, &node)?;
            let page_id = node.page_id();
            guard.write().copy_from_slice(node.as_bytes());
            drop(guard);
            if collapse {
                self.bpm.delete_page(page_id);
            }
            return Ok(());
        }

        if node.size() >= node.min_size() {
            guard.write().copy_from_slice(node.as_bytes());
            return Ok(());
        }

        // Underflow: merge with the sibling when both fit in one node,
        // borrow a single entry from it otherwise.
        let parent_guard = self.bpm.fetch_page(node.parent_id())?;
        let mut parent = InternalNode::from_bytes(&parent_guard.read());

        let idx = parent.child_index(node.page_id()).ok_or_else(|| {
            ArborError::TreeCorrupted(format!(
                "child {} missing from parent {}",
                node.page_id(),
                parent.page_id()
            ))
        })?;
        let sibling_idx = if idx == 0 { 1 } else { idx - 1 };
        let middle_idx = idx.max(sibling_idx);
        let middle_key = Bytes::copy_from_slice(parent.key_at(middle_idx));

        let sibling_guard = self.bpm.fetch_page(parent.child_at(sibling_idx))?;
        let mut sibling = Node::from_bytes(&sibling_guard.read())?;

        if node.size() + sibling.size() > node.max_size() {
            // Redistribute: pull one entry across the separator
            let new_separator = match (&mut sibling, &mut node) {
                (Node::Leaf(s), Node::Leaf(n)) => {
                    if sibling_idx < idx {
                        s.move_last_to_front_of(n)
                    } else {
                        s.move_first_to_end_of(n)
                    }
                }
                (Node::Internal(s), Node::Internal(n)) => {
                    if sibling_idx < idx {
                        s.move_last_to_front_of(n, &middle_key, &self.bpm)?
                    } else {
                        s.move_first_to_end_of(n, &middle_key, &self.bpm)?
                    }
                }
                _ => {
                    return Err(ArborError::TreeCorrupted(format!(
                        "kind mismatch between siblings of parent {}",
                        parent.page_id()
                    )))
                }
            };

            parent.set_key_at(middle_idx, &new_separator);

            guard.write().copy_from_slice(node.as_bytes());
            sibling_guard.write().copy_from_slice(sibling.as_bytes());
            parent_guard.write().copy_from_slice(parent.as_bytes());
            return Ok(());
        }

        // Merge: append the later node into the earlier one
        let (mut dst, mut src, dst_guard, src_guard) = if idx > sibling_idx {
            (sibling, node, sibling_guard, guard)
        } else {
            (node, sibling, guard, sibling_guard)
        };

        match (&mut src, &mut dst) {
            (Node::Leaf(s), Node::Leaf(d)) => s.move_all_to(d),
            (Node::Internal(s), Node::Internal(d)) => {
                s.move_all_to(d, &middle_key, &self.bpm)?
            }
            _ => {
                return Err(ArborError::TreeCorrupted(format!(
                    "kind mismatch between siblings of parent {}",
                    parent.page_id()
                )))
            }
        }

        let src_pid = src.page_id();
        dst_guard.write().copy_from_slice(dst.as_bytes());
        src_guard.write().copy_from_slice(src.as_bytes());
        drop(dst_guard);
        drop(src_guard);
        self.bpm.delete_page(src_pid);
        debug!(survivor = %dst.page_id(), deleted = %src_pid, "merged siblings");

        // The separator that divided dst from src leaves the parent
        self.delete_entry(state, parent_guard, middle_key)
    }

    /// Collapses the root when it degenerates: an internal root left with
    /// a single child promotes that child; an emptied leaf root empties
    /// the tree. Returns true when the old root page should be deleted.
    fn adjust_root(&self, state: &mut RootState, node: &Node) -> Result<bool> {
        match node {
            Node::Internal(internal) if internal.size() == 1 => {
                let new_root = internal.child_at(0);
                let child_guard = self.bpm.fetch_page(new_root)?;
                NodeHeader::write_parent(&mut child_guard.write()[..], PageId::INVALID);
                drop(child_guard);

                state.page_id = new_root;
                self.update_root_page_id(state)?;
                debug!(root = %new_root, "root collapsed onto only child");
                Ok(true)
            }
            Node::Leaf(leaf) if leaf.size() == 0 => {
                state.page_id = PageId::INVALID;
                self.update_root_page_id(state)?;
                debug!(index = %self.index_name, "tree emptied");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Persists the root page id under the index's name on the header
    /// page: a record insert on first publication, an update afterwards.
    fn update_root_page_id(&self, state: &mut RootState) -> Result<()> {
        let guard = self.bpm.fetch_page(PageId::HEADER)?;
        let mut catalog = CatalogPage::from_bytes(&guard.read());

        if state.published {
            if !catalog.update_record(&self.index_name, state.page_id) {
                return Err(ArborError::TreeCorrupted(format!(
                    "catalog record missing for index {}",
                    self.index_name
                )));
            }
        } else {
            if !catalog.insert_record(&self.index_name, state.page_id)? {
                // A record survived from an earlier incarnation
                catalog.update_record(&self.index_name, state.page_id);
            }
            state.published = true;
        }

        guard.write().copy_from_slice(catalog.as_bytes());
        Ok(())
    }
}
