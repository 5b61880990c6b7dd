//! B+-tree internal page: keys routing to child page ids.
//!
//! Entry 0's key is unused (its child is the leftmost subtree). For
//! `i > 0`, subtree `i` holds keys `>= key_at(i)` and subtree `i - 1`
//! holds keys below it.

use crate::btree::page::{
    self, NodeType, INTERNAL_HEADER_SIZE, MAX_SIZE_OFFSET, PAGE_ID_OFFSET, SIZE_OFFSET,
};
use crate::keys::{FixedCodec, KeyComparator};
use lode_common::{PageId, PAGE_SIZE};
use std::marker::PhantomData;

/// Largest number of entries an internal page can physically hold.
pub fn internal_capacity<K: FixedCodec>() -> usize {
    (PAGE_SIZE - INTERNAL_HEADER_SIZE) / (K::SIZE + 4)
}

/// Typed view over internal page bytes.
pub struct InternalPage<D, K> {
    data: D,
    _marker: PhantomData<K>,
}

impl<D, K> InternalPage<D, K>
where
    D: AsRef<[u8]>,
    K: FixedCodec,
{
    /// Wraps internal page bytes.
    pub fn new(data: D) -> Self {
        Self {
            data,
            _marker: PhantomData,
        }
    }

    fn entry_offset(index: usize) -> usize {
        INTERNAL_HEADER_SIZE + index * (K::SIZE + 4)
    }

    /// Number of child pointers (one more than the number of real keys).
    pub fn size(&self) -> usize {
        page::node_size(self.data.as_ref())
    }

    /// Configured split threshold.
    pub fn max_size(&self) -> usize {
        page::read_i32(self.data.as_ref(), MAX_SIZE_OFFSET) as usize
    }

    /// Underflow threshold for non-root internal nodes, counting the
    /// leftmost child pointer slot.
    pub fn min_size(&self) -> usize {
        (self.max_size() + 1) / 2
    }

    /// This page's id.
    pub fn page_id(&self) -> PageId {
        PageId(page::read_i32(self.data.as_ref(), PAGE_ID_OFFSET))
    }

    /// Cached parent page id.
    pub fn parent_page_id(&self) -> PageId {
        page::node_parent(self.data.as_ref())
    }

    /// Key stored at `index`; index 0 is the unused ghost key.
    pub fn key_at(&self, index: usize) -> K {
        K::decode(&self.data.as_ref()[Self::entry_offset(index)..])
    }

    /// Child page id stored at `index`.
    pub fn child_at(&self, index: usize) -> PageId {
        let off = Self::entry_offset(index) + K::SIZE;
        PageId(page::read_i32(self.data.as_ref(), off))
    }

    /// Index of the entry holding `child`, if any.
    pub fn child_index(&self, child: PageId) -> Option<usize> {
        (0..self.size()).find(|&i| self.child_at(i) == child)
    }

    /// Index of the child whose subtree may hold `key`: the last entry
    /// whose key is `<= key`, or 0 when every real key is greater.
    pub fn lookup<C: KeyComparator<K>>(&self, key: &K, cmp: &C) -> usize {
        let mut lo = 1;
        let mut hi = self.size();
        while lo < hi {
            let mid = (lo + hi) / 2;
            if cmp.compare(&self.key_at(mid), key).is_le() {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo - 1
    }
}

impl<D, K> InternalPage<D, K>
where
    D: AsRef<[u8]> + AsMut<[u8]>,
    K: FixedCodec,
{
    /// Initializes an empty internal node.
    pub fn init(&mut self, page_id: PageId, parent: PageId, max_size: usize) {
        page::init_node(
            self.data.as_mut(),
            NodeType::Internal,
            page_id,
            parent,
            max_size,
        );
    }

    fn set_size(&mut self, size: usize) {
        page::write_i32(self.data.as_mut(), SIZE_OFFSET, size as i32);
    }

    /// Rewrites the key at `index`.
    pub fn set_key_at(&mut self, index: usize, key: &K) {
        let off = Self::entry_offset(index);
        key.encode(&mut self.data.as_mut()[off..]);
    }

    /// Rewrites the child page id at `index`.
    pub fn set_child_at(&mut self, index: usize, child: PageId) {
        let off = Self::entry_offset(index) + K::SIZE;
        page::write_i32(self.data.as_mut(), off, child.0);
    }

    /// Seeds a fresh root after the old root split: the old root becomes
    /// the leftmost child and `key` separates it from the new sibling.
    pub fn populate_new_root(&mut self, left: PageId, key: &K, right: PageId) {
        self.set_child_at(0, left);
        self.set_key_at(1, key);
        self.set_child_at(1, right);
        self.set_size(2);
    }

    /// Inserts `(key, child)` immediately after the entry holding
    /// `after_child`.
    pub fn insert_node_after(&mut self, after_child: PageId, key: &K, child: PageId) {
        let index = self
            .child_index(after_child)
            .expect("split sibling's left neighbor must be present")
            + 1;
        let size = self.size();
        self.data.as_mut().copy_within(
            Self::entry_offset(index)..Self::entry_offset(size),
            Self::entry_offset(index + 1),
        );
        self.set_key_at(index, key);
        self.set_child_at(index, child);
        self.set_size(size + 1);
    }

    /// Removes the entry at `index`.
    pub fn remove(&mut self, index: usize) {
        let size = self.size();
        self.data.as_mut().copy_within(
            Self::entry_offset(index + 1)..Self::entry_offset(size),
            Self::entry_offset(index),
        );
        self.set_size(size - 1);
    }

    fn append_from<E>(&mut self, src: &InternalPage<E, K>, from: usize, count: usize)
    where
        E: AsRef<[u8]>,
    {
        let dst_start = Self::entry_offset(self.size());
        let src_start = Self::entry_offset(from);
        let len = count * (K::SIZE + 4);
        self.data.as_mut()[dst_start..dst_start + len]
            .copy_from_slice(&src.data.as_ref()[src_start..src_start + len]);
        let new_size = self.size() + count;
        self.set_size(new_size);
    }

    /// Moves the upper half of this node to `recipient` (assumed empty).
    /// The moved block's first key becomes `recipient`'s ghost key, which
    /// the caller pushes up. Returns the moved child page ids so the
    /// caller can reparent them.
    pub fn move_half_to<E>(&mut self, recipient: &mut InternalPage<E, K>) -> Vec<PageId>
    where
        E: AsRef<[u8]> + AsMut<[u8]>,
    {
        let keep = self.min_size();
        let size = self.size();
        let moved: Vec<PageId> = (keep..size).map(|i| self.child_at(i)).collect();
        recipient.append_from(self, keep, size - keep);
        self.set_size(keep);
        moved
    }

    /// Moves every entry to `recipient`'s tail, giving this node's ghost
    /// key the separator pulled down from the parent. Returns the moved
    /// child page ids.
    pub fn move_all_to<E>(
        &mut self,
        recipient: &mut InternalPage<E, K>,
        middle_key: &K,
    ) -> Vec<PageId>
    where
        E: AsRef<[u8]> + AsMut<[u8]>,
    {
        self.set_key_at(0, middle_key);
        let size = self.size();
        let moved: Vec<PageId> = (0..size).map(|i| self.child_at(i)).collect();
        recipient.append_from(self, 0, size);
        self.set_size(0);
        moved
    }

    /// Rotates this node's first entry onto `recipient`'s tail. The
    /// parent's separator comes down as the moved entry's key; the caller
    /// pushes this node's next key up. Returns the moved child.
    pub fn move_first_to_end_of<E>(
        &mut self,
        recipient: &mut InternalPage<E, K>,
        middle_key: &K,
    ) -> PageId
    where
        E: AsRef<[u8]> + AsMut<[u8]>,
    {
        let moved_child = self.child_at(0);
        let recipient_size = recipient.size();
        recipient.set_key_at(recipient_size, middle_key);
        recipient.set_child_at(recipient_size, moved_child);
        recipient.set_size(recipient_size + 1);

        let size = self.size();
        self.data.as_mut().copy_within(
            Self::entry_offset(1)..Self::entry_offset(size),
            Self::entry_offset(0),
        );
        self.set_size(size - 1);
        moved_child
    }

    /// Rotates this node's last entry onto `recipient`'s front. The
    /// parent's separator comes down as the key of `recipient`'s former
    /// first child; the caller pushes the moved entry's key up. Returns
    /// the moved child.
    pub fn move_last_to_front_of<E>(
        &mut self,
        recipient: &mut InternalPage<E, K>,
        middle_key: &K,
    ) -> PageId
    where
        E: AsRef<[u8]> + AsMut<[u8]>,
    {
        let size = self.size();
        let moved_child = self.child_at(size - 1);

        let recipient_size = recipient.size();
        recipient.data.as_mut().copy_within(
            Self::entry_offset(0)..Self::entry_offset(recipient_size),
            Self::entry_offset(1),
        );
        recipient.set_child_at(0, moved_child);
        recipient.set_key_at(1, middle_key);
        recipient.set_size(recipient_size + 1);

        self.set_size(size - 1);
        moved_child
    }
}
