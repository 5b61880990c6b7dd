//! B+-tree leaf page: sorted key/value array with a right-sibling link.

use crate::btree::page::{
    self, NodeType, LEAF_HEADER_SIZE, MAX_SIZE_OFFSET, NEXT_OFFSET, PAGE_ID_OFFSET, PARENT_OFFSET,
    SIZE_OFFSET,
};
use crate::keys::{FixedCodec, KeyComparator};
use lode_common::{PageId, PAGE_SIZE};
use std::marker::PhantomData;

/// Largest number of entries a leaf page can physically hold.
pub fn leaf_capacity<K: FixedCodec, V: FixedCodec>() -> usize {
    (PAGE_SIZE - LEAF_HEADER_SIZE) / (K::SIZE + V::SIZE)
}

/// Typed view over leaf page bytes.
pub struct LeafPage<D, K, V> {
    data: D,
    _marker: PhantomData<(K, V)>,
}

impl<D, K, V> LeafPage<D, K, V>
where
    D: AsRef<[u8]>,
    K: FixedCodec,
    V: FixedCodec,
{
    /// Wraps leaf page bytes.
    pub fn new(data: D) -> Self {
        Self {
            data,
            _marker: PhantomData,
        }
    }

    fn entry_offset(index: usize) -> usize {
        LEAF_HEADER_SIZE + index * (K::SIZE + V::SIZE)
    }

    /// Number of stored entries.
    pub fn size(&self) -> usize {
        page::node_size(self.data.as_ref())
    }

    /// Configured split threshold.
    pub fn max_size(&self) -> usize {
        page::read_i32(self.data.as_ref(), MAX_SIZE_OFFSET) as usize
    }

    /// Underflow threshold for non-root leaves.
    pub fn min_size(&self) -> usize {
        self.max_size() / 2
    }

    /// This page's id.
    pub fn page_id(&self) -> PageId {
        PageId(page::read_i32(self.data.as_ref(), PAGE_ID_OFFSET))
    }

    /// Cached parent page id.
    pub fn parent_page_id(&self) -> PageId {
        page::node_parent(self.data.as_ref())
    }

    /// Right sibling in the leaf chain.
    pub fn next_page_id(&self) -> PageId {
        PageId(page::read_i32(self.data.as_ref(), NEXT_OFFSET))
    }

    /// Key stored at `index`.
    pub fn key_at(&self, index: usize) -> K {
        K::decode(&self.data.as_ref()[Self::entry_offset(index)..])
    }

    /// Value stored at `index`.
    pub fn value_at(&self, index: usize) -> V {
        V::decode(&self.data.as_ref()[Self::entry_offset(index) + K::SIZE..])
    }

    /// First index whose key is `>= key`; `size()` if every key is smaller.
    pub fn key_index<C: KeyComparator<K>>(&self, key: &K, cmp: &C) -> usize {
        let mut lo = 0;
        let mut hi = self.size();
        while lo < hi {
            let mid = (lo + hi) / 2;
            if cmp.compare(&self.key_at(mid), key).is_lt() {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Point lookup.
    pub fn lookup<C: KeyComparator<K>>(&self, key: &K, cmp: &C) -> Option<V> {
        let index = self.key_index(key, cmp);
        if index < self.size() && cmp.compare(&self.key_at(index), key).is_eq() {
            Some(self.value_at(index))
        } else {
            None
        }
    }
}

impl<D, K, V> LeafPage<D, K, V>
where
    D: AsRef<[u8]> + AsMut<[u8]>,
    K: FixedCodec,
    V: FixedCodec,
{
    /// Initializes an empty leaf.
    pub fn init(&mut self, page_id: PageId, parent: PageId, max_size: usize) {
        page::init_node(self.data.as_mut(), NodeType::Leaf, page_id, parent, max_size);
        page::write_i32(self.data.as_mut(), NEXT_OFFSET, PageId::INVALID.0);
    }

    fn set_size(&mut self, size: usize) {
        page::write_i32(self.data.as_mut(), SIZE_OFFSET, size as i32);
    }

    /// Rewrites the cached parent page id.
    pub fn set_parent_page_id(&mut self, parent: PageId) {
        page::write_i32(self.data.as_mut(), PARENT_OFFSET, parent.0);
    }

    /// Rewrites the right-sibling link.
    pub fn set_next_page_id(&mut self, next: PageId) {
        page::write_i32(self.data.as_mut(), NEXT_OFFSET, next.0);
    }

    fn write_entry(&mut self, index: usize, key: &K, value: &V) {
        let off = Self::entry_offset(index);
        let data = self.data.as_mut();
        key.encode(&mut data[off..]);
        value.encode(&mut data[off + K::SIZE..]);
    }

    /// Inserts keeping keys sorted. Returns false if the key is present.
    pub fn insert<C: KeyComparator<K>>(&mut self, key: &K, value: &V, cmp: &C) -> bool {
        let index = self.key_index(key, cmp);
        let size = self.size();
        if index < size && cmp.compare(&self.key_at(index), key).is_eq() {
            return false;
        }
        self.data.as_mut().copy_within(
            Self::entry_offset(index)..Self::entry_offset(size),
            Self::entry_offset(index + 1),
        );
        self.write_entry(index, key, value);
        self.set_size(size + 1);
        true
    }

    /// Removes a key's entry. Returns false if the key is absent.
    pub fn remove<C: KeyComparator<K>>(&mut self, key: &K, cmp: &C) -> bool {
        let index = self.key_index(key, cmp);
        let size = self.size();
        if index >= size || !cmp.compare(&self.key_at(index), key).is_eq() {
            return false;
        }
        self.data.as_mut().copy_within(
            Self::entry_offset(index + 1)..Self::entry_offset(size),
            Self::entry_offset(index),
        );
        self.set_size(size - 1);
        true
    }

    fn append_from<E>(&mut self, src: &LeafPage<E, K, V>, from: usize, count: usize)
    where
        E: AsRef<[u8]>,
    {
        let dst_start = Self::entry_offset(self.size());
        let src_start = Self::entry_offset(from);
        let len = count * (K::SIZE + V::SIZE);
        self.data.as_mut()[dst_start..dst_start + len]
            .copy_from_slice(&src.data.as_ref()[src_start..src_start + len]);
        let new_size = self.size() + count;
        self.set_size(new_size);
    }

    /// Moves the upper half of this leaf to `recipient`'s tail. The caller
    /// stitches the sibling chain.
    pub fn move_half_to<E>(&mut self, recipient: &mut LeafPage<E, K, V>)
    where
        E: AsRef<[u8]> + AsMut<[u8]>,
    {
        let keep = self.min_size();
        let moved = self.size() - keep;
        recipient.append_from(self, keep, moved);
        self.set_size(keep);
    }

    /// Moves every entry to `recipient`'s tail. The caller fixes
    /// `next_page_id`.
    pub fn move_all_to<E>(&mut self, recipient: &mut LeafPage<E, K, V>)
    where
        E: AsRef<[u8]> + AsMut<[u8]>,
    {
        let size = self.size();
        recipient.append_from(self, 0, size);
        self.set_size(0);
    }

    /// Rotates this leaf's first entry onto `recipient`'s tail.
    pub fn move_first_to_end_of<E>(&mut self, recipient: &mut LeafPage<E, K, V>)
    where
        E: AsRef<[u8]> + AsMut<[u8]>,
    {
        recipient.append_from(self, 0, 1);
        let size = self.size();
        self.data.as_mut().copy_within(
            Self::entry_offset(1)..Self::entry_offset(size),
            Self::entry_offset(0),
        );
        self.set_size(size - 1);
    }

    /// Rotates this leaf's last entry onto `recipient`'s front.
    pub fn move_last_to_front_of<E>(&mut self, recipient: &mut LeafPage<E, K, V>)
    where
        E: AsRef<[u8]> + AsMut<[u8]>,
    {
        let size = self.size();
        let (key, value) = (self.key_at(size - 1), self.value_at(size - 1));

        let recipient_size = recipient.size();
        recipient.data.as_mut().copy_within(
            Self::entry_offset(0)..Self::entry_offset(recipient_size),
            Self::entry_offset(1),
        );
        recipient.write_entry(0, &key, &value);
        recipient.set_size(recipient_size + 1);
        self.set_size(size - 1);
    }
}
