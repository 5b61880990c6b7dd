//! Hash bucket page: bitmap-tracked slot array of key/value pairs.
//!
//! Layout: `occupied` bitmap, `readable` bitmap, then the pair array. A
//! slot stays occupied from the first time it is written until a split
//! rewrites the bucket; removal only clears the readable bit, leaving a
//! tombstone that later inserts reuse. `readable` is always a subset of
//! `occupied`, and the first non-occupied slot terminates the used prefix.

use crate::keys::{FixedCodec, KeyComparator};
use lode_common::PAGE_SIZE;
use std::marker::PhantomData;

/// Outcome of a bucket-level insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketInsert {
    /// The pair was stored.
    Inserted,
    /// The exact pair is already present.
    Duplicate,
    /// Every slot is readable; the bucket must split.
    Full,
}

/// Largest number of pairs a bucket page can track.
///
/// Each pair costs its encoded size plus two bitmap bits; the estimate is
/// then clamped so bitmaps and array actually fit in one page.
pub fn bucket_capacity<K: FixedCodec, V: FixedCodec>() -> usize {
    let pair = K::SIZE + V::SIZE;
    let mut cap = (4 * PAGE_SIZE) / (4 * pair + 1);
    while cap > 0 && 2 * bitmap_bytes(cap) + cap * pair > PAGE_SIZE {
        cap -= 1;
    }
    cap
}

fn bitmap_bytes(capacity: usize) -> usize {
    capacity.div_ceil(8)
}

/// Typed view over hash bucket page bytes.
pub struct HashBucketPage<D, K, V> {
    data: D,
    capacity: usize,
    _marker: PhantomData<(K, V)>,
}

impl<D, K, V> HashBucketPage<D, K, V>
where
    D: AsRef<[u8]>,
    K: FixedCodec,
    V: FixedCodec + PartialEq,
{
    /// Wraps bucket page bytes holding up to `capacity` pairs.
    pub fn new(data: D, capacity: usize) -> Self {
        debug_assert!(capacity > 0);
        debug_assert!(2 * bitmap_bytes(capacity) + capacity * (K::SIZE + V::SIZE) <= PAGE_SIZE);
        Self {
            data,
            capacity,
            _marker: PhantomData,
        }
    }

    fn readable_offset(&self) -> usize {
        bitmap_bytes(self.capacity)
    }

    fn pair_offset(&self, slot: usize) -> usize {
        2 * bitmap_bytes(self.capacity) + slot * (K::SIZE + V::SIZE)
    }

    /// Whether `slot` has ever been written.
    pub fn is_occupied(&self, slot: usize) -> bool {
        let data = self.data.as_ref();
        (data[slot / 8] >> (slot % 8)) & 1 == 1
    }

    /// Whether `slot` currently holds a live pair.
    pub fn is_readable(&self, slot: usize) -> bool {
        let data = self.data.as_ref();
        (data[self.readable_offset() + slot / 8] >> (slot % 8)) & 1 == 1
    }

    /// Key stored at `slot`.
    pub fn key_at(&self, slot: usize) -> K {
        K::decode(&self.data.as_ref()[self.pair_offset(slot)..])
    }

    /// Value stored at `slot`.
    pub fn value_at(&self, slot: usize) -> V {
        V::decode(&self.data.as_ref()[self.pair_offset(slot) + K::SIZE..])
    }

    /// Collects the values of every live pair whose key matches.
    pub fn get_value<C: KeyComparator<K>>(&self, key: &K, cmp: &C) -> Vec<V> {
        let mut result = Vec::new();
        for slot in 0..self.capacity {
            if self.is_readable(slot) && cmp.compare(&self.key_at(slot), key).is_eq() {
                result.push(self.value_at(slot));
            }
        }
        result
    }

    /// Whether the exact pair is live in this bucket.
    pub fn contains<C: KeyComparator<K>>(&self, key: &K, value: &V, cmp: &C) -> bool {
        (0..self.capacity).any(|slot| {
            self.is_readable(slot)
                && cmp.compare(&self.key_at(slot), key).is_eq()
                && self.value_at(slot) == *value
        })
    }

    /// Number of live pairs, scanning the used prefix only: the first
    /// never-occupied slot ends the scan.
    pub fn num_readable(&self) -> usize {
        let mut count = 0;
        for slot in 0..self.capacity {
            if !self.is_occupied(slot) {
                break;
            }
            if self.is_readable(slot) {
                count += 1;
            }
        }
        count
    }

    /// Whether every slot holds a live pair.
    pub fn is_full(&self) -> bool {
        self.num_readable() == self.capacity
    }

    /// Whether no slot holds a live pair.
    pub fn is_empty(&self) -> bool {
        self.num_readable() == 0
    }
}

impl<D, K, V> HashBucketPage<D, K, V>
where
    D: AsRef<[u8]> + AsMut<[u8]>,
    K: FixedCodec,
    V: FixedCodec + PartialEq,
{
    fn set_bit(&mut self, offset: usize, slot: usize, on: bool) {
        let byte = &mut self.data.as_mut()[offset + slot / 8];
        if on {
            *byte |= 1 << (slot % 8);
        } else {
            *byte &= !(1 << (slot % 8));
        }
    }

    /// Writes a pair into `slot`, marking it occupied and readable.
    pub fn insert_at(&mut self, slot: usize, key: &K, value: &V) {
        let off = self.pair_offset(slot);
        let data = self.data.as_mut();
        key.encode(&mut data[off..]);
        value.encode(&mut data[off + K::SIZE..]);
        self.set_bit(0, slot, true);
        let readable = self.readable_offset();
        self.set_bit(readable, slot, true);
    }

    /// Clears the readable bit of `slot`, leaving a tombstone.
    pub fn remove_at(&mut self, slot: usize) {
        let readable = self.readable_offset();
        self.set_bit(readable, slot, false);
    }

    /// Clears both bits of `slot`; used when a split moves the pair out.
    pub fn clear_slot(&mut self, slot: usize) {
        self.set_bit(0, slot, false);
        let readable = self.readable_offset();
        self.set_bit(readable, slot, false);
    }

    /// Inserts a pair at the first free or tombstoned slot.
    pub fn insert<C: KeyComparator<K>>(&mut self, key: &K, value: &V, cmp: &C) -> BucketInsert {
        if self.contains(key, value, cmp) {
            return BucketInsert::Duplicate;
        }
        for slot in 0..self.capacity {
            if !self.is_occupied(slot) || !self.is_readable(slot) {
                self.insert_at(slot, key, value);
                return BucketInsert::Inserted;
            }
        }
        BucketInsert::Full
    }

    /// Removes the exact pair if live. Returns whether anything changed.
    pub fn remove<C: KeyComparator<K>>(&mut self, key: &K, value: &V, cmp: &C) -> bool {
        for slot in 0..self.capacity {
            if self.is_readable(slot)
                && cmp.compare(&self.key_at(slot), key).is_eq()
                && self.value_at(slot) == *value
            {
                self.remove_at(slot);
                return true;
            }
        }
        false
    }
}
