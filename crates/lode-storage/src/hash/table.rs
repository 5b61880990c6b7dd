//! Extendible hash table over buffer-pool pages.
//!
//! A single directory page (global depth, per-slot local depths and bucket
//! page ids) routes each key's hashed low bits to a bucket page. Full
//! buckets split, doubling the directory when the splitting bucket is at
//! global depth; emptied buckets merge with their split image and the
//! directory halves when no bucket needs full depth.

use crate::hash::bucket::{bucket_capacity, HashBucketPage};
use crate::hash::directory::{HashDirectoryPage, DIRECTORY_ARRAY_SIZE};
use crate::keys::{FixedCodec, KeyComparator, KeyHasher};
use lode_buffer::{BufferPool, PageGuard};
use lode_common::{PageId, Result, Transaction};
use parking_lot::RwLock;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Disk-backed extendible hash index.
///
/// Reads take the table latch shared; inserts and removes take it
/// exclusive, covering all directory restructuring. Page access goes
/// through the buffer pool; every fetch is guard-scoped.
pub struct ExtendibleHashTable<K, V, C, H> {
    directory_page_id: PageId,
    pool: Arc<dyn BufferPool>,
    comparator: C,
    hasher: H,
    bucket_capacity: usize,
    table_latch: RwLock<()>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V, C, H> ExtendibleHashTable<K, V, C, H>
where
    K: FixedCodec,
    V: FixedCodec + PartialEq,
    C: KeyComparator<K>,
    H: KeyHasher<K>,
{
    /// Creates a table with the page-size-derived bucket capacity.
    pub fn new(pool: Arc<dyn BufferPool>, comparator: C, hasher: H) -> Result<Self> {
        Self::with_bucket_capacity(pool, comparator, hasher, bucket_capacity::<K, V>())
    }

    /// Creates a table with an explicit bucket capacity. Small capacities
    /// make split and merge behavior easy to drive in tests.
    pub fn with_bucket_capacity(
        pool: Arc<dyn BufferPool>,
        comparator: C,
        hasher: H,
        bucket_capacity: usize,
    ) -> Result<Self> {
        let directory_page_id;
        {
            let dir_guard = PageGuard::create(pool.as_ref())?;
            directory_page_id = dir_guard.page_id();
            let bucket_guard = PageGuard::create(pool.as_ref())?;
            let bucket_page_id = bucket_guard.page_id();

            let mut dir_data = dir_guard.data_mut();
            let mut dir = HashDirectoryPage::new(&mut dir_data[..]);
            dir.init(directory_page_id);
            dir.set_bucket_page_id(0, bucket_page_id);
            dir.set_local_depth(0, 0);
            // The zeroed fresh page is already a valid empty bucket.
        }

        Ok(Self {
            directory_page_id,
            pool,
            comparator,
            hasher,
            bucket_capacity,
            table_latch: RwLock::new(()),
            _marker: PhantomData,
        })
    }

    /// Returns the directory page id.
    pub fn directory_page_id(&self) -> PageId {
        self.directory_page_id
    }

    fn hash(&self, key: &K) -> u32 {
        self.hasher.hash_key(key) as u32
    }

    /// Resolves a key to its directory slot and bucket page.
    fn locate(&self, dir_guard: &PageGuard<'_>, key: &K) -> (usize, PageId) {
        let dir_data = dir_guard.data();
        let dir = HashDirectoryPage::new(&dir_data[..]);
        let slot = (self.hash(key) & dir.global_depth_mask()) as usize;
        (slot, dir.bucket_page_id(slot))
    }

    /// Collects every value stored under `key`.
    pub fn get_value(&self, _txn: &Transaction, key: &K) -> Result<Vec<V>> {
        let _read = self.table_latch.read();
        let dir_guard = PageGuard::fetch(self.pool.as_ref(), self.directory_page_id)?;
        let (_slot, bucket_page_id) = self.locate(&dir_guard, key);

        let bucket_guard = PageGuard::fetch(self.pool.as_ref(), bucket_page_id)?;
        let data = bucket_guard.data();
        let bucket = HashBucketPage::<_, K, V>::new(&data[..], self.bucket_capacity);
        Ok(bucket.get_value(key, &self.comparator))
    }

    /// Inserts a key/value pair.
    ///
    /// Returns false if the exact pair is already present, or if the pair
    /// cannot be placed because the directory is at capacity.
    pub fn insert(&self, _txn: &Transaction, key: &K, value: &V) -> Result<bool> {
        let _write = self.table_latch.write();
        loop {
            let dir_guard = PageGuard::fetch(self.pool.as_ref(), self.directory_page_id)?;
            let (slot, bucket_page_id) = self.locate(&dir_guard, key);

            let bucket_guard = PageGuard::fetch(self.pool.as_ref(), bucket_page_id)?;
            let (duplicate, full) = {
                let data = bucket_guard.data();
                let bucket = HashBucketPage::<_, K, V>::new(&data[..], self.bucket_capacity);
                (
                    bucket.contains(key, value, &self.comparator),
                    bucket.is_full(),
                )
            };
            if duplicate {
                return Ok(false);
            }
            if !full {
                let mut data = bucket_guard.data_mut();
                let mut bucket =
                    HashBucketPage::<_, K, V>::new(&mut data[..], self.bucket_capacity);
                bucket.insert(key, value, &self.comparator);
                return Ok(true);
            }

            drop(bucket_guard);
            if !self.split_bucket(&dir_guard, slot, bucket_page_id)? {
                return Ok(false);
            }
            // Re-resolve and retry; the split raised this bucket's local
            // depth, so the loop makes progress.
        }
    }

    /// Splits the full bucket behind `slot`, growing the directory first if
    /// the bucket is at global depth. Returns false when growing would
    /// exceed the directory's capacity.
    fn split_bucket(
        &self,
        dir_guard: &PageGuard<'_>,
        slot: usize,
        bucket_page_id: PageId,
    ) -> Result<bool> {
        let mut dir_data = dir_guard.data_mut();
        let mut dir = HashDirectoryPage::new(&mut dir_data[..]);

        let ld = dir.local_depth(slot) as usize;
        if ld as u32 == dir.global_depth() {
            if dir.size() * 2 > DIRECTORY_ARRAY_SIZE {
                return Ok(false);
            }
            dir.incr_global_depth();
        }

        let image_guard = PageGuard::create(self.pool.as_ref())?;
        let image_page_id = image_guard.page_id();
        debug!(
            bucket = %bucket_page_id,
            image = %image_page_id,
            global_depth = dir.global_depth(),
            "splitting hash bucket"
        );

        // Every slot sharing the bucket's low `ld` bits either keeps the
        // old bucket or moves to the image, split by bit `ld`; all of them
        // advance to depth `ld + 1`.
        let stride = 1usize << ld;
        let bit = stride;
        let mut s = slot & (stride - 1);
        while s < dir.size() {
            if (s & bit) != (slot & bit) {
                dir.set_bucket_page_id(s, image_page_id);
            }
            dir.incr_local_depth(s);
            s += stride;
        }

        // Rehash live pairs; movers land in the image bucket.
        let bucket_guard = PageGuard::fetch(self.pool.as_ref(), bucket_page_id)?;
        let mut old_data = bucket_guard.data_mut();
        let mut old = HashBucketPage::<_, K, V>::new(&mut old_data[..], self.bucket_capacity);
        let mut image_data = image_guard.data_mut();
        let mut image = HashBucketPage::<_, K, V>::new(&mut image_data[..], self.bucket_capacity);

        let mut next_slot = 0;
        for i in 0..self.bucket_capacity {
            if !old.is_readable(i) {
                continue;
            }
            let key = old.key_at(i);
            let target = (self.hash(&key) & dir.global_depth_mask()) as usize;
            if dir.bucket_page_id(target) == image_page_id {
                let value = old.value_at(i);
                image.insert_at(next_slot, &key, &value);
                next_slot += 1;
                old.clear_slot(i);
            }
        }
        Ok(true)
    }

    /// Removes a key/value pair. If the bucket becomes empty, tries to
    /// merge it with its split image.
    pub fn remove(&self, _txn: &Transaction, key: &K, value: &V) -> Result<bool> {
        let _write = self.table_latch.write();
        let dir_guard = PageGuard::fetch(self.pool.as_ref(), self.directory_page_id)?;
        let (slot, bucket_page_id) = self.locate(&dir_guard, key);

        let bucket_guard = PageGuard::fetch(self.pool.as_ref(), bucket_page_id)?;
        let present = {
            let data = bucket_guard.data();
            let bucket = HashBucketPage::<_, K, V>::new(&data[..], self.bucket_capacity);
            bucket.contains(key, value, &self.comparator)
        };
        if !present {
            return Ok(false);
        }

        let empty = {
            let mut data = bucket_guard.data_mut();
            let mut bucket = HashBucketPage::<_, K, V>::new(&mut data[..], self.bucket_capacity);
            bucket.remove(key, value, &self.comparator);
            bucket.is_empty()
        };
        drop(bucket_guard);

        if empty {
            self.merge_slot(&dir_guard, slot)?;
        }
        Ok(true)
    }

    /// Merges the empty bucket behind `slot` into its split image, if both
    /// sit at the same non-zero local depth on distinct pages. Shrinks the
    /// directory afterwards while no bucket needs full depth, then rescans
    /// for buckets the shrink made mergeable.
    fn merge_slot(&self, dir_guard: &PageGuard<'_>, slot: usize) -> Result<()> {
        let (bucket_page_id, image_page_id, ld) = {
            let dir_data = dir_guard.data();
            let dir = HashDirectoryPage::new(&dir_data[..]);
            let ld = dir.local_depth(slot);
            if ld == 0 {
                return Ok(());
            }
            let image = dir.split_image_index(slot);
            let bucket_page_id = dir.bucket_page_id(slot);
            let image_page_id = dir.bucket_page_id(image);
            if dir.local_depth(image) != ld || image_page_id == bucket_page_id {
                return Ok(());
            }
            (bucket_page_id, image_page_id, ld)
        };

        debug!(bucket = %bucket_page_id, into = %image_page_id, "merging empty hash bucket");
        let shrunk = {
            let mut dir_data = dir_guard.data_mut();
            let mut dir = HashDirectoryPage::new(&mut dir_data[..]);
            for s in 0..dir.size() {
                let page_id = dir.bucket_page_id(s);
                if page_id == bucket_page_id || page_id == image_page_id {
                    dir.set_bucket_page_id(s, image_page_id);
                    dir.set_local_depth(s, ld - 1);
                }
            }
            let mut shrunk = false;
            while dir.can_shrink() {
                dir.decr_global_depth();
                shrunk = true;
            }
            shrunk
        };

        // Nothing references the emptied bucket anymore; drop it by its
        // page id.
        self.pool.delete_page(bucket_page_id)?;

        if shrunk {
            let mut s = 0;
            loop {
                let page_id = {
                    let dir_data = dir_guard.data();
                    let dir = HashDirectoryPage::new(&dir_data[..]);
                    if s >= dir.size() {
                        break;
                    }
                    dir.bucket_page_id(s)
                };
                let empty = {
                    let guard = PageGuard::fetch(self.pool.as_ref(), page_id)?;
                    let data = guard.data();
                    // Emptiness only reads the bitmaps, so the pair types
                    // are irrelevant here.
                    HashBucketPage::<_, K, V>::new(&data[..], self.bucket_capacity).is_empty()
                };
                if empty {
                    self.merge_slot(dir_guard, s)?;
                }
                s += 1;
            }
        }
        Ok(())
    }

    /// Current global depth of the directory.
    pub fn global_depth(&self) -> Result<u32> {
        let _read = self.table_latch.read();
        let dir_guard = PageGuard::fetch(self.pool.as_ref(), self.directory_page_id)?;
        let dir_data = dir_guard.data();
        Ok(HashDirectoryPage::new(&dir_data[..]).global_depth())
    }

    /// Local depth of the bucket behind `slot`.
    pub fn local_depth(&self, slot: usize) -> Result<u32> {
        let _read = self.table_latch.read();
        let dir_guard = PageGuard::fetch(self.pool.as_ref(), self.directory_page_id)?;
        let dir_data = dir_guard.data();
        Ok(HashDirectoryPage::new(&dir_data[..]).local_depth(slot))
    }

    /// Asserts the directory invariants. Test support.
    pub fn verify_integrity(&self) -> Result<()> {
        let _read = self.table_latch.read();
        let dir_guard = PageGuard::fetch(self.pool.as_ref(), self.directory_page_id)?;
        let dir_data = dir_guard.data();
        HashDirectoryPage::new(&dir_data[..]).verify_integrity();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{IdentityHasher, OrdComparator};
    use lode_buffer::BufferPoolInstance;
    use lode_common::{LodeError, MemDiskManager, ReplacerKind, Rid};

    type Table = ExtendibleHashTable<i64, Rid, OrdComparator<i64>, IdentityHasher>;

    fn create_table(pool_size: usize, bucket_capacity: usize) -> Table {
        let disk = Arc::new(MemDiskManager::new());
        let pool: Arc<dyn BufferPool> =
            Arc::new(BufferPoolInstance::new(pool_size, disk, ReplacerKind::Lru));
        ExtendibleHashTable::with_bucket_capacity(
            pool,
            OrdComparator::new(),
            IdentityHasher,
            bucket_capacity,
        )
        .unwrap()
    }

    #[test]
    fn test_new_table_is_empty_at_depth_zero() {
        let table = create_table(8, 4);
        let txn = Transaction::new(0);

        assert_eq!(table.global_depth().unwrap(), 0);
        assert!(table.get_value(&txn, &1).unwrap().is_empty());
        assert!(!table.remove(&txn, &1, &Rid::new(1, 0)).unwrap());
    }

    #[test]
    fn test_duplicate_insert_is_status_not_error() {
        let table = create_table(8, 4);
        let txn = Transaction::new(0);

        assert!(table.insert(&txn, &1, &Rid::new(1, 0)).unwrap());
        assert!(!table.insert(&txn, &1, &Rid::new(1, 0)).unwrap());
        assert_eq!(table.get_value(&txn, &1).unwrap(), vec![Rid::new(1, 0)]);
    }

    #[test]
    fn test_directory_exhaustion_is_status_not_error() {
        // Keys 0 and 512 agree on their low nine bits; with single-pair
        // buckets the directory saturates and the insert reports false
        // rather than failing.
        let table = create_table(64, 1);
        let txn = Transaction::new(0);

        assert!(table.insert(&txn, &0, &Rid::new(0, 0)).unwrap());
        assert!(!table.insert(&txn, &512, &Rid::new(512, 0)).unwrap());

        assert_eq!(
            table.global_depth().unwrap() as usize,
            DIRECTORY_ARRAY_SIZE.trailing_zeros() as usize
        );
        table.verify_integrity().unwrap();
    }

    #[test]
    fn test_split_aborts_when_pool_exhausted() {
        // Two frames hold the directory and the lone bucket; the split
        // triggered by the second insert cannot claim a page and must
        // abort with the pool's error.
        let table = create_table(2, 1);
        let txn = Transaction::new(0);

        assert!(table.insert(&txn, &0, &Rid::new(0, 0)).unwrap());
        assert!(matches!(
            table.insert(&txn, &1, &Rid::new(1, 0)),
            Err(LodeError::PoolExhausted)
        ));
    }
}
