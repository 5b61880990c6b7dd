//! Parallel buffer pool: shards page ids across several pool instances.

use crate::frame::Frame;
use crate::pool::{BufferPool, BufferPoolConfig, BufferPoolInstance};
use lode_common::page::PAGE_SIZE;
use lode_common::{DiskManager, LodeError, PageId, ReplacerKind, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use sysinfo::System;

/// Buffer pool made of `N` independent instances.
///
/// Instance `i` owns every page id congruent to `i` mod `N`, so per-page
/// operations touch exactly one instance's mutex and uncorrelated workloads
/// do not contend. Allocation round-robins across instances.
pub struct ParallelBufferPool {
    instances: Vec<BufferPoolInstance>,
    /// Instance to try first on the next allocation.
    next_index: Mutex<usize>,
}

impl ParallelBufferPool {
    /// Creates a parallel pool of `num_instances` shards with `pool_size`
    /// frames each.
    ///
    /// # Panics
    /// Panics if `num_instances` or `pool_size` is zero.
    pub fn new(
        num_instances: usize,
        pool_size: usize,
        disk: Arc<dyn DiskManager>,
        replacer: ReplacerKind,
    ) -> Self {
        assert!(num_instances > 0, "num_instances must be > 0");
        let instances = (0..num_instances)
            .map(|i| {
                BufferPoolInstance::new_sharded(
                    pool_size,
                    num_instances as u32,
                    i as u32,
                    disk.clone(),
                    replacer,
                )
            })
            .collect();

        Self {
            instances,
            next_index: Mutex::new(0),
        }
    }

    /// Creates a parallel pool from a [`BufferPoolConfig`].
    pub fn from_config(config: &BufferPoolConfig, disk: Arc<dyn DiskManager>) -> Self {
        Self::new(config.num_instances, config.pool_size, disk, config.replacer)
    }

    /// Creates a parallel pool sized to 25% of available system RAM,
    /// with a floor of 1,000 frames total.
    pub fn auto_sized(
        num_instances: usize,
        disk: Arc<dyn DiskManager>,
        replacer: ReplacerKind,
    ) -> Self {
        let mut sys = System::new_all();
        sys.refresh_memory();

        let available_bytes = sys.available_memory() as usize;
        let total_frames = ((available_bytes / 4) / PAGE_SIZE).max(1_000);
        let pool_size = (total_frames / num_instances).max(1);

        Self::new(num_instances, pool_size, disk, replacer)
    }

    /// Returns the total number of frames across all instances.
    pub fn pool_size(&self) -> usize {
        self.instances.iter().map(|i| i.pool_size()).sum()
    }

    /// Returns the number of instances.
    pub fn num_instances(&self) -> usize {
        self.instances.len()
    }

    /// Returns the instance owning `page_id`.
    pub fn instance_for(&self, page_id: PageId) -> &BufferPoolInstance {
        let n = self.instances.len();
        &self.instances[page_id.0.rem_euclid(n as i32) as usize]
    }

    /// Returns instance `index`.
    pub fn instance(&self, index: usize) -> &BufferPoolInstance {
        &self.instances[index]
    }

    /// Rebases every instance's page id allocator past `high_water`.
    pub fn recover_allocator(&self, high_water: PageId) {
        for instance in &self.instances {
            instance.recover_allocator(high_water);
        }
    }

    /// Allocates a page round-robin: starting at the cursor, each instance
    /// is tried until one has a usable frame. On success the cursor moves
    /// past the satisfying instance, so the next call starts elsewhere.
    pub fn new_page(&self) -> Result<(PageId, &Frame)> {
        let mut next_index = self.next_index.lock();
        let n = self.instances.len();
        for i in 0..n {
            let idx = (*next_index + i) % n;
            match self.instances[idx].new_page() {
                Ok(page) => {
                    *next_index = (idx + 1) % n;
                    return Ok(page);
                }
                Err(LodeError::PoolExhausted) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(LodeError::PoolExhausted)
    }

    /// Fetches a page from its owning instance.
    pub fn fetch_page(&self, page_id: PageId) -> Result<&Frame> {
        self.instance_for(page_id).fetch_page(page_id)
    }

    /// Unpins a page at its owning instance.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        self.instance_for(page_id).unpin_page(page_id, is_dirty)
    }

    /// Flushes a page at its owning instance.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if !page_id.is_valid() {
            return Ok(false);
        }
        self.instance_for(page_id).flush_page(page_id)
    }

    /// Deletes a page at its owning instance.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        self.instance_for(page_id).delete_page(page_id)
    }

    /// Flushes every instance.
    pub fn flush_all_pages(&self) -> Result<()> {
        for instance in &self.instances {
            instance.flush_all_pages()?;
        }
        Ok(())
    }
}

impl BufferPool for ParallelBufferPool {
    fn new_page(&self) -> Result<(PageId, &Frame)> {
        ParallelBufferPool::new_page(self)
    }

    fn fetch_page(&self, page_id: PageId) -> Result<&Frame> {
        ParallelBufferPool::fetch_page(self, page_id)
    }

    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        ParallelBufferPool::unpin_page(self, page_id, is_dirty)
    }

    fn flush_page(&self, page_id: PageId) -> Result<bool> {
        ParallelBufferPool::flush_page(self, page_id)
    }

    fn delete_page(&self, page_id: PageId) -> Result<bool> {
        ParallelBufferPool::delete_page(self, page_id)
    }

    fn flush_all_pages(&self) -> Result<()> {
        ParallelBufferPool::flush_all_pages(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lode_common::MemDiskManager;

    fn create_test_pool(num_instances: usize, pool_size: usize) -> (ParallelBufferPool, Arc<MemDiskManager>) {
        let disk = Arc::new(MemDiskManager::new());
        let pool = ParallelBufferPool::new(num_instances, pool_size, disk.clone(), ReplacerKind::Lru);
        (pool, disk)
    }

    #[test]
    fn test_total_pool_size() {
        let (pool, _disk) = create_test_pool(5, 2);
        assert_eq!(pool.pool_size(), 10);
        assert_eq!(pool.num_instances(), 5);
    }

    #[test]
    fn test_from_config() {
        let disk = Arc::new(MemDiskManager::new());
        let config = BufferPoolConfig {
            pool_size: 3,
            num_instances: 2,
            replacer: ReplacerKind::Clock,
        };
        let pool = ParallelBufferPool::from_config(&config, disk);
        assert_eq!(pool.pool_size(), 6);
        assert_eq!(pool.num_instances(), 2);
    }

    #[test]
    fn test_round_robin_allocation() {
        let (pool, _disk) = create_test_pool(5, 2);

        // Ten allocations starting at instance 0 visit the shards in
        // round-robin order.
        let mut mods = Vec::new();
        for _ in 0..10 {
            let (pid, _) = pool.new_page().unwrap();
            mods.push(pid.0 % 5);
            pool.unpin_page(pid, false);
        }
        assert_eq!(mods, vec![0, 1, 2, 3, 4, 0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_allocation_skips_full_instance() {
        let (pool, _disk) = create_test_pool(2, 1);

        // Pin instance 0's only frame.
        let (p0, _) = pool.new_page().unwrap();
        assert_eq!(p0.0 % 2, 0);

        // Cursor points at instance 1; both allocations below must land
        // there, evicting its prior page once it is unpinned.
        let (p1, _) = pool.new_page().unwrap();
        assert_eq!(p1.0 % 2, 1);
        pool.unpin_page(p1, false);

        let (p2, _) = pool.new_page().unwrap();
        assert_eq!(p2.0 % 2, 1);
        pool.unpin_page(p2, false);
    }

    #[test]
    fn test_all_instances_full() {
        let (pool, _disk) = create_test_pool(3, 1);

        for _ in 0..3 {
            pool.new_page().unwrap();
        }
        assert!(matches!(pool.new_page(), Err(LodeError::PoolExhausted)));
    }

    #[test]
    fn test_operations_dispatch_to_owner() {
        let (pool, _disk) = create_test_pool(3, 2);

        let (pid, frame) = pool.new_page().unwrap();
        frame.write_data()[0] = 0x77;
        pool.unpin_page(pid, true);

        let owner = pool.instance_for(pid);
        assert!(owner.contains(pid));
        assert_eq!(owner.instance_index() as i32, pid.0 % 3);

        let frame = pool.fetch_page(pid).unwrap();
        assert_eq!(frame.read_data()[0], 0x77);
        pool.unpin_page(pid, false);

        assert!(pool.delete_page(pid).unwrap());
        assert!(!owner.contains(pid));
    }

    #[test]
    fn test_flush_all_fans_out() {
        let (pool, disk) = create_test_pool(4, 2);

        for _ in 0..8 {
            let (pid, _) = pool.new_page().unwrap();
            pool.unpin_page(pid, true);
        }
        pool.flush_all_pages().unwrap();
        assert_eq!(disk.write_count(), 8);
    }

    #[test]
    fn test_concurrent_allocation_distinct_ids() {
        use std::collections::HashSet;
        use std::thread;

        let disk = Arc::new(MemDiskManager::new());
        let pool = Arc::new(ParallelBufferPool::new(4, 8, disk, ReplacerKind::Lru));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let pool = Arc::clone(&pool);
            handles.push(thread::spawn(move || {
                let mut ids = Vec::new();
                for _ in 0..6 {
                    let (pid, _) = pool.new_page().unwrap();
                    pool.unpin_page(pid, false);
                    ids.push(pid);
                }
                ids
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for pid in handle.join().unwrap() {
                assert!(seen.insert(pid), "duplicate page id {pid}");
            }
        }
        assert_eq!(seen.len(), 24);
    }
}
