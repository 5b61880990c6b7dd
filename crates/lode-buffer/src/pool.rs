//! Buffer pool instance: maps page ids to frames, pins, evicts, flushes.

use crate::frame::{Frame, FrameId};
use crate::replacer::{build_replacer, Replacer};
use lode_common::{DiskManager, LodeError, PageId, ReplacerKind, Result, StorageConfig};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Configuration for a buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolConfig {
    /// Frames per pool instance.
    pub pool_size: usize,
    /// Number of sharded instances.
    pub num_instances: usize,
    /// Victim-selection policy.
    pub replacer: ReplacerKind,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 1024,
            num_instances: 4,
            replacer: ReplacerKind::Lru,
        }
    }
}

impl From<&StorageConfig> for BufferPoolConfig {
    fn from(config: &StorageConfig) -> Self {
        Self {
            pool_size: config.pool_size,
            num_instances: config.pool_instances,
            replacer: config.replacer,
        }
    }
}

/// Capability shared by [`BufferPoolInstance`] and
/// [`ParallelBufferPool`](crate::ParallelBufferPool), so index structures
/// can run over either.
pub trait BufferPool: Send + Sync {
    /// Allocates a fresh page, pinned and zeroed.
    fn new_page(&self) -> Result<(PageId, &Frame)>;

    /// Fetches a page, reading it from disk if it is not resident. Pinned.
    fn fetch_page(&self, page_id: PageId) -> Result<&Frame>;

    /// Drops one pin, ORing in the dirty flag. Returns false if the page is
    /// not resident or was not pinned.
    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool;

    /// Writes the page out if dirty, regardless of pin count. Returns false
    /// for invalid or non-resident ids.
    fn flush_page(&self, page_id: PageId) -> Result<bool>;

    /// Drops a page from the pool and deallocates it on disk. Returns false
    /// if the page is pinned; deleting a non-resident page succeeds.
    fn delete_page(&self, page_id: PageId) -> Result<bool>;

    /// Writes out every dirty resident page.
    fn flush_all_pages(&self) -> Result<()>;
}

/// One shard of the buffer pool.
///
/// Owns a fixed array of frames, the page table mapping resident page ids
/// to frames, a free list, and a victim-selection policy. Page ids are
/// allocated sharded: instance `i` of `n` hands out ids congruent to
/// `i` mod `n`.
///
/// All operations serialize on a single interior mutex held for their full
/// extent; frame metadata is atomic and page data sits behind each frame's
/// own read-write latch.
pub struct BufferPoolInstance {
    pool_size: usize,
    num_instances: u32,
    instance_index: u32,
    frames: Vec<Frame>,
    state: Mutex<PoolState>,
    replacer: Box<dyn Replacer>,
    next_page_id: AtomicI32,
    disk: Arc<dyn DiskManager>,
}

struct PoolState {
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
}

impl BufferPoolInstance {
    /// Creates a stand-alone (unsharded) buffer pool instance.
    pub fn new(pool_size: usize, disk: Arc<dyn DiskManager>, replacer: ReplacerKind) -> Self {
        Self::new_sharded(pool_size, 1, 0, disk, replacer)
    }

    /// Creates one instance of a sharded pool.
    ///
    /// # Panics
    /// Panics if `pool_size` or `num_instances` is zero, or if
    /// `instance_index >= num_instances`.
    pub fn new_sharded(
        pool_size: usize,
        num_instances: u32,
        instance_index: u32,
        disk: Arc<dyn DiskManager>,
        replacer: ReplacerKind,
    ) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");
        assert!(num_instances > 0, "num_instances must be > 0");
        assert!(
            instance_index < num_instances,
            "instance_index out of range"
        );

        let frames: Vec<_> = (0..pool_size).map(|i| Frame::new(FrameId(i as u32))).collect();
        let free_list: VecDeque<_> = (0..pool_size).map(|i| FrameId(i as u32)).collect();

        Self {
            pool_size,
            num_instances,
            instance_index,
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::with_capacity(pool_size),
                free_list,
            }),
            replacer: build_replacer(replacer, pool_size),
            next_page_id: AtomicI32::new(instance_index as i32),
            disk,
        }
    }

    /// Returns the number of frames in this instance.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Returns this instance's shard index.
    pub fn instance_index(&self) -> u32 {
        self.instance_index
    }

    /// Returns the number of never-assigned or freed frames.
    pub fn free_count(&self) -> usize {
        self.state.lock().free_list.len()
    }

    /// Returns the number of resident pages.
    pub fn page_count(&self) -> usize {
        self.state.lock().page_table.len()
    }

    /// Returns the number of evictable (resident, unpinned) frames.
    pub fn evictable_count(&self) -> usize {
        self.replacer.size()
    }

    /// Checks whether a page is resident.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.state.lock().page_table.contains_key(&page_id)
    }

    /// Hands out the next sharded page id.
    fn allocate_page(&self) -> PageId {
        let id = self
            .next_page_id
            .fetch_add(self.num_instances as i32, Ordering::AcqRel);
        debug_assert_eq!(
            id as u32 % self.num_instances,
            self.instance_index,
            "allocated page id must shard back to this instance"
        );
        PageId(id)
    }

    /// Rebases the page id allocator past `high_water`.
    ///
    /// The allocator is process state, not disk state; after reopening an
    /// existing database it must be moved beyond every allocated id before
    /// this instance hands out new ones.
    pub fn recover_allocator(&self, high_water: PageId) {
        let base = high_water.0 + 1;
        let n = self.num_instances as i32;
        let offset = (self.instance_index as i32 - base % n).rem_euclid(n);
        self.next_page_id.fetch_max(base + offset, Ordering::AcqRel);
    }

    /// Obtains a usable frame: from the free list, else by evicting a
    /// victim (writing it back first if dirty). The old page-table entry of
    /// an evicted frame is removed here.
    fn available_frame(&self, state: &mut PoolState) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = self.replacer.victim().ok_or(LodeError::PoolExhausted)?;
        let frame = &self.frames[frame_id.0 as usize];
        let old_page_id = frame.page_id();

        if frame.is_dirty() && old_page_id.is_valid() {
            debug!(%old_page_id, %frame_id, "writing back dirty page before eviction");
            let data = frame.read_data();
            if let Err(e) = self.disk.write_page(old_page_id, &data[..]) {
                // Keep the frame evictable; the pool state is unchanged.
                drop(data);
                self.replacer.unpin(frame_id);
                return Err(e);
            }
            frame.set_dirty(false);
        }

        if old_page_id.is_valid() {
            state.page_table.remove(&old_page_id);
        }
        Ok(frame_id)
    }

    /// Allocates a fresh page, pinned and zeroed.
    ///
    /// Returns [`LodeError::PoolExhausted`] when every frame is pinned.
    pub fn new_page(&self) -> Result<(PageId, &Frame)> {
        let mut state = self.state.lock();
        let frame_id = self.available_frame(&mut state)?;
        let frame = &self.frames[frame_id.0 as usize];

        let page_id = self.allocate_page();
        frame.reset();
        frame.set_page_id(page_id);
        frame.pin();
        state.page_table.insert(page_id, frame_id);
        self.replacer.pin(frame_id);

        Ok((page_id, frame))
    }

    /// Fetches a page, pinning it. Resident pages are returned directly;
    /// otherwise a frame is claimed and the page is read from disk.
    pub fn fetch_page(&self, page_id: PageId) -> Result<&Frame> {
        debug_assert!(page_id.is_valid(), "fetch of invalid page id");
        let mut state = self.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frame = &self.frames[frame_id.0 as usize];
            frame.pin();
            self.replacer.pin(frame_id);
            return Ok(frame);
        }

        let frame_id = self.available_frame(&mut state)?;
        let frame = &self.frames[frame_id.0 as usize];

        frame.reset();
        frame.set_page_id(page_id);
        frame.pin();
        state.page_table.insert(page_id, frame_id);
        self.replacer.pin(frame_id);

        let mut data = frame.write_data();
        if let Err(e) = self.disk.read_page(page_id, &mut data[..]) {
            drop(data);
            state.page_table.remove(&page_id);
            frame.reset();
            state.free_list.push_back(frame_id);
            return Err(e);
        }

        drop(data);
        Ok(frame)
    }

    /// Drops one pin from a page, ORing in the caller's dirty flag. Once a
    /// page is dirty it stays dirty until flushed; a clean unpin never
    /// clears the flag.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id.0 as usize];
        if frame.pin_count() == 0 {
            return false;
        }

        if is_dirty {
            frame.set_dirty(true);
        }
        if frame.unpin() == 0 {
            self.replacer.unpin(frame_id);
        }
        true
    }

    /// Writes a page out if it is dirty and clears the dirty flag.
    ///
    /// Flushes regardless of pin count: the in-memory bytes are
    /// authoritative while resident, and the pool mutex keeps the write
    /// consistent. Returns false for invalid or non-resident ids.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if !page_id.is_valid() {
            return Ok(false);
        }
        let state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Ok(false);
        };
        let frame = &self.frames[frame_id.0 as usize];
        if frame.is_dirty() {
            let data = frame.read_data();
            self.disk.write_page(page_id, &data[..])?;
            drop(data);
            frame.set_dirty(false);
        }
        Ok(true)
    }

    /// Writes out every dirty resident page.
    pub fn flush_all_pages(&self) -> Result<()> {
        let state = self.state.lock();
        for (&page_id, &frame_id) in state.page_table.iter() {
            let frame = &self.frames[frame_id.0 as usize];
            if frame.is_dirty() {
                let data = frame.read_data();
                self.disk.write_page(page_id, &data[..])?;
                drop(data);
                frame.set_dirty(false);
            }
        }
        Ok(())
    }

    /// Drops a page from the pool and deallocates it on disk.
    ///
    /// Deleting a non-resident page still deallocates it (the page may live
    /// on disk without being cached) and returns true. Returns false if the
    /// page is pinned.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            self.disk.deallocate_page(page_id)?;
            return Ok(true);
        };

        let frame = &self.frames[frame_id.0 as usize];
        if frame.is_pinned() {
            return Ok(false);
        }

        if frame.is_dirty() {
            let data = frame.read_data();
            self.disk.write_page(page_id, &data[..])?;
            drop(data);
            frame.set_dirty(false);
        }
        self.disk.deallocate_page(page_id)?;

        debug!(%page_id, %frame_id, "deleting page from pool");
        state.page_table.remove(&page_id);
        self.replacer.pin(frame_id);
        frame.reset();
        state.free_list.push_back(frame_id);
        Ok(true)
    }
}

impl BufferPool for BufferPoolInstance {
    fn new_page(&self) -> Result<(PageId, &Frame)> {
        BufferPoolInstance::new_page(self)
    }

    fn fetch_page(&self, page_id: PageId) -> Result<&Frame> {
        BufferPoolInstance::fetch_page(self, page_id)
    }

    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        BufferPoolInstance::unpin_page(self, page_id, is_dirty)
    }

    fn flush_page(&self, page_id: PageId) -> Result<bool> {
        BufferPoolInstance::flush_page(self, page_id)
    }

    fn delete_page(&self, page_id: PageId) -> Result<bool> {
        BufferPoolInstance::delete_page(self, page_id)
    }

    fn flush_all_pages(&self) -> Result<()> {
        BufferPoolInstance::flush_all_pages(self)
    }
}
