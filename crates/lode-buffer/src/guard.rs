//! RAII page access.
//!
//! Every successful fetch or allocation must be paired with exactly one
//! unpin carrying the right dirty flag; [`PageGuard`] makes that pairing
//! structural. The guard holds the pin, tracks dirtiness, and unpins on
//! drop along every exit path.

use crate::frame::Frame;
use crate::pool::BufferPool;
use lode_common::page::PAGE_SIZE;
use lode_common::{PageId, Result};
use std::cell::Cell;

/// Scoped pin on a buffer pool page.
///
/// Reading goes through [`data`](Self::data); writing through
/// [`data_mut`](Self::data_mut), which also marks the page dirty. On drop
/// the page is unpinned with the accumulated dirty flag.
pub struct PageGuard<'a> {
    pool: &'a dyn BufferPool,
    page_id: PageId,
    frame: &'a Frame,
    dirty: Cell<bool>,
}

impl<'a> PageGuard<'a> {
    /// Fetches and pins an existing page.
    pub fn fetch(pool: &'a dyn BufferPool, page_id: PageId) -> Result<Self> {
        let frame = pool.fetch_page(page_id)?;
        Ok(Self {
            pool,
            page_id,
            frame,
            dirty: Cell::new(false),
        })
    }

    /// Allocates and pins a fresh page.
    ///
    /// Created pages start dirty: the caller is about to initialize them,
    /// and an all-zero page must still reach disk.
    pub fn create(pool: &'a dyn BufferPool) -> Result<Self> {
        let (page_id, frame) = pool.new_page()?;
        Ok(Self {
            pool,
            page_id,
            frame,
            dirty: Cell::new(true),
        })
    }

    /// Returns the pinned page's id.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Shared access to the page bytes.
    pub fn data(&self) -> parking_lot::RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.frame.read_data()
    }

    /// Exclusive access to the page bytes; marks the page dirty.
    pub fn data_mut(&self) -> parking_lot::RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.dirty.set(true);
        self.frame.write_data()
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        self.pool.unpin_page(self.page_id, self.dirty.get());
    }
}
