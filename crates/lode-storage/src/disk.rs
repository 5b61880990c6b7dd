//! File-backed disk manager.

use lode_common::{DiskManager, PageId, Result, PAGE_SIZE};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Disk manager storing all pages in a single data file.
///
/// Page `n` lives at byte offset `n * PAGE_SIZE`. Allocation extends the
/// file; deallocated ids go to a free set and are reused before the file
/// grows again. The free set is process state: a database reopened from an
/// existing file starts with an empty free set and allocates from the end.
pub struct FileDiskManager {
    inner: Mutex<FileDiskInner>,
    path: PathBuf,
    fsync_enabled: bool,
}

struct FileDiskInner {
    file: File,
    num_pages: i32,
    free: BTreeSet<PageId>,
}

impl FileDiskManager {
    /// Opens or creates the data file at `path`.
    pub fn open(path: impl AsRef<Path>, fsync_enabled: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let file_size = file.metadata()?.len();
        let num_pages = (file_size / PAGE_SIZE as u64) as i32;

        Ok(Self {
            inner: Mutex::new(FileDiskInner {
                file,
                num_pages,
                free: BTreeSet::new(),
            }),
            path,
            fsync_enabled,
        })
    }

    /// Returns the data file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Highest page id the file currently covers, for allocator recovery.
    pub fn high_water(&self) -> PageId {
        PageId(self.inner.lock().num_pages - 1)
    }
}

impl DiskManager for FileDiskManager {
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        let len = buf.len().min(PAGE_SIZE);

        // Pages past the end of the file read as zeroes; they have been
        // allocated but never written.
        if page_id.0 >= inner.num_pages {
            buf[..len].fill(0);
            return Ok(());
        }

        let offset = (page_id.0 as u64) * (PAGE_SIZE as u64);
        inner.file.seek(SeekFrom::Start(offset))?;

        // A page can sit inside the allocated range but past the physical
        // end of file if it was never written; the missing tail is zeroes.
        let mut total = 0;
        while total < len {
            let n = inner.file.read(&mut buf[total..len])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        buf[total..len].fill(0);
        Ok(())
    }

    fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        let len = data.len().min(PAGE_SIZE);

        let offset = (page_id.0 as u64) * (PAGE_SIZE as u64);
        inner.file.seek(SeekFrom::Start(offset))?;
        inner.file.write_all(&data[..len])?;
        if self.fsync_enabled {
            inner.file.sync_all()?;
        }

        if page_id.0 >= inner.num_pages {
            inner.num_pages = page_id.0 + 1;
        }
        Ok(())
    }

    fn allocate_page(&self) -> Result<PageId> {
        let mut inner = self.inner.lock();
        if let Some(&page_id) = inner.free.iter().next() {
            inner.free.remove(&page_id);
            return Ok(page_id);
        }
        let page_id = PageId(inner.num_pages);
        inner.num_pages += 1;
        Ok(page_id)
    }

    fn deallocate_page(&self, page_id: PageId) -> Result<()> {
        let mut inner = self.inner.lock();
        if page_id.is_valid() && page_id.0 < inner.num_pages {
            inner.free.insert(page_id);
        }
        Ok(())
    }

    fn num_allocated_pages(&self) -> u32 {
        let inner = self.inner.lock();
        (inner.num_pages as u32) - (inner.free.len() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create_test_disk() -> (FileDiskManager, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let disk = FileDiskManager::open(dir.path().join("test.db"), false).unwrap();
        (disk, dir)
    }

    #[test]
    fn test_write_read_roundtrip() {
        let (disk, _dir) = create_test_disk();

        let mut data = [0u8; PAGE_SIZE];
        data[0] = 0xAB;
        data[PAGE_SIZE - 1] = 0xEF;
        disk.write_page(PageId(3), &data).unwrap();

        let mut buf = [0u8; PAGE_SIZE];
        disk.read_page(PageId(3), &mut buf).unwrap();
        assert_eq!(buf[0], 0xAB);
        assert_eq!(buf[PAGE_SIZE - 1], 0xEF);
    }

    #[test]
    fn test_read_past_eof_is_zero() {
        let (disk, _dir) = create_test_disk();

        let mut buf = [0xFFu8; PAGE_SIZE];
        disk.read_page(PageId(9), &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_sparse_write_extends_file() {
        let (disk, _dir) = create_test_disk();

        let data = [7u8; PAGE_SIZE];
        disk.write_page(PageId(2), &data).unwrap();
        assert_eq!(disk.high_water(), PageId(2));

        // Page 0 was skipped over; it reads as zeroes.
        let mut buf = [0xFFu8; PAGE_SIZE];
        disk.read_page(PageId(0), &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_read_allocated_but_unwritten_page() {
        let (disk, _dir) = create_test_disk();

        // Allocation advances the page counter without touching the file.
        for _ in 0..3 {
            disk.allocate_page().unwrap();
        }
        let mut buf = [0xFFu8; PAGE_SIZE];
        disk.read_page(PageId(1), &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_allocate_and_reuse() {
        let (disk, _dir) = create_test_disk();

        let a = disk.allocate_page().unwrap();
        let b = disk.allocate_page().unwrap();
        assert_eq!(a, PageId(0));
        assert_eq!(b, PageId(1));

        disk.deallocate_page(a).unwrap();
        disk.deallocate_page(a).unwrap();
        assert_eq!(disk.allocate_page().unwrap(), a);
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let disk = FileDiskManager::open(&path, true).unwrap();
            let mut data = [0u8; PAGE_SIZE];
            data[100] = 0x55;
            disk.write_page(PageId(1), &data).unwrap();
        }

        let disk = FileDiskManager::open(&path, true).unwrap();
        assert_eq!(disk.high_water(), PageId(1));

        let mut buf = [0u8; PAGE_SIZE];
        disk.read_page(PageId(1), &mut buf).unwrap();
        assert_eq!(buf[100], 0x55);
    }
}
