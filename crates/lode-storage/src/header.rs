//! Header page: the name-to-root registry for indexes.
//!
//! Page 0 is reserved. It maps index names to their root page ids so an
//! index can find its root again after the process restarts.

use lode_buffer::{BufferPool, PageGuard};
use lode_common::{LodeError, PageId, Result, PAGE_SIZE};

/// Reserved page id of the header page.
pub const HEADER_PAGE_ID: PageId = PageId(0);

/// Maximum stored name length in bytes.
pub const MAX_NAME_LEN: usize = 32;

const COUNT_OFFSET: usize = 0;
const RECORDS_OFFSET: usize = 4;
const RECORD_SIZE: usize = MAX_NAME_LEN + 4;

/// Number of records the header page can hold.
pub const HEADER_CAPACITY: usize = (PAGE_SIZE - RECORDS_OFFSET) / RECORD_SIZE;

/// Typed view over the header page bytes.
pub struct HeaderPage<D> {
    data: D,
}

impl<D: AsRef<[u8]>> HeaderPage<D> {
    /// Wraps header page bytes.
    pub fn new(data: D) -> Self {
        Self { data }
    }

    /// Number of registered indexes.
    pub fn record_count(&self) -> usize {
        let data = self.data.as_ref();
        u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize
    }

    fn record_name(&self, index: usize) -> &[u8] {
        let off = RECORDS_OFFSET + index * RECORD_SIZE;
        &self.data.as_ref()[off..off + MAX_NAME_LEN]
    }

    fn find(&self, name: &[u8; MAX_NAME_LEN]) -> Option<usize> {
        (0..self.record_count()).find(|&i| self.record_name(i) == name)
    }

    /// Looks up the root page id registered under `name`.
    pub fn get_root(&self, name: &str) -> Option<PageId> {
        let padded = pad_name(name).ok()?;
        let index = self.find(&padded)?;
        let off = RECORDS_OFFSET + index * RECORD_SIZE + MAX_NAME_LEN;
        let data = self.data.as_ref();
        Some(PageId(i32::from_le_bytes([
            data[off],
            data[off + 1],
            data[off + 2],
            data[off + 3],
        ])))
    }
}

impl<D: AsRef<[u8]> + AsMut<[u8]>> HeaderPage<D> {
    fn set_record_count(&mut self, count: usize) {
        self.data.as_mut()[COUNT_OFFSET..COUNT_OFFSET + 4]
            .copy_from_slice(&(count as u32).to_le_bytes());
    }

    fn write_record(&mut self, index: usize, name: &[u8; MAX_NAME_LEN], root: PageId) {
        let off = RECORDS_OFFSET + index * RECORD_SIZE;
        let data = self.data.as_mut();
        data[off..off + MAX_NAME_LEN].copy_from_slice(name);
        data[off + MAX_NAME_LEN..off + RECORD_SIZE].copy_from_slice(&root.0.to_le_bytes());
    }

    /// Registers a new index. Returns false if the name is already taken.
    pub fn insert_record(&mut self, name: &str, root: PageId) -> Result<bool> {
        let padded = pad_name(name)?;
        if self.find(&padded).is_some() {
            return Ok(false);
        }
        let count = self.record_count();
        if count == HEADER_CAPACITY {
            return Err(LodeError::HeaderFull);
        }
        self.write_record(count, &padded, root);
        self.set_record_count(count + 1);
        Ok(true)
    }

    /// Rewrites the root of an existing index. Returns false if absent.
    pub fn update_record(&mut self, name: &str, root: PageId) -> Result<bool> {
        let padded = pad_name(name)?;
        match self.find(&padded) {
            Some(index) => {
                self.write_record(index, &padded, root);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

fn pad_name(name: &str) -> Result<[u8; MAX_NAME_LEN]> {
    let bytes = name.as_bytes();
    if bytes.len() > MAX_NAME_LEN {
        return Err(LodeError::IndexNameTooLong(name.to_string()));
    }
    let mut padded = [0u8; MAX_NAME_LEN];
    padded[..bytes.len()].copy_from_slice(bytes);
    Ok(padded)
}

/// Allocates and zeroes the header page on a fresh database.
///
/// Must be the first allocation against the pool so the page lands on the
/// reserved id.
pub fn create_header_page(pool: &dyn BufferPool) -> Result<PageId> {
    let guard = PageGuard::create(pool)?;
    let page_id = guard.page_id();
    debug_assert_eq!(page_id, HEADER_PAGE_ID, "header page must be page 0");
    // A fresh page is zeroed, which is a valid empty header; touching the
    // bytes pins the dirty flag so the page reaches disk.
    guard.data_mut()[COUNT_OFFSET] = 0;
    Ok(page_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_header() {
        let data = [0u8; PAGE_SIZE];
        let header = HeaderPage::new(&data[..]);
        assert_eq!(header.record_count(), 0);
        assert_eq!(header.get_root("missing"), None);
    }

    #[test]
    fn test_insert_and_get() {
        let mut data = [0u8; PAGE_SIZE];
        let mut header = HeaderPage::new(&mut data[..]);

        assert!(header.insert_record("orders_pk", PageId(7)).unwrap());
        assert!(header.insert_record("users_pk", PageId(9)).unwrap());
        assert_eq!(header.record_count(), 2);

        assert_eq!(header.get_root("orders_pk"), Some(PageId(7)));
        assert_eq!(header.get_root("users_pk"), Some(PageId(9)));
        assert_eq!(header.get_root("other"), None);
    }

    #[test]
    fn test_insert_duplicate_rejected() {
        let mut data = [0u8; PAGE_SIZE];
        let mut header = HeaderPage::new(&mut data[..]);

        assert!(header.insert_record("idx", PageId(1)).unwrap());
        assert!(!header.insert_record("idx", PageId(2)).unwrap());
        assert_eq!(header.get_root("idx"), Some(PageId(1)));
    }

    #[test]
    fn test_update_record() {
        let mut data = [0u8; PAGE_SIZE];
        let mut header = HeaderPage::new(&mut data[..]);

        header.insert_record("idx", PageId(1)).unwrap();
        assert!(header.update_record("idx", PageId::INVALID).unwrap());
        assert_eq!(header.get_root("idx"), Some(PageId::INVALID));

        assert!(!header.update_record("missing", PageId(3)).unwrap());
    }

    #[test]
    fn test_name_too_long() {
        let mut data = [0u8; PAGE_SIZE];
        let mut header = HeaderPage::new(&mut data[..]);

        let long = "x".repeat(MAX_NAME_LEN + 1);
        assert!(matches!(
            header.insert_record(&long, PageId(1)),
            Err(LodeError::IndexNameTooLong(_))
        ));
    }

    #[test]
    fn test_capacity_limit() {
        let mut data = [0u8; PAGE_SIZE];
        let mut header = HeaderPage::new(&mut data[..]);

        for i in 0..HEADER_CAPACITY {
            assert!(header.insert_record(&format!("idx_{i}"), PageId(i as i32)).unwrap());
        }
        assert!(matches!(
            header.insert_record("one_more", PageId(0)),
            Err(LodeError::HeaderFull)
        ));
    }
}
