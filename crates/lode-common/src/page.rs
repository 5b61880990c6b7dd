//! Page identifiers and sizing for LodeDB storage.

use serde::{Deserialize, Serialize};

/// Size of a disk page in bytes (4 KB).
pub const PAGE_SIZE: usize = 4096;

/// Unique identifier for an on-disk page.
///
/// Page ids are signed 32-bit values; `PageId::INVALID` (-1) marks an
/// unassigned page. In a sharded buffer pool, `id % num_instances`
/// determines the owning pool instance.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PageId(pub i32);

impl PageId {
    /// Sentinel for "no page".
    pub const INVALID: PageId = PageId(-1);

    /// Returns true if this id refers to a real page.
    pub fn is_valid(&self) -> bool {
        self.0 >= 0
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "page:{}", self.0)
    }
}

/// Record identifier: the page a record lives on plus its slot within
/// that page. The canonical value type stored in index leaves and buckets.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Rid {
    /// Page holding the record.
    pub page_id: i32,
    /// Slot within the page.
    pub slot: u16,
}

impl Rid {
    /// Creates a new record id.
    pub fn new(page_id: i32, slot: u16) -> Self {
        Self { page_id, slot }
    }
}

impl std::fmt::Display for Rid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.page_id, self.slot)
    }
}
