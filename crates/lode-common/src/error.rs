//! Error types for LodeDB.

use crate::page::PageId;
use thiserror::Error;

/// Result type alias using LodeError.
pub type Result<T> = std::result::Result<T, LodeError>;

/// Errors that can occur in LodeDB storage operations.
#[derive(Debug, Error)]
pub enum LodeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("buffer pool exhausted, all frames pinned")]
    PoolExhausted,

    #[error("page corrupted: {page_id}, reason: {reason}")]
    Corrupted { page_id: PageId, reason: String },

    #[error("index name too long: {0}")]
    IndexNameTooLong(String),

    #[error("header page full, cannot register another index")]
    HeaderFull,
}
