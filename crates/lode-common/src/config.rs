//! Configuration structures for LodeDB.

use crate::page::PAGE_SIZE;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Victim-selection policy used by each buffer pool instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReplacerKind {
    /// Least-recently-unpinned eviction.
    #[default]
    Lru,
    /// Clock (second-chance) eviction.
    Clock,
}

/// Storage configuration for the database engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for data files.
    pub data_dir: PathBuf,
    /// Frames per buffer pool instance.
    pub pool_size: usize,
    /// Number of buffer pool instances (page ids are sharded across them).
    pub pool_instances: usize,
    /// Victim-selection policy.
    pub replacer: ReplacerKind,
    /// Enable fsync for durability.
    pub fsync_enabled: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            pool_size: 1024,
            pool_instances: 4,
            replacer: ReplacerKind::Lru,
            fsync_enabled: true,
        }
    }
}

impl StorageConfig {
    /// Returns the total buffer pool size in bytes across all instances.
    pub fn buffer_pool_bytes(&self) -> usize {
        self.pool_size * self.pool_instances * PAGE_SIZE
    }
}
