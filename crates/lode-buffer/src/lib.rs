//! Buffer pool management for LodeDB.
//!
//! This crate provides in-memory page caching with:
//! - Fixed-size pool instances with pin counting and dirty tracking
//! - LRU and Clock victim-selection policies
//! - A parallel pool sharding page ids across instances
//! - RAII page guards pairing every pin with its unpin

mod frame;
mod guard;
mod parallel;
mod pool;
mod replacer;

pub use frame::{Frame, FrameId};
pub use guard::PageGuard;
pub use parallel::ParallelBufferPool;
pub use pool::{BufferPool, BufferPoolConfig, BufferPoolInstance};
pub use replacer::{build_replacer, ClockReplacer, LruReplacer, Replacer};
