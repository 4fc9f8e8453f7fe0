//! Buffer pool management for ArborDB.
//!
//! This crate provides page-level disk I/O and in-memory page caching:
//! - Synchronous disk manager with page allocation
//! - Fixed-size buffer pool with configurable frame count
//! - Second-chance victim selection for cache management
//! - Pin counting with scoped guards for safe page access
//! - Dirty page tracking for write-back

mod disk;
mod eviction;
mod frame;
mod pool;

pub use disk::{DiskManager, DiskManagerConfig};
pub use eviction::{EvictionPolicy, SecondChancePolicy};
pub use frame::{BufferFrame, FrameId};
pub use pool::{BufferPool, BufferPoolConfig, BufferPoolStats, PageGuard};
