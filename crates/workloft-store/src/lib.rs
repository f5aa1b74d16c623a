//! Two-tier local key/value cache for the Workloft SDK
//!
//! A [`LocalStore`] pairs a byte-budgeted LRU memory tier with a
//! file-per-key disk tier. `open` returns immediately while
//! initialization runs on the store's own single-worker queue; every
//! operation returns a [`StoreTask`] with the same listener contract as
//! the client's request tasks.
//!
//! ## Features
//!
//! - **Write-through**: `set` updates memory immediately and persists to
//!   disk under the disk-readiness lock
//! - **Memory-first reads**: disk fallback backfills the memory tier
//! - **Independent tier lifecycles**: `free` drops memory only, `erase`
//!   wipes both tiers and the on-disk directory

pub mod disk;
pub mod error;
pub mod memory;
pub mod store;

pub use disk::DiskStore;
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use store::{LocalStore, StoreTask};

/// Re-export commonly used types
pub use workloft_runtime::{ListenerId, TaskState};
