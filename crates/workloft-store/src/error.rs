//! Store error types

use thiserror::Error;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by [`crate::LocalStore`] tasks
#[derive(Debug, Error)]
pub enum StoreError {
    /// Both cache tiers are gone; the handle was erased.
    #[error("store is closed: both cache tiers are gone")]
    Closed,

    /// The memory tier was already released by an earlier `free`.
    #[error("memory store already released")]
    MemoryGone,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),
}
