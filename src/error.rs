//! Error types for the storage engine.

use crate::types::PageId;
use thiserror::Error;

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur in the storage engine
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O error from the underlying file system
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Requested page id is not materialized in the heap file
    #[error("Page {0} not found")]
    PageNotFound(PageId),

    /// Slot id is past the end of the page's slot directory
    #[error("Slot {slot_id} out of range (count: {count})")]
    SlotOutOfRange { slot_id: u16, count: u16 },

    /// Record exceeds the maximum size a slot can describe
    #[error("Record too large: {size} bytes (max: {max})")]
    RecordTooLarge { size: usize, max: usize },

    /// Page does not have enough free space for the record
    #[error("Not enough free space on page, need {needed} bytes but only {available} available")]
    PageFull { needed: usize, available: usize },

    /// Buffer pool has no available frames: every frame is pinned
    #[error("Buffer pool exhausted: all frames are pinned")]
    PoolExhausted,

    /// Page is not resident in the buffer pool
    #[error("Page {0} is not in the buffer pool")]
    PageNotResident(PageId),

    /// Unpin was called on a page whose pin count is already zero
    #[error("Unpinning page {0} with pin count 0")]
    PageNotPinned(PageId),

    /// Data corruption detected (e.g., slot metadata pointing outside the page)
    #[error("Corruption detected: {0}")]
    Corruption(String),

    /// Database file is not in a usable state
    #[error("Invalid database file: {0}")]
    InvalidDatabaseFile(String),

    /// Operation is declared in the surface but not implemented
    #[error("Unimplemented: {0}")]
    Unimplemented(&'static str),
}

impl StorageError {
    /// Create a corruption error with a message
    pub fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }

    /// Create an invalid database file error
    pub fn invalid_db(msg: impl Into<String>) -> Self {
        Self::InvalidDatabaseFile(msg.into())
    }
}
