//! # Paged Storage Engine
//!
//! A minimal disk-backed paged storage engine: fixed-size pages in a
//! single heap file, a bounded in-memory cache with pin-counted
//! reference semantics, and a slotted layout for packing variable-length
//! records into a page.
//!
//! ## Architecture
//!
//! The engine is composed of three layers:
//!
//! - **Page Layer** (`page`): fixed 4096-byte pages and the slotted
//!   record layout
//! - **Storage Layer** (`storage`): positional page I/O over a single
//!   heap file
//! - **Buffer Pool** (`buffer`): pinned LRU page cache with dirty
//!   tracking and write-back on eviction
//!
//! ## Usage
//!
//! ```rust,ignore
//! use paged_storage::{Config, PageStore, SlottedPage};
//!
//! let store = PageStore::open(Config::new("my_database.db"))?;
//! let pool = store.buffer_pool();
//!
//! // Allocate a page and pack a record into it
//! let guard = pool.new_page()?;
//! let slot_id = {
//!     let mut page = guard.write();
//!     let mut slotted = SlottedPage::new(&mut page);
//!     slotted.insert(b"hello")?
//! };
//! guard.unpin(true)?;
//!
//! // Read it back
//! let guard = pool.fetch_page(paged_storage::PageId::new(0))?;
//! {
//!     let mut page = guard.write();
//!     let slotted = SlottedPage::new(&mut page);
//!     assert_eq!(slotted.get(slot_id)?, b"hello");
//! }
//! guard.unpin(false)?;
//!
//! store.close()?;
//! ```

pub mod buffer;
pub mod error;
pub mod page;
pub mod storage;
pub mod types;

pub use error::{Result, StorageError};
pub use types::{FrameId, PageId, DEFAULT_POOL_SIZE, PAGE_SIZE};

// Re-export main public API
pub use buffer::{BufferPool, PageGuard, PageRef, PageRefMut};
pub use page::{Page, SlottedPage};
pub use storage::{HeapFile, PageFile};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Storage engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Path to the database file
    pub path: PathBuf,
    /// Buffer pool size in number of frames (default: 64)
    pub pool_size: usize,
    /// Whether to sync every write immediately (default: false)
    pub sync_on_write: bool,
}

impl Config {
    /// Create a new configuration with default settings
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            pool_size: DEFAULT_POOL_SIZE,
            sync_on_write: false,
        }
    }

    /// Set the buffer pool size in frames
    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Enable sync on write for durability
    pub fn sync_on_write(mut self, enabled: bool) -> Self {
        self.sync_on_write = enabled;
        self
    }
}

/// Main storage handle wiring a heap file to a buffer pool.
///
/// Higher layers obtain pages from the buffer pool, mutate them under a
/// pin, and unpin them declaring whether they were modified; the engine
/// itself attaches no meaning to page contents.
pub struct PageStore {
    buffer_pool: Arc<BufferPool>,
    page_file: Arc<HeapFile>,
    config: Config,
}

impl PageStore {
    /// Open or create a database at the configured path
    pub fn open(config: Config) -> Result<Self> {
        let page_file = Arc::new(HeapFile::open(&config.path, config.sync_on_write)?);
        let buffer_pool = Arc::new(BufferPool::new(
            Arc::clone(&page_file) as Arc<dyn PageFile>,
            config.pool_size,
        ));

        Ok(Self {
            buffer_pool,
            page_file,
            config,
        })
    }

    /// Get the buffer pool
    pub fn buffer_pool(&self) -> &BufferPool {
        &self.buffer_pool
    }

    /// Get the underlying heap file
    pub fn page_file(&self) -> &HeapFile {
        &self.page_file
    }

    /// Get the configuration this store was opened with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Write all dirty pages through to the heap file
    pub fn flush(&self) -> Result<()> {
        self.buffer_pool.flush_all_pages()
    }

    /// Flush, synchronize, and close the database.
    ///
    /// Unlike dropping the store, teardown errors are propagated.
    pub fn close(self) -> Result<()> {
        self.buffer_pool.flush_all_pages()?;
        self.page_file.sync()?;
        self.page_file.close()
    }

    /// Get statistics about the database
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            page_count: self.page_file.page_count(),
            pool_size: self.buffer_pool.capacity(),
        }
    }
}

/// Storage statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    /// Total number of pages in the database file
    pub page_count: u64,
    /// Buffer pool capacity in frames
    pub pool_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_basic_roundtrip() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let store = PageStore::open(Config::new(&path))?;

        let pool = store.buffer_pool();
        let guard = pool.new_page()?;
        let page_id = guard.page_id();
        let slot_id = {
            let mut page = guard.write();
            let mut slotted = SlottedPage::new(&mut page);
            slotted.insert(b"hello from the page store")?
        };
        guard.unpin(true)?;

        let guard = pool.fetch_page(page_id)?;
        {
            let mut page = guard.write();
            let slotted = SlottedPage::new(&mut page);
            assert_eq!(slotted.slot_count(), 1);
            assert_eq!(slotted.get(slot_id)?, b"hello from the page store");
        }
        guard.unpin(false)?;

        assert_eq!(store.stats().page_count, 1);
        store.close()?;

        Ok(())
    }

    #[test]
    fn test_data_survives_reopen() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let store = PageStore::open(Config::new(&path).pool_size(2))?;
            let guard = store.buffer_pool().new_page()?;
            {
                let mut page = guard.write();
                let mut slotted = SlottedPage::new(&mut page);
                slotted.insert(b"durable record")?;
            }
            guard.unpin(true)?;
            store.close()?;
        }

        {
            let store = PageStore::open(Config::new(&path))?;
            assert_eq!(store.stats().page_count, 1);

            let guard = store.buffer_pool().fetch_page(PageId::new(0))?;
            {
                let mut page = guard.write();
                let slotted = SlottedPage::new(&mut page);
                assert_eq!(slotted.get(0)?, b"durable record");
            }
            guard.unpin(false)?;
        }

        Ok(())
    }

    #[test]
    fn test_config_builder() {
        let config = Config::new("db.bin").pool_size(8).sync_on_write(true);
        assert_eq!(config.path, PathBuf::from("db.bin"));
        assert_eq!(config.pool_size, 8);
        assert!(config.sync_on_write);
    }

    #[test]
    fn test_stats_serialization() {
        let stats = StorageStats {
            page_count: 3,
            pool_size: 64,
        };

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["pageCount"], 3);
        assert_eq!(json["poolSize"], 64);
    }
}
