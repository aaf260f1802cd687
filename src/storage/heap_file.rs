//! Heap file implementation.
//!
//! The heap file is responsible for reading and writing fixed-size pages
//! at positional offsets in a single database file. It abstracts the
//! file I/O operations behind a trait so that the rest of the system can
//! be tested with mock implementations.
//!
//! The file has no header, magic, or checksums: page id `i` occupies
//! bytes `[i * PAGE_SIZE, (i + 1) * PAGE_SIZE)` and the file grows only
//! by appending zeroed pages.

use crate::error::{Result, StorageError};
use crate::page::Page;
use crate::types::{PageId, PAGE_SIZE};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Trait for positional page I/O
///
/// This abstraction is the seam between the buffer pool and the disk;
/// tests substitute failing implementations to exercise error paths.
pub trait PageFile: Send + Sync {
    /// Append a zeroed page to the file, returning its id
    fn allocate_page(&self) -> Result<PageId>;

    /// Read the page with the given id into `buf`
    fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<()>;

    /// Write `data` as the contents of the page with the given id
    fn write_page(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()>;

    /// Number of pages currently materialized in the file
    fn page_count(&self) -> u64;

    /// Synchronize file contents with the storage device
    fn sync(&self) -> Result<()>;
}

/// File-backed heap file
pub struct HeapFile {
    path: PathBuf,
    sync_on_write: bool,
    state: Mutex<FileState>,
}

struct FileState {
    /// Open handle; `None` after an explicit close, reopened lazily
    file: Option<File>,
    page_count: u64,
}

impl HeapFile {
    /// Open or create a heap file at the given path.
    ///
    /// Fails if an existing file's size is not a multiple of the page
    /// size. With `sync_on_write`, every allocation and page write is
    /// followed by an fsync.
    pub fn open(path: impl AsRef<Path>, sync_on_write: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let size = file.metadata()?.len();
        if size % PAGE_SIZE as u64 != 0 {
            return Err(StorageError::invalid_db(format!(
                "file size {} is not a multiple of the page size",
                size
            )));
        }

        Ok(Self {
            path,
            sync_on_write,
            state: Mutex::new(FileState {
                file: Some(file),
                page_count: size / PAGE_SIZE as u64,
            }),
        })
    }

    /// Whether an OS handle is currently held
    pub fn is_open(&self) -> bool {
        self.state.lock().file.is_some()
    }

    /// Path of the underlying database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Synchronize and drop the OS handle.
    ///
    /// Any later operation reopens the file from the stored path.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(file) = state.file.take() {
            file.sync_all()?;
        }
        Ok(())
    }

    /// Allocate a fresh page and return it as an owned, zeroed buffer
    pub fn allocate(&self) -> Result<Page> {
        let page_id = self.allocate_page()?;
        Ok(Page::new(page_id))
    }

    /// Load the page with the given id into an owned buffer
    pub fn load(&self, page_id: PageId) -> Result<Page> {
        let mut page = Page::new(page_id);
        self.read_page(page_id, page.data_mut())?;
        Ok(page)
    }

    /// Write an owned page's contents back to the file
    pub fn flush(&self, page: &Page) -> Result<()> {
        self.write_page(page.id(), page.data())
    }
}

impl PageFile for HeapFile {
    fn allocate_page(&self) -> Result<PageId> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let file = ensure_open(&mut state.file, &self.path)?;

        let zeros = vec![0u8; PAGE_SIZE];
        file.seek(SeekFrom::End(0))?;
        file.write_all(&zeros)?;
        if self.sync_on_write {
            file.sync_data()?;
        }

        let page_id = PageId::new(state.page_count);
        state.page_count += 1;
        Ok(page_id)
    }

    fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let file = ensure_open(&mut state.file, &self.path)?;

        if page_id.value() >= state.page_count {
            return Err(StorageError::PageNotFound(page_id));
        }

        file.seek(SeekFrom::Start(page_id.file_offset(PAGE_SIZE)))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write_page(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let file = ensure_open(&mut state.file, &self.path)?;

        if page_id.value() >= state.page_count {
            return Err(StorageError::PageNotFound(page_id));
        }

        file.seek(SeekFrom::Start(page_id.file_offset(PAGE_SIZE)))?;
        file.write_all(data)?;
        if self.sync_on_write {
            file.sync_data()?;
        }
        Ok(())
    }

    fn page_count(&self) -> u64 {
        self.state.lock().page_count
    }

    fn sync(&self) -> Result<()> {
        let state = self.state.lock();
        if let Some(file) = state.file.as_ref() {
            file.sync_all()?;
        }
        Ok(())
    }
}

/// Reopen the handle if it was closed. The file must already exist.
fn ensure_open<'a>(file: &'a mut Option<File>, path: &Path) -> Result<&'a mut File> {
    let handle = match file.take() {
        Some(handle) => handle,
        None => OpenOptions::new().read(true).write(true).open(path)?,
    };
    Ok(file.insert(handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::SlottedPage;
    use tempfile::tempdir;

    #[test]
    fn test_create_new_file() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let heap = HeapFile::open(&path, false)?;
        assert_eq!(heap.page_count(), 0);
        assert!(heap.is_open());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);

        Ok(())
    }

    #[test]
    fn test_allocate_is_dense_and_appends() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let heap = HeapFile::open(&path, false)?;
        assert_eq!(heap.allocate_page()?, PageId::new(0));
        assert_eq!(heap.allocate_page()?, PageId::new(1));
        assert_eq!(heap.allocate_page()?, PageId::new(2));
        assert_eq!(heap.page_count(), 3);
        assert_eq!(
            std::fs::metadata(&path).unwrap().len(),
            3 * PAGE_SIZE as u64
        );

        Ok(())
    }

    #[test]
    fn test_write_and_read_page() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let heap = HeapFile::open(&path, false)?;
        let page_id = heap.allocate_page()?;

        let mut data = [0u8; PAGE_SIZE];
        data[0..5].copy_from_slice(b"hello");
        heap.write_page(page_id, &data)?;

        let mut read_back = [0u8; PAGE_SIZE];
        heap.read_page(page_id, &mut read_back)?;
        assert_eq!(&read_back[0..5], b"hello");

        Ok(())
    }

    #[test]
    fn test_unknown_page_id() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let heap = HeapFile::open(&path, false)?;
        heap.allocate_page()?;

        let mut buf = [0u8; PAGE_SIZE];
        assert!(matches!(
            heap.read_page(PageId::new(1), &mut buf),
            Err(StorageError::PageNotFound(id)) if id == PageId::new(1)
        ));
        assert!(matches!(
            heap.write_page(PageId::new(1), &buf),
            Err(StorageError::PageNotFound(_))
        ));

        Ok(())
    }

    #[test]
    fn test_reopen_preserves_pages() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let heap = HeapFile::open(&path, true)?;
            let page_id = heap.allocate_page()?;
            let mut data = [0u8; PAGE_SIZE];
            data[0..4].copy_from_slice(b"keep");
            heap.write_page(page_id, &data)?;
        }

        {
            let heap = HeapFile::open(&path, false)?;
            assert_eq!(heap.page_count(), 1);

            let mut read_back = [0u8; PAGE_SIZE];
            heap.read_page(PageId::new(0), &mut read_back)?;
            assert_eq!(&read_back[0..4], b"keep");
        }

        Ok(())
    }

    #[test]
    fn test_rejects_unaligned_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        std::fs::write(&path, vec![0u8; PAGE_SIZE + 1]).unwrap();

        assert!(matches!(
            HeapFile::open(&path, false),
            Err(StorageError::InvalidDatabaseFile(_))
        ));
    }

    #[test]
    fn test_close_then_lazy_reopen() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let heap = HeapFile::open(&path, false)?;
        let page_id = heap.allocate_page()?;
        heap.close()?;
        assert!(!heap.is_open());

        let mut buf = [0u8; PAGE_SIZE];
        heap.read_page(page_id, &mut buf)?;
        assert!(heap.is_open());

        Ok(())
    }

    #[test]
    fn test_owned_page_roundtrip() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let heap = HeapFile::open(&path, false)?;

        let mut page = heap.allocate()?;
        let slot_id = {
            let mut slotted = SlottedPage::new(&mut page);
            slotted.insert(b"pager roundtrip payload")?
        };
        heap.flush(&page)?;
        assert_eq!(heap.page_count(), 1);

        let mut loaded = heap.load(page.id())?;
        let slotted = SlottedPage::new(&mut loaded);
        assert_eq!(slotted.slot_count(), 1);
        assert_eq!(slotted.get(slot_id)?, b"pager roundtrip payload");

        Ok(())
    }
}
