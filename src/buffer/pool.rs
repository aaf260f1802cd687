//! Buffer pool implementation.
//!
//! The buffer pool manages a fixed number of in-memory page frames,
//! caching pages read from the heap file and writing dirty pages back on
//! eviction. Pages are handed out pinned; a pinned page is never chosen
//! as an eviction victim. Victims come from the free list first, then
//! from the least-recently-unpinned frame.
//!
//! Every public operation holds the pool latch for its entire duration,
//! including any disk I/O it performs, so operations are atomic with
//! respect to each other. Callers must not invoke pool operations while
//! holding a [`PageRef`]/[`PageRefMut`] for the same page.

use crate::buffer::replacer::LruReplacer;
use crate::error::{Result, StorageError};
use crate::page::Page;
use crate::storage::PageFile;
use crate::types::{FrameId, PageId};
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::cell::Cell;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// A frame in the buffer pool
struct Frame {
    /// The resident page (sentinel id when the frame is empty)
    page: Page,
    /// Whether the in-memory copy may differ from disk
    is_dirty: bool,
    /// Number of outstanding references to the page
    pin_count: u32,
}

impl Frame {
    fn new() -> Self {
        Self {
            page: Page::empty(),
            is_dirty: false,
            pin_count: 0,
        }
    }

    /// Return the frame to its empty state
    fn reset(&mut self) {
        self.page.set_id(PageId::INVALID);
        self.page.clear();
        self.is_dirty = false;
        self.pin_count = 0;
    }
}

/// Bookkeeping guarded by the pool latch
struct PoolInner {
    /// Maps resident page ids to their frames
    page_table: HashMap<PageId, FrameId>,
    /// Frames that hold no page
    free_list: VecDeque<FrameId>,
    /// Unpinned resident frames, most-recently-unpinned first
    replacer: LruReplacer,
}

impl PoolInner {
    /// Select a frame for reuse: free list head, else LRU frame
    fn victim(&mut self) -> Result<FrameId> {
        if let Some(frame_id) = self.free_list.pop_front() {
            return Ok(frame_id);
        }
        self.replacer.pop_back().ok_or(StorageError::PoolExhausted)
    }
}

/// Bounded cache of pages with pin/unpin reference semantics
pub struct BufferPool {
    /// The heap file for I/O
    page_file: Arc<dyn PageFile>,
    /// Fixed array of frames, addressed by frame id.
    ///
    /// Frame metadata is only touched with the pool latch held; the
    /// per-frame lock exists so a pinned page's bytes stay accessible
    /// after the latch is released.
    frames: Vec<Arc<RwLock<Frame>>>,
    /// The pool latch
    inner: Mutex<PoolInner>,
}

impl BufferPool {
    /// Create a buffer pool with `pool_size` frames over a page file
    pub fn new(page_file: Arc<dyn PageFile>, pool_size: usize) -> Self {
        Self {
            page_file,
            frames: (0..pool_size)
                .map(|_| Arc::new(RwLock::new(Frame::new())))
                .collect(),
            inner: Mutex::new(PoolInner {
                page_table: HashMap::with_capacity(pool_size),
                free_list: (0..pool_size).collect(),
                replacer: LruReplacer::new(pool_size),
            }),
        }
    }

    /// Fetch the page with the given id, pinning it.
    ///
    /// A resident page is pinned in place; otherwise a victim frame is
    /// reclaimed (writing its old page back if dirty) and the page is
    /// read from disk.
    pub fn fetch_page(&self, page_id: PageId) -> Result<PageGuard<'_>> {
        let mut inner = self.inner.lock();

        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            inner.replacer.remove(frame_id);
            let frame = Arc::clone(&self.frames[frame_id]);
            frame.write().pin_count += 1;
            return Ok(PageGuard::new(self, page_id, frame));
        }

        let frame_id = self.evict_victim(&mut inner)?;
        let frame = Arc::clone(&self.frames[frame_id]);
        {
            let mut locked = frame.write();
            if let Err(err) = self.page_file.read_page(page_id, locked.page.data_mut()) {
                locked.reset();
                drop(locked);
                inner.free_list.push_front(frame_id);
                return Err(err);
            }
            locked.page.set_id(page_id);
            locked.pin_count = 1;
            locked.is_dirty = false;
        }
        inner.page_table.insert(page_id, frame_id);

        Ok(PageGuard::new(self, page_id, frame))
    }

    /// Allocate a fresh page in the heap file and pin it.
    ///
    /// The returned page has a zeroed buffer and is clean.
    pub fn new_page(&self) -> Result<PageGuard<'_>> {
        let mut inner = self.inner.lock();

        let frame_id = self.evict_victim(&mut inner)?;
        let frame = Arc::clone(&self.frames[frame_id]);
        let page_id = {
            let mut locked = frame.write();
            match self.page_file.allocate_page() {
                Ok(page_id) => {
                    locked.page.clear();
                    locked.page.set_id(page_id);
                    locked.pin_count = 1;
                    locked.is_dirty = false;
                    page_id
                }
                Err(err) => {
                    locked.reset();
                    drop(locked);
                    inner.free_list.push_front(frame_id);
                    return Err(err);
                }
            }
        };
        inner.page_table.insert(page_id, frame_id);

        Ok(PageGuard::new(self, page_id, frame))
    }

    /// Drop one reference to a resident page.
    ///
    /// The dirty hint is sticky: once any unpin reports the page dirty it
    /// stays dirty until written back. When the pin count reaches zero
    /// the frame becomes the most recent eviction candidate.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<()> {
        let mut inner = self.inner.lock();

        let frame_id = match inner.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return Err(StorageError::PageNotResident(page_id)),
        };

        let mut frame = self.frames[frame_id].write();
        if frame.pin_count == 0 {
            return Err(StorageError::PageNotPinned(page_id));
        }

        frame.pin_count -= 1;
        if is_dirty {
            frame.is_dirty = true;
        }
        if frame.pin_count == 0 {
            drop(frame);
            inner.replacer.push_front(frame_id);
        }

        Ok(())
    }

    /// Write a resident page through to the heap file.
    ///
    /// The page may still be pinned. On success the frame is clean.
    pub fn flush_page(&self, page_id: PageId) -> Result<()> {
        let inner = self.inner.lock();

        let frame_id = match inner.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return Err(StorageError::PageNotResident(page_id)),
        };

        let mut frame = self.frames[frame_id].write();
        self.page_file.write_page(frame.page.id(), frame.page.data())?;
        frame.is_dirty = false;
        Ok(())
    }

    /// Write every dirty resident page through to the heap file.
    ///
    /// Stops at the first error; later frames then remain dirty.
    pub fn flush_all_pages(&self) -> Result<()> {
        let inner = self.inner.lock();

        for &frame_id in inner.page_table.values() {
            let mut frame = self.frames[frame_id].write();
            if frame.is_dirty {
                self.page_file.write_page(frame.page.id(), frame.page.data())?;
                frame.is_dirty = false;
            }
        }
        Ok(())
    }

    /// Remove a page from the pool and the file. Reserved.
    pub fn delete_page(&self, page_id: PageId) -> Result<()> {
        let _ = page_id;
        Err(StorageError::Unimplemented("delete_page"))
    }

    /// Get the buffer pool capacity in frames
    pub fn capacity(&self) -> usize {
        self.frames.len()
    }

    /// Get the total number of pages in the heap file
    pub fn page_count(&self) -> u64 {
        self.page_file.page_count()
    }

    /// Choose a frame for reuse, writing back and detaching its current
    /// page if it holds one.
    ///
    /// If the dirty write-back fails the victim keeps its page, returns
    /// to the front of the replacer, and the error is surfaced.
    fn evict_victim(&self, inner: &mut PoolInner) -> Result<FrameId> {
        let frame_id = inner.victim()?;

        let mut frame = self.frames[frame_id].write();
        if frame.page.id().is_valid() {
            if frame.is_dirty {
                if let Err(err) = self
                    .page_file
                    .write_page(frame.page.id(), frame.page.data())
                {
                    drop(frame);
                    inner.replacer.push_front(frame_id);
                    return Err(err);
                }
            }
            let old_id = frame.page.id();
            drop(frame);
            inner.page_table.remove(&old_id);
        }

        Ok(frame_id)
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        // Best effort; callers who need teardown errors flush explicitly.
        let _ = self.flush_all_pages();
    }
}

#[cfg(test)]
impl BufferPool {
    /// Whether a page currently occupies a frame
    fn resident(&self, page_id: PageId) -> bool {
        self.inner.lock().page_table.contains_key(&page_id)
    }

    /// Assert the frame bookkeeping invariants: every frame is in exactly
    /// one of {free list, replacer, pinned}, and the page table agrees
    /// with the frames' page ids in both directions.
    fn assert_invariants(&self) {
        let inner = self.inner.lock();

        for frame_id in 0..self.frames.len() {
            let frame = self.frames[frame_id].read();
            let in_free = inner.free_list.contains(&frame_id);
            let in_replacer = inner.replacer.contains(frame_id);
            let pinned = frame.pin_count > 0;

            let states = [in_free, in_replacer, pinned]
                .iter()
                .filter(|&&state| state)
                .count();
            assert_eq!(states, 1, "frame {frame_id} must be in exactly one state");

            if frame.page.id().is_valid() {
                assert_eq!(
                    inner.page_table.get(&frame.page.id()),
                    Some(&frame_id),
                    "resident frame {frame_id} missing from page table"
                );
                assert_eq!(in_replacer, frame.pin_count == 0);
            } else {
                assert!(in_free, "empty frame {frame_id} must be on the free list");
            }
        }

        for (&page_id, &frame_id) in inner.page_table.iter() {
            assert_eq!(self.frames[frame_id].read().page.id(), page_id);
        }
    }
}

/// RAII handle for a pinned page.
///
/// The guard keeps the page pinned; dropping it performs a best-effort
/// unpin using the dirty hint recorded via [`PageGuard::mark_dirty`].
/// Call [`PageGuard::unpin`] instead to observe unpin errors or to pass
/// the hint explicitly.
pub struct PageGuard<'a> {
    pool: &'a BufferPool,
    page_id: PageId,
    frame: Arc<RwLock<Frame>>,
    dirty: Cell<bool>,
    released: Cell<bool>,
}

impl<'a> PageGuard<'a> {
    fn new(pool: &'a BufferPool, page_id: PageId, frame: Arc<RwLock<Frame>>) -> Self {
        Self {
            pool,
            page_id,
            frame,
            dirty: Cell::new(false),
            released: Cell::new(false),
        }
    }

    /// Get the pinned page's id
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Get read access to the page
    pub fn read(&self) -> PageRef<'_> {
        PageRef {
            guard: self.frame.read(),
        }
    }

    /// Get write access to the page.
    ///
    /// Mutating the buffer does not mark the page dirty by itself;
    /// declare modifications with [`PageGuard::mark_dirty`] or an
    /// explicit dirty unpin.
    pub fn write(&self) -> PageRefMut<'_> {
        PageRefMut {
            guard: self.frame.write(),
        }
    }

    /// Record that the page was modified, for the drop-time unpin
    pub fn mark_dirty(&self) {
        self.dirty.set(true);
    }

    /// Release the pin, declaring whether the page was modified
    pub fn unpin(self, is_dirty: bool) -> Result<()> {
        self.released.set(true);
        self.pool.unpin_page(self.page_id, is_dirty)
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        if !self.released.get() {
            let _ = self.pool.unpin_page(self.page_id, self.dirty.get());
        }
    }
}

/// Read access to a pinned page
pub struct PageRef<'a> {
    guard: RwLockReadGuard<'a, Frame>,
}

impl std::ops::Deref for PageRef<'_> {
    type Target = Page;

    fn deref(&self) -> &Self::Target {
        &self.guard.page
    }
}

/// Write access to a pinned page
pub struct PageRefMut<'a> {
    guard: RwLockWriteGuard<'a, Frame>,
}

impl std::ops::Deref for PageRefMut<'_> {
    type Target = Page;

    fn deref(&self) -> &Self::Target {
        &self.guard.page
    }
}

impl std::ops::DerefMut for PageRefMut<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard.page
    }
}
