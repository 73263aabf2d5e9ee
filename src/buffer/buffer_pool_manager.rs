//! Buffer Pool Manager - the core page caching layer.
//!
//! The [`BufferPoolManager`] mediates every access to on-disk pages through
//! a bounded array of in-memory frames:
//! - pin-based reference counting keeps in-use pages resident
//! - dirty pages are written back before their frames are reused
//! - an LRU-K replacer picks eviction victims among the unpinned frames
//! - an extendible hash table maps resident page ids to frames

use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::buffer::replacer::LruKReplacer;
use crate::buffer::{BufferPoolStats, Frame, PageReadGuard, PageWriteGuard};
use crate::common::config::DEFAULT_BUCKET_SIZE;
use crate::common::{Error, FrameId, PageId, Result};
use crate::container::ExtendibleHashTable;
use crate::recovery::LogManager;
use crate::storage::DiskManager;

/// Mapping state guarded by the pool latch.
///
/// Every transition between "free", "resident" and "evicted" happens while
/// this is held, which is what makes the pool's invariants hold at the
/// boundaries of each public operation: a frame is always either on the
/// free list or bound to exactly one page, and a pinned frame is never
/// evictable.
struct PoolState {
    /// Frame ids not currently bound to any page.
    free_list: Vec<FrameId>,
    /// Eviction policy over the bound, unpinned frames.
    replacer: LruKReplacer,
}

/// Manages a fixed pool of frames caching disk pages.
///
/// # Architecture
/// ```text
/// ┌─────────────────────────────────────────────────────────────┐
/// │                    BufferPoolManager                        │
/// │  ┌──────────────┐  ┌───────────────────────────────────┐    │
/// │  │ page_table   │  │        frames: Vec<Frame>         │    │
/// │  │PageId → Fid  │─▶│  [Frame0] [Frame1] [Frame2] ...   │    │
/// │  └──────────────┘  └───────────────────────────────────┘    │
/// │  ┌────────────────────────────┐  ┌──────────────┐           │
/// │  │ latch: free_list, replacer │  │ disk_manager │           │
/// │  └────────────────────────────┘  └──────────────┘           │
/// └─────────────────────────────────────────────────────────────┘
/// ```
///
/// # Locking
/// One latch serializes every mapping change, and it stays held across the
/// disk I/O of eviction write-back, which is the simplest arrangement that
/// keeps "dirty victim written before reassignment" airtight. Page *data*
/// access is not under the latch: each frame carries its own `RwLock`, held
/// by the page guards, so readers and writers of already-pinned pages run
/// concurrently with the pool. The page table keeps an internal latch of
/// its own; the pool latch is always taken first, never the reverse.
///
/// # Usage
/// ```ignore
/// let dm = DiskManager::create("test.db")?;
/// let bpm = BufferPoolManager::new(64, 2, dm);
///
/// let mut guard = bpm.new_page()?;
/// guard.as_mut_slice()[0] = 0xAB;
/// drop(guard); // unpinned, marked dirty
///
/// let guard = bpm.fetch_page_read(PageId::new(0))?;
/// assert_eq!(guard.as_slice()[0], 0xAB);
/// ```
pub struct BufferPoolManager {
    /// Fixed pool of frames allocated at startup.
    frames: Vec<Frame>,

    /// Maps resident page ids to frame ids.
    page_table: ExtendibleHashTable<PageId, FrameId>,

    /// Free list plus replacer, under the pool latch.
    latch: Mutex<PoolState>,

    /// Handles all disk I/O.
    disk_manager: Mutex<DiskManager>,

    /// Flushed before every dirty write-back when present.
    log_manager: Option<Arc<dyn LogManager>>,

    /// Performance statistics.
    stats: BufferPoolStats,

    /// Number of frames in the pool (immutable after construction).
    pool_size: usize,
}

impl BufferPoolManager {
    /// Create a new buffer pool manager.
    ///
    /// # Arguments
    /// * `pool_size` - number of frames
    /// * `replacer_k` - K for the LRU-K replacer
    /// * `disk_manager` - handles disk I/O
    ///
    /// # Panics
    /// Panics if `pool_size` is 0 or `replacer_k` is 0.
    pub fn new(pool_size: usize, replacer_k: usize, disk_manager: DiskManager) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");

        let frames: Vec<Frame> = (0..pool_size).map(|_| Frame::new()).collect();
        let free_list: Vec<FrameId> = (0..pool_size).map(FrameId::new).collect();

        Self {
            frames,
            page_table: ExtendibleHashTable::new(DEFAULT_BUCKET_SIZE),
            latch: Mutex::new(PoolState {
                free_list,
                replacer: LruKReplacer::new(pool_size, replacer_k),
            }),
            disk_manager: Mutex::new(disk_manager),
            log_manager: None,
            stats: BufferPoolStats::new(),
            pool_size,
        }
    }

    /// Attach a log manager; its `flush` runs before every dirty write-back.
    pub fn with_log_manager(mut self, log_manager: Arc<dyn LogManager>) -> Self {
        self.log_manager = Some(log_manager);
        self
    }

    // ========================================================================
    // Public API: Create and fetch pages
    // ========================================================================

    /// Allocate a page on disk without bringing it into the pool.
    ///
    /// Useful when a caller wants ids up front and will fetch later.
    pub fn allocate_page_id(&self) -> Result<PageId> {
        self.disk_manager.lock().allocate_page()
    }

    /// Allocate a new page and pin it into a frame.
    ///
    /// The frame starts zeroed with `pin_count = 1`; the returned write
    /// guard unpins (and marks dirty) on drop.
    ///
    /// # Errors
    /// - `Error::NoFreeFrames` if every frame is pinned
    /// - I/O errors from on-disk allocation
    pub fn new_page(&self) -> Result<PageWriteGuard<'_>> {
        let mut state = self.latch.lock();

        let frame_id = self.acquire_frame(&mut state)?;

        let page_id = match self.disk_manager.lock().allocate_page() {
            Ok(page_id) => page_id,
            Err(e) => {
                // The frame was already detached from its old page; it goes
                // back to the free list in the free-frame shape.
                state.free_list.push(frame_id);
                return Err(e);
            }
        };

        let frame = &self.frames[frame_id.0];
        frame.page_mut().reset();
        frame.set_page_id(Some(page_id));
        frame.clear_dirty();
        frame.pin();

        self.page_table.insert(page_id, frame_id);
        state.replacer.record_access(frame_id);
        state.replacer.set_evictable(frame_id, false);
        drop(state);

        // The page lock is taken after the latch is released so that a
        // blocked page lock never stalls the whole pool.
        let lock = frame.page_mut();
        Ok(PageWriteGuard::new(self, frame_id, page_id, lock))
    }

    /// Fetch a page for reading (shared access).
    ///
    /// # Errors
    /// - `Error::PageNotFound` if the page doesn't exist on disk
    /// - `Error::NoFreeFrames` if every frame is pinned
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<PageReadGuard<'_>> {
        let frame_id = self.fetch_frame(page_id)?;
        let lock = self.frames[frame_id.0].page();

        Ok(PageReadGuard::new(self, frame_id, page_id, lock))
    }

    /// Fetch a page for writing (exclusive access).
    ///
    /// # Errors
    /// - `Error::PageNotFound` if the page doesn't exist on disk
    /// - `Error::NoFreeFrames` if every frame is pinned
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<PageWriteGuard<'_>> {
        let frame_id = self.fetch_frame(page_id)?;
        let lock = self.frames[frame_id.0].page_mut();

        Ok(PageWriteGuard::new(self, frame_id, page_id, lock))
    }

    /// Like [`fetch_page_read`](Self::fetch_page_read), but `None` instead
    /// of an error when the page cannot be pinned.
    pub fn checked_read_page(&self, page_id: PageId) -> Option<PageReadGuard<'_>> {
        self.fetch_page_read(page_id).ok()
    }

    /// Like [`fetch_page_write`](Self::fetch_page_write), but `None` instead
    /// of an error when the page cannot be pinned.
    pub fn checked_write_page(&self, page_id: PageId) -> Option<PageWriteGuard<'_>> {
        self.fetch_page_write(page_id).ok()
    }

    // ========================================================================
    // Public API: Unpin
    // ========================================================================

    /// Drop one pin on a resident page.
    ///
    /// `is_dirty` ORs into the frame's dirty bit; unpinning never cleans a
    /// page. When the pin count reaches zero the frame becomes an eviction
    /// candidate.
    ///
    /// The page guards release through this path on drop, so a well-behaved
    /// caller never needs to call it directly.
    ///
    /// Returns `false` if the page is not resident or its pin count is
    /// already zero.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let mut state = self.latch.lock();

        let Some(frame_id) = self.page_table.find(&page_id) else {
            return false;
        };

        let frame = &self.frames[frame_id.0];
        if frame.pin_count() == 0 {
            return false;
        }

        if is_dirty {
            frame.mark_dirty();
        }
        if frame.unpin() == 0 {
            state.replacer.set_evictable(frame_id, true);
        }

        true
    }

    // ========================================================================
    // Public API: Flush
    // ========================================================================

    /// Write a resident page to disk and clear its dirty bit.
    ///
    /// The write is unconditional, so callers can force a clean copy to
    /// disk. Pin counts and evictability are untouched.
    ///
    /// Returns `Ok(false)` for the invalid sentinel or a page that is not
    /// resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if !page_id.is_valid() {
            return Ok(false);
        }

        let _state = self.latch.lock();

        let Some(frame_id) = self.page_table.find(&page_id) else {
            return Ok(false);
        };

        self.write_back(page_id, &self.frames[frame_id.0])?;
        Ok(true)
    }

    /// Write every dirty resident page to disk.
    pub fn flush_all_pages(&self) -> Result<()> {
        let _state = self.latch.lock();

        for frame in &self.frames {
            if let Some(page_id) = frame.page_id() {
                if frame.is_dirty() {
                    self.write_back(page_id, frame)?;
                }
            }
        }

        Ok(())
    }

    // ========================================================================
    // Public API: Delete
    // ========================================================================

    /// Drop a page from the pool and release its id.
    ///
    /// A page that is not resident only has its id deallocated. A resident
    /// dirty page is written back first: the id is still live until
    /// deallocation, so a holder of the id must be able to observe the last
    /// contents.
    ///
    /// Returns `Ok(false)` if the page is still pinned.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut state = self.latch.lock();

        let Some(frame_id) = self.page_table.find(&page_id) else {
            self.disk_manager.lock().deallocate_page(page_id);
            return Ok(true);
        };

        let frame = &self.frames[frame_id.0];
        if frame.is_pinned() {
            return Ok(false);
        }

        if frame.is_dirty() {
            self.write_back(page_id, frame)?;
        }

        self.page_table.remove(&page_id);
        state.replacer.remove(frame_id);
        frame.reset();
        state.free_list.push(frame_id);

        self.disk_manager.lock().deallocate_page(page_id);

        debug!(page_id = page_id.0, frame_id = frame_id.0, "page deleted");
        Ok(true)
    }

    // ========================================================================
    // Public API: Introspection
    // ========================================================================

    /// Get buffer pool statistics.
    pub fn stats(&self) -> &BufferPoolStats {
        &self.stats
    }

    /// Get the pool size.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Number of frames not bound to any page.
    pub fn free_frame_count(&self) -> usize {
        self.latch.lock().free_list.len()
    }

    /// Number of resident pages.
    pub fn page_count(&self) -> usize {
        self.page_table.len()
    }

    /// Number of frames the replacer would currently consider for eviction.
    pub fn evictable_count(&self) -> usize {
        self.latch.lock().replacer.size()
    }

    /// Pin count of a resident page, or `None` if the page is not resident.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let _state = self.latch.lock();
        let frame_id = self.page_table.find(&page_id)?;
        Some(self.frames[frame_id.0].pin_count())
    }

    /// Whether a page is currently resident.
    pub fn contains_page(&self, page_id: PageId) -> bool {
        self.page_table.find(&page_id).is_some()
    }

    // ========================================================================
    // Internal: Fetch
    // ========================================================================

    /// Pin the frame holding `page_id`, reading it from disk if absent.
    fn fetch_frame(&self, page_id: PageId) -> Result<FrameId> {
        let mut state = self.latch.lock();

        // Resident: bump the pin and refresh the access history.
        if let Some(frame_id) = self.page_table.find(&page_id) {
            self.frames[frame_id.0].pin();
            state.replacer.record_access(frame_id);
            state.replacer.set_evictable(frame_id, false);
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(frame_id);
        }

        self.stats.cache_misses.fetch_add(1, Ordering::Relaxed);

        let frame_id = self.acquire_frame(&mut state)?;
        let frame = &self.frames[frame_id.0];

        {
            let mut page = frame.page_mut();
            if let Err(e) = self.disk_manager.lock().read_page(page_id, &mut page) {
                drop(page);
                state.free_list.push(frame_id);
                return Err(e);
            }
        }
        self.stats.pages_read.fetch_add(1, Ordering::Relaxed);

        frame.set_page_id(Some(page_id));
        frame.clear_dirty();
        frame.pin();

        self.page_table.insert(page_id, frame_id);
        state.replacer.record_access(frame_id);
        state.replacer.set_evictable(frame_id, false);

        Ok(frame_id)
    }

    // ========================================================================
    // Internal: Frame allocation and eviction
    // ========================================================================

    /// Hand out an unbound frame, evicting a victim if the free list is
    /// empty. On return the frame is detached: not in the page table, not
    /// tracked by the replacer, not on the free list.
    fn acquire_frame(&self, state: &mut PoolState) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop() {
            return Ok(frame_id);
        }

        let frame_id = state.replacer.evict().ok_or(Error::NoFreeFrames)?;
        let frame = &self.frames[frame_id.0];

        if let Some(victim_page_id) = frame.page_id() {
            if frame.is_dirty() {
                if let Err(e) = self.write_back(victim_page_id, frame) {
                    // Put the victim back under the replacer's care so the
                    // frame accounting stays consistent after the failure.
                    state.replacer.record_access(frame_id);
                    state.replacer.set_evictable(frame_id, true);
                    return Err(e);
                }
            }
            self.page_table.remove(&victim_page_id);
            debug!(
                page_id = victim_page_id.0,
                frame_id = frame_id.0,
                "page evicted"
            );
        }

        frame.set_page_id(None);
        frame.clear_dirty();
        self.stats.evictions.fetch_add(1, Ordering::Relaxed);

        Ok(frame_id)
    }

    /// Write a frame's page to disk and clear its dirty bit.
    ///
    /// Honors the write-ahead rule: the attached log manager (if any) is
    /// flushed before the page hits disk.
    fn write_back(&self, page_id: PageId, frame: &Frame) -> Result<()> {
        if let Some(log_manager) = &self.log_manager {
            log_manager.flush();
        }

        let page = frame.page();
        self.disk_manager.lock().write_page(page_id, &page)?;
        drop(page);

        frame.clear_dirty();
        self.stats.pages_written.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }
}
