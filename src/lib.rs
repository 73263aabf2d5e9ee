//! pagepool - the page cache core of a disk-oriented storage manager.
//!
//! # Architecture
//! ```text
//!             ┌──────────────────────────────────────┐
//!             │          BufferPoolManager           │
//!             │  (new/fetch/unpin/flush/delete)      │
//!             └──────┬─────────────┬─────────────┬───┘
//!                    │             │             │
//!            ┌───────▼──────┐ ┌────▼─────┐ ┌─────▼──────┐
//!            │ Page Table   │ │ Frame    │ │ LRU-K      │
//!            │ (extendible  │ │ Array +  │ │ Replacer   │
//!            │  hash)       │ │ Free List│ │            │
//!            └──────┬───────┘ └──────────┘ └────────────┘
//!                   │
//!            ┌──────▼───────┐
//!            │ Disk Manager │
//!            └──────────────┘
//! ```
//!
//! Three subsystems jointly enforce the pool's guarantees: no pinned page is
//! ever evicted, dirty pages hit disk before their frames are reused, and
//! pages with an established access history outlive one-shot scans.
//!
//! # Modules
//! - [`common`] - Shared primitives (PageId, FrameId, Error, config)
//! - [`buffer`] - Buffer pool manager, frames, guards, LRU-K replacer
//! - [`container`] - Extendible hash table backing the page table
//! - [`storage`] - Disk I/O and the raw page type
//! - [`recovery`] - Log-manager contract for write-ahead ordering
//!
//! # Quick Start
//! ```no_run
//! use pagepool::{BufferPoolManager, DiskManager};
//!
//! let dm = DiskManager::create("my_database.db").unwrap();
//! let bpm = BufferPoolManager::new(64, 2, dm);
//!
//! let mut guard = bpm.new_page().unwrap();
//! guard.as_mut_slice()[..5].copy_from_slice(b"hello");
//! let page_id = guard.page_id();
//! drop(guard); // unpinned, marked dirty
//!
//! let guard = bpm.fetch_page_read(page_id).unwrap();
//! assert_eq!(&guard.as_slice()[..5], b"hello");
//! ```

pub mod buffer;
pub mod common;
pub mod container;
pub mod recovery;
pub mod storage;

// Re-export commonly used items at the crate root for convenience
pub use common::config::PAGE_SIZE;
pub use common::{Error, FrameId, PageId, Result};

pub use buffer::replacer::LruKReplacer;
pub use buffer::{BufferPoolManager, BufferPoolStats, Frame, PageReadGuard, PageWriteGuard, StatsSnapshot};
pub use container::ExtendibleHashTable;
pub use recovery::LogManager;
pub use storage::{DiskManager, Page};
