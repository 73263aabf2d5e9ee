//! Configuration constants for pagepool.

/// Size of a page in bytes (4KB).
///
/// Matches the OS page size on most systems and the internal page size of
/// common SSDs, so page-granular I/O lines up with what the hardware does
/// anyway. Pages are aligned to this value for Direct I/O compatibility.
pub const PAGE_SIZE: usize = 4096;

/// Default K for the LRU-K replacer.
///
/// K = 2 is the classic choice: a page must be touched twice before it
/// competes with the resident working set, which keeps one-shot scans from
/// flushing hot pages.
pub const DEFAULT_REPLACER_K: usize = 2;

/// Default bucket capacity for the extendible-hash page table.
pub const DEFAULT_BUCKET_SIZE: usize = 4;
