//! Recovery seam: the write-ahead-log contract the buffer pool honors.
//!
//! The pool does not implement logging itself. It only promises that when a
//! log manager is attached, the log reaches stable storage before any dirty
//! page does.

/// A write-ahead log the buffer pool can be wired to.
///
/// [`BufferPoolManager`](crate::buffer::BufferPoolManager) calls [`flush`]
/// before every dirty write-back, whether from eviction, an explicit flush,
/// or deletion. Implementations must persist all log records buffered so
/// far; the pool does not track per-page log positions, so the flush is
/// necessarily conservative.
///
/// [`flush`]: LogManager::flush
pub trait LogManager: Send + Sync {
    /// Force buffered log records to stable storage.
    fn flush(&self);
}
