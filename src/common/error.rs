//! Error types for pagepool.

use thiserror::Error;

use crate::common::PageId;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in pagepool.
///
/// A single error type keeps error handling consistent across the crate.
/// Recoverable conditions that are part of an operation's contract (page not
/// resident, pin underflow, delete refused) are signalled through `bool` or
/// `Option` return values instead; this enum covers the failures that abort
/// an operation.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the underlying database file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Requested page does not exist on disk.
    #[error("{0} not found on disk")]
    PageNotFound(PageId),

    /// Every frame is pinned; nothing can be evicted.
    #[error("no free frames available, all pages are pinned")]
    NoFreeFrames,
}
