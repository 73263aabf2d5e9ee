//! Eviction policy for the buffer pool.
//!
//! The pool tracks page accesses through [`LruKReplacer`] and asks it for a
//! victim when no free frame is left.

mod lru_k;

pub use lru_k::LruKReplacer;
