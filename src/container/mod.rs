//! Associative containers used by the buffer layer.
//!
//! Currently a single structure: the [`ExtendibleHashTable`] backing the
//! buffer pool's page table.

mod extendible_hash_table;

pub use extendible_hash_table::ExtendibleHashTable;
