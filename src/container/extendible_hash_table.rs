//! Extendible hashing - a dynamic hash table that grows bucket by bucket.
//!
//! The table keeps a directory of `2^global_depth` slots, each referring to
//! a bucket. A full bucket splits locally: only its own entries are
//! rehashed, and the directory doubles only when the splitting bucket is
//! already at full depth. Insertion cost is therefore bounded by the work of
//! one split, never a whole-table rehash.
//!
//! Several directory slots may refer to the same bucket; that aliasing is
//! how a bucket with `local_depth < global_depth` is represented. The
//! directory stores *indices into a bucket arena* rather than references,
//! which makes the aliasing trivially safe to mutate during splits.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash, Hasher};

use parking_lot::Mutex;

/// A bucket: a small vector of entries plus the number of hash bits that
/// place keys into it.
struct Bucket<K, V> {
    entries: Vec<(K, V)>,
    local_depth: u32,
}

impl<K, V> Bucket<K, V> {
    fn new(local_depth: u32) -> Self {
        Self {
            entries: Vec::new(),
            local_depth,
        }
    }
}

/// The mutable core, guarded by the table latch.
struct Table<K, V> {
    /// Directory of arena indices, length `2^global_depth`.
    dir: Vec<usize>,
    /// Bucket arena. Buckets are only ever appended; every arena slot stays
    /// referenced by at least one directory entry.
    buckets: Vec<Bucket<K, V>>,
    global_depth: u32,
}

/// A thread-safe extendible hash table.
///
/// Used by the buffer pool to map `PageId` to `FrameId`, but generic over
/// any hashable key and cloneable value. All operations serialize on one
/// internal latch; the structure is a metadata map, not a bulk store, so a
/// single lock is the right starting point.
///
/// The table never shrinks. Removals leave their bucket in place, and a
/// long-lived table that has seen many deletions may carry empty buckets.
///
/// # Example
/// ```
/// use pagepool::container::ExtendibleHashTable;
///
/// let table: ExtendibleHashTable<u32, String> = ExtendibleHashTable::new(4);
/// table.insert(1, "one".to_string());
/// assert_eq!(table.find(&1), Some("one".to_string()));
/// assert!(table.remove(&1));
/// assert_eq!(table.find(&1), None);
/// ```
pub struct ExtendibleHashTable<K, V, S = RandomState> {
    inner: Mutex<Table<K, V>>,
    hasher: S,
    /// Maximum entries per bucket (immutable after construction).
    bucket_size: usize,
}

impl<K: Hash + Eq, V: Clone> ExtendibleHashTable<K, V, RandomState> {
    /// Create a table whose buckets hold up to `bucket_size` entries.
    ///
    /// # Panics
    /// Panics if `bucket_size` is 0.
    pub fn new(bucket_size: usize) -> Self {
        Self::with_hasher(bucket_size, RandomState::new())
    }
}

impl<K: Hash + Eq, V: Clone, S: BuildHasher> ExtendibleHashTable<K, V, S> {
    /// Create a table with an explicit hasher.
    ///
    /// Useful in tests, where a deterministic hash makes the split sequence
    /// predictable.
    pub fn with_hasher(bucket_size: usize, hasher: S) -> Self {
        assert!(bucket_size >= 1, "bucket_size must be >= 1");

        Self {
            inner: Mutex::new(Table {
                dir: vec![0],
                buckets: vec![Bucket::new(0)],
                global_depth: 0,
            }),
            hasher,
            bucket_size,
        }
    }

    /// Directory index for a key: the low `global_depth` bits of its hash.
    fn dir_index(&self, key: &K, global_depth: u32) -> usize {
        let mut state = self.hasher.build_hasher();
        key.hash(&mut state);
        let mask = (1usize << global_depth) - 1;
        (state.finish() as usize) & mask
    }

    /// Look up the value for a key.
    pub fn find(&self, key: &K) -> Option<V> {
        let table = self.inner.lock();
        let idx = self.dir_index(key, table.global_depth);
        let bucket = &table.buckets[table.dir[idx]];

        bucket
            .entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Delete any entry for the key. Returns whether one existed.
    ///
    /// Buckets are never merged afterwards.
    pub fn remove(&self, key: &K) -> bool {
        let mut table = self.inner.lock();
        let idx = self.dir_index(key, table.global_depth);
        let slot = table.dir[idx];
        let bucket = &mut table.buckets[slot];

        match bucket.entries.iter().position(|(k, _)| k == key) {
            Some(pos) => {
                bucket.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Insert a key-value pair, overwriting any existing entry for the key.
    ///
    /// A full target bucket is split and the insert retried; each split
    /// strictly thins the overfull bucket, so the loop terminates once the
    /// new entry fits.
    pub fn insert(&self, key: K, value: V) {
        let mut table = self.inner.lock();

        loop {
            let idx = self.dir_index(&key, table.global_depth);
            let slot = table.dir[idx];
            let bucket = &mut table.buckets[slot];

            if let Some(pos) = bucket.entries.iter().position(|(k, _)| *k == key) {
                bucket.entries[pos].1 = value;
                return;
            }

            if bucket.entries.len() < self.bucket_size {
                bucket.entries.push((key, value));
                return;
            }

            self.split_bucket(&mut table, slot);
        }
    }

    /// Split the bucket at arena index `old_slot`.
    fn split_bucket(&self, table: &mut Table<K, V>, old_slot: usize) {
        // A bucket already at full depth needs the directory to double
        // first: each new high-half slot mirrors its low-half counterpart.
        if table.buckets[old_slot].local_depth == table.global_depth {
            let old_len = table.dir.len();
            for i in 0..old_len {
                let aliased = table.dir[i];
                table.dir.push(aliased);
            }
            table.global_depth += 1;
        }

        let new_local = table.buckets[old_slot].local_depth + 1;
        table.buckets[old_slot].local_depth = new_local;

        let new_slot = table.buckets.len();
        table.buckets.push(Bucket::new(new_local));

        // Of the slots aliasing the old bucket, those whose new
        // distinguishing bit is set move to the new bucket.
        let split_mask = 1usize << (new_local - 1);
        for i in 0..table.dir.len() {
            if table.dir[i] == old_slot && (i & split_mask) != 0 {
                table.dir[i] = new_slot;
            }
        }

        // Rehash the old bucket's entries across the two halves.
        let entries = std::mem::take(&mut table.buckets[old_slot].entries);
        for (k, v) in entries {
            let idx = self.dir_index(&k, table.global_depth);
            let target = table.dir[idx];
            table.buckets[target].entries.push((k, v));
        }
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    /// Number of hash bits used to index the directory.
    pub fn global_depth(&self) -> u32 {
        self.inner.lock().global_depth
    }

    /// Local depth of the bucket referenced by the given directory slot.
    ///
    /// # Panics
    /// Panics if `dir_index` is out of range for the current directory.
    pub fn local_depth(&self, dir_index: usize) -> u32 {
        let table = self.inner.lock();
        assert!(
            dir_index < table.dir.len(),
            "directory index {} out of range",
            dir_index
        );
        table.buckets[table.dir[dir_index]].local_depth
    }

    /// Total number of buckets allocated so far.
    pub fn num_buckets(&self) -> usize {
        self.inner.lock().buckets.len()
    }

    /// Number of entries in the table.
    pub fn len(&self) -> usize {
        let table = self.inner.lock();
        table.buckets.iter().map(|b| b.entries.len()).sum()
    }

    /// Check whether the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
