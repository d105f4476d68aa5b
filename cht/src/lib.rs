//! A resizable concurrent hash table with lock-per-bucket concurrency.
//!
//! Each bucket owns its own `parking_lot::RwLock`-guarded chain. Growth is
//! an online, non-blocking doubling-rehash: the table snapshots its current
//! bucket array as `old`, allocates a doubled array as the new `current`,
//! and every subsequent operation migrates a bounded number of entries from
//! `old` into `current` before doing its own work. Readers, writers and the
//! migrator all coexist; the only moment any operation is excluded is the
//! instant the bucket arrays themselves are swapped, which waits for every
//! in-flight operation to finish first.
//!
//! Values must be `Clone`: `lookup`-shaped operations hand back an owned
//! copy rather than a guard, so no lock is held past the call returning.
//! This mirrors the original's `void *` return — readable by the caller
//! after the call, with no notion of borrowing the table's internals.

mod config;
mod error;
mod stats;
mod table;

pub use config::{ChtConfig, DEFAULT_BUCKET_COUNT, DEFAULT_MIGRATION_STEP};
pub use error::ChtError;
pub use stats::Stats;

use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, trace, warn};
use parking_lot::RwLock;

use config::HashFn;
use stats::AtomicStats;
use table::{head_mark, lookup_locked, remove_locked, try_box_slice, Entry, Table, TableState};

/// A concurrent key → value map with incremental, cooperative resize.
///
/// See the crate-level docs for the resize discipline. Every public method
/// that invokes no user code may be called from any number of threads at
/// once; the callbacks this crate itself never invokes any (unlike
/// [`epq`](https://docs.rs/epq) or [`htw`](https://docs.rs/htw)) since a
/// lookup table has nothing to fire.
pub struct ConcurrentHashTable<V> {
    state: RwLock<TableState<V>>,
    hash_fn: HashFn,
    migration_step: usize,
    resize_in_progress: AtomicBool,
    stats: AtomicStats,
}

impl<V> ConcurrentHashTable<V> {
    /// Create a table with the default configuration
    /// (`bucket_count <= 0` → [`DEFAULT_BUCKET_COUNT`], default hash).
    pub fn new() -> Self {
        Self::with_config(ChtConfig::default())
    }

    /// Create a table with an explicit bucket count; `0` selects the default.
    pub fn with_bucket_count(bucket_count: usize) -> Self {
        Self::with_config(ChtConfig::with_bucket_count(bucket_count))
    }

    /// Create a table from a fully specified [`ChtConfig`].
    pub fn with_config(config: ChtConfig) -> Self {
        let bucket_count = if config.bucket_count == 0 {
            DEFAULT_BUCKET_COUNT
        } else {
            config.bucket_count
        };
        let max_chain_depth = config.max_chain_depth_for(bucket_count);
        debug!(
            "creating concurrent hash table: {} buckets, max chain depth {}",
            bucket_count, max_chain_depth
        );
        ConcurrentHashTable {
            state: RwLock::new(TableState {
                current: Table::new(bucket_count, max_chain_depth),
                old: None,
            }),
            hash_fn: config.hash_fn,
            migration_step: if config.migration_step == 0 {
                DEFAULT_MIGRATION_STEP
            } else {
                config.migration_step
            },
            resize_in_progress: AtomicBool::new(false),
            stats: AtomicStats::default(),
        }
    }

    /// Number of buckets in the live table (not counting any `old` table
    /// still being drained).
    pub fn bucket_count(&self) -> usize {
        self.state.read().current.bucket_count
    }

    /// Number of live entries across the current table and any `old` table
    /// still being migrated.
    pub fn len(&self) -> usize {
        let guard = self.state.read();
        guard.current.live_entry_count() + guard.old.as_ref().map_or(0, |t| t.live_entry_count())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read a snapshot of the diagnostic counters.
    pub fn stats(&self) -> Stats {
        self.stats.snapshot()
    }

    /// Cooperatively migrate up to `max_steps` entries from the `old` table
    /// into `current`. Called implicitly at the top of every public
    /// operation with the configured default step count; exposed here so a
    /// caller can drive migration to completion explicitly (e.g. between
    /// request bursts) instead of paying for it opportunistically.
    pub fn gc(&self, max_steps: usize) -> usize {
        let (moved, completed) = {
            let guard = self.state.read();
            let old = match guard.old.as_ref() {
                Some(old) => old,
                None => return 0,
            };

            if old
                .migrating
                .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_err()
            {
                // Another thread is already migrating this generation; skip.
                return 0;
            }

            let mut moved = 0usize;
            while moved < max_steps {
                let idx = old.gc_index.load(Ordering::Relaxed);
                if idx >= old.bucket_count {
                    break;
                }

                let mut old_head = old.buckets[idx].head.write();
                match old_head.take() {
                    None => {
                        drop(old_head);
                        old.gc_index.fetch_add(1, Ordering::Relaxed);
                    }
                    Some(mut entry) => {
                        let rest = entry.next.take();
                        *old_head = rest;
                        old.buckets[idx].len.fetch_sub(1, Ordering::Relaxed);
                        drop(old_head);

                        let dest = guard.current.bucket_for(entry.hash);
                        let mut dest_head = dest.head.write();
                        entry.next = dest_head.take();
                        *dest_head = Some(entry);
                        dest.len.fetch_add(1, Ordering::Relaxed);
                        drop(dest_head);
                        moved += 1;
                    }
                }
            }

            old.migrating.store(false, Ordering::Release);
            (moved, old.gc_index.load(Ordering::Relaxed) >= old.bucket_count)
        };

        if completed {
            let mut guard = self.state.write();
            let still_done = guard
                .old
                .as_ref()
                .map_or(false, |o| o.gc_index.load(Ordering::Relaxed) >= o.bucket_count);
            if still_done {
                trace!("migration complete, retiring old table");
                guard.old = None;
            }
        }

        moved
    }

    fn try_begin_resize(&self) {
        if self
            .resize_in_progress
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return;
        }

        let mut guard = self.state.write();
        if guard.old.is_some() {
            // A previous migration hasn't finished; too many double-sizes
            // too fast. Leave the table at its current size.
            warn!("resize requested while a migration is still in progress; skipping");
            self.stats.double_size_fail.fetch_add(1, Ordering::Relaxed);
            self.resize_in_progress.store(false, Ordering::Release);
            return;
        }

        let new_bucket_count = guard.current.bucket_count.saturating_mul(2);
        let max_chain_depth = substrate_toolbox::isqrt(new_bucket_count as u64).max(1) as usize;
        debug!(
            "doubling hash table from {} to {} buckets",
            guard.current.bucket_count, new_bucket_count
        );
        let new_table = Table::new(new_bucket_count, max_chain_depth);
        let old_table = std::mem::replace(&mut guard.current, new_table);
        guard.old = Some(old_table);
        self.stats.double_size.fetch_add(1, Ordering::Relaxed);
        self.resize_in_progress.store(false, Ordering::Release);
    }

    /// Insert a new entry. Duplicate keys are never rejected or merged:
    /// both remain in the chain, and `lookup` will return the most recently
    /// inserted one, since new entries are always prepended.
    pub fn insert(&self, key: &[u8], value: V) -> Result<(), ChtError> {
        if key.is_empty() {
            return Err(ChtError::InvalidArgument);
        }
        self.gc(self.migration_step);

        let hash = (self.hash_fn)(key);
        let boxed_key = try_box_slice(key)?;
        let mut entry = Box::new(Entry {
            hash,
            key: boxed_key,
            value,
            next: None,
        });

        let exceeded = {
            let guard = self.state.read();
            let bucket = guard.current.bucket_for(hash);
            let mut head = bucket.head.write();
            let had_collision = head.is_some();
            entry.next = head.take();
            *head = Some(entry);
            bucket.len.fetch_add(1, Ordering::Relaxed);
            let depth = bucket.len.load(Ordering::Relaxed);
            drop(head);

            if had_collision {
                self.stats.collisions.fetch_add(1, Ordering::Relaxed);
            }
            depth > guard.current.max_chain_depth
        };

        self.stats.inserts.fetch_add(1, Ordering::Relaxed);
        if exceeded {
            self.try_begin_resize();
        }
        Ok(())
    }

    /// Remove the first matching entry, searching the current table and
    /// then (if a migration is underway) the `old` table. Returns whether
    /// a matching entry was found — "not found" is a normal outcome, not
    /// an error.
    pub fn remove(&self, key: &[u8]) -> Result<bool, ChtError> {
        if key.is_empty() {
            return Err(ChtError::InvalidArgument);
        }
        self.gc(self.migration_step);

        let hash = (self.hash_fn)(key);
        let guard = self.state.read();

        {
            let bucket = guard.current.bucket_for(hash);
            let mut head = bucket.head.write();
            if remove_locked(&mut head, hash, key).is_some() {
                bucket.len.fetch_sub(1, Ordering::Relaxed);
                drop(head);
                self.stats.removes.fetch_add(1, Ordering::Relaxed);
                return Ok(true);
            }
        }

        if let Some(old) = guard.old.as_ref() {
            let bucket = old.bucket_for(hash);
            let mut head = bucket.head.write();
            if remove_locked(&mut head, hash, key).is_some() {
                bucket.len.fetch_sub(1, Ordering::Relaxed);
                drop(head);
                self.stats.removes.fetch_add(1, Ordering::Relaxed);
                return Ok(true);
            }
        }

        Ok(false)
    }
}

impl<V: Clone> ConcurrentHashTable<V> {
    /// Look up a key, searching the current table first and the `old`
    /// table (if a migration is underway) second.
    pub fn lookup(&self, key: &[u8]) -> Option<V> {
        if key.is_empty() {
            return None;
        }
        self.gc(self.migration_step);
        self.stats.lookups.fetch_add(1, Ordering::Relaxed);

        let hash = (self.hash_fn)(key);
        let guard = self.state.read();

        let bucket = guard.current.bucket_for(hash);
        if let Some(v) = lookup_locked(&bucket.head.read(), hash, key) {
            return Some(v);
        }

        if let Some(old) = guard.old.as_ref() {
            let bucket = old.bucket_for(hash);
            if let Some(v) = lookup_locked(&bucket.head.read(), hash, key) {
                return Some(v);
            }
        }

        None
    }

    /// Get the existing value for `key`, or insert `value` and return it.
    ///
    /// Safe against a competing `lookup_insert` on the same key: exactly one
    /// caller's value is installed and returned by everyone; the losing
    /// candidate is simply dropped.
    pub fn lookup_insert(&self, key: &[u8], value: V) -> Result<V, ChtError> {
        if key.is_empty() {
            return Err(ChtError::InvalidArgument);
        }
        self.gc(self.migration_step);
        self.stats.lookups.fetch_add(1, Ordering::Relaxed);

        let hash = (self.hash_fn)(key);
        let guard = self.state.read();

        if let Some(old) = guard.old.as_ref() {
            let bucket = old.bucket_for(hash);
            if let Some(v) = lookup_locked(&bucket.head.read(), hash, key) {
                return Ok(v);
            }
        }

        let bucket = guard.current.bucket_for(hash);

        {
            let head = bucket.head.write();
            if let Some(v) = lookup_locked(&head, hash, key) {
                return Ok(v);
            }
        }

        // Allocating a node is comparatively expensive; do it with the
        // bucket unlocked, then re-validate nothing raced us before
        // splicing the candidate in.
        let boxed_key = try_box_slice(key)?;
        let mut candidate = Box::new(Entry {
            hash,
            key: boxed_key,
            value: value.clone(),
            next: None,
        });

        let mut bak = head_mark(&bucket.head.read());
        loop {
            let mut head = bucket.head.write();
            if head_mark(&head) != bak {
                // Something else touched this bucket while we were
                // allocating. Re-check: we may have just lost the race on
                // this very key.
                if let Some(v) = lookup_locked(&head, hash, &candidate.key) {
                    return Ok(v);
                }
                bak = head_mark(&head);
                continue;
            }

            let had_collision = head.is_some();
            candidate.next = head.take();
            let result = candidate.value.clone();
            *head = Some(candidate);
            bucket.len.fetch_add(1, Ordering::Relaxed);
            let depth = bucket.len.load(Ordering::Relaxed);
            drop(head);

            if had_collision {
                self.stats.collisions.fetch_add(1, Ordering::Relaxed);
            }
            self.stats.inserts.fetch_add(1, Ordering::Relaxed);
            let exceeded = depth > guard.current.max_chain_depth;
            drop(guard);
            if exceeded {
                self.try_begin_resize();
            }
            return Ok(result);
        }
    }
}

impl<V> Default for ConcurrentHashTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_log() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn insert_then_lookup() {
        init_log();
        let t = ConcurrentHashTable::new();
        t.insert(b"alpha", 1).unwrap();
        t.insert(b"beta", 2).unwrap();
        assert_eq!(t.lookup(b"alpha"), Some(1));
        assert_eq!(t.lookup(b"beta"), Some(2));
        assert_eq!(t.lookup(b"gamma"), None);
    }

    #[test]
    fn empty_key_is_rejected() {
        let t: ConcurrentHashTable<i32> = ConcurrentHashTable::new();
        assert!(matches!(t.insert(b"", 1), Err(ChtError::InvalidArgument)));
        assert!(matches!(t.remove(b""), Err(ChtError::InvalidArgument)));
    }

    #[test]
    fn duplicate_insert_returns_most_recent() {
        let t = ConcurrentHashTable::new();
        t.insert(b"k", 1).unwrap();
        t.insert(b"k", 2).unwrap();
        // Both remain in the chain; lookup returns the most recently
        // inserted one because new entries are prepended.
        assert_eq!(t.lookup(b"k"), Some(2));
    }

    #[test]
    fn remove_reports_not_found_as_false() {
        let t = ConcurrentHashTable::new();
        t.insert(b"k", 1).unwrap();
        assert_eq!(t.remove(b"k").unwrap(), true);
        assert_eq!(t.remove(b"k").unwrap(), false);
        assert_eq!(t.lookup(b"k"), None);
    }

    #[test]
    fn lookup_insert_is_get_or_create() {
        let t = ConcurrentHashTable::new();
        assert_eq!(t.lookup_insert(b"k", 1).unwrap(), 1);
        assert_eq!(t.lookup_insert(b"k", 2).unwrap(), 1);
        assert_eq!(t.lookup(b"k"), Some(1));
    }

    #[test]
    fn resize_preserves_all_live_entries() {
        init_log();
        // Small bucket count and a low chain-depth threshold force several
        // doublings over the course of the insertions below.
        let t = ConcurrentHashTable::with_config(ChtConfig::with_bucket_count(4));
        for i in 0u32..2000 {
            t.insert(&i.to_le_bytes(), i).unwrap();
        }
        // Drive any still-pending migration to completion.
        while t.gc(1024) > 0 {}

        for i in 0u32..2000 {
            assert_eq!(t.lookup(&i.to_le_bytes()), Some(i), "key {i} missing after resize");
        }
        assert!(t.stats().double_size > 0);
    }

    #[test]
    fn chain_length_invariant_holds_during_migration() {
        let t = ConcurrentHashTable::with_config(ChtConfig::with_bucket_count(4));
        for i in 0u32..500 {
            t.insert(&i.to_le_bytes(), i).unwrap();
        }
        assert_eq!(t.len(), 500);
        while t.gc(16) > 0 {}
        assert_eq!(t.len(), 500);
    }
}
