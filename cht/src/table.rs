use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::error::ChtError;

/// One entry in a bucket's chain: a precomputed hash, an owned copy of the
/// key, and the caller's opaque value. Entries are moved, never copied,
/// during migration.
pub(crate) struct Entry<V> {
    pub(crate) hash: u32,
    pub(crate) key: Box<[u8]>,
    pub(crate) value: V,
    pub(crate) next: Option<Box<Entry<V>>>,
}

/// One bucket: a chain head behind its own reader/writer lock, plus an
/// atomic length so chain-depth checks don't need to walk the chain.
pub(crate) struct Bucket<V> {
    pub(crate) head: RwLock<Option<Box<Entry<V>>>>,
    pub(crate) len: AtomicUsize,
}

impl<V> Bucket<V> {
    fn new() -> Self {
        Bucket {
            head: RwLock::new(None),
            len: AtomicUsize::new(0),
        }
    }
}

/// A bucket array plus the bookkeeping needed to act either as the live
/// table or as an `old` table being drained by cooperative migration.
pub(crate) struct Table<V> {
    pub(crate) buckets: Vec<Bucket<V>>,
    pub(crate) bucket_count: usize,
    pub(crate) max_chain_depth: usize,
    /// Next bucket index to migrate out of, when this table is `old`.
    pub(crate) gc_index: AtomicUsize,
    /// Trylock analogue: only one thread migrates a given `old` table
    /// at a time; others skip this pass rather than blocking.
    pub(crate) migrating: AtomicBool,
}

impl<V> Table<V> {
    pub(crate) fn new(bucket_count: usize, max_chain_depth: usize) -> Self {
        let mut buckets = Vec::with_capacity(bucket_count);
        for _ in 0..bucket_count {
            buckets.push(Bucket::new());
        }
        Table {
            buckets,
            bucket_count,
            max_chain_depth,
            gc_index: AtomicUsize::new(0),
            migrating: AtomicBool::new(false),
        }
    }

    pub(crate) fn bucket_for(&self, hash: u32) -> &Bucket<V> {
        &self.buckets[(hash as usize) % self.bucket_count]
    }

    pub(crate) fn live_entry_count(&self) -> usize {
        self.buckets.iter().map(|b| b.len.load(Ordering::Relaxed)).sum()
    }
}

/// Holds the current table, and — while a doubling-rehash is being drained
/// — the previous one. Swapping either field requires the write side of the
/// owning `RwLock<TableState<V>>`; reading through a bucket only requires
/// the read side, which is what every ordinary operation takes.
pub(crate) struct TableState<V> {
    pub(crate) current: Table<V>,
    pub(crate) old: Option<Table<V>>,
}

/// Walk a (locked) bucket chain looking for `key`. Works for both read and
/// write guards since both deref to `&Option<Box<Entry<V>>>`.
pub(crate) fn lookup_locked<V: Clone>(
    head: &Option<Box<Entry<V>>>,
    hash: u32,
    key: &[u8],
) -> Option<V> {
    let mut node = head;
    while let Some(entry) = node {
        if entry.hash == hash && &*entry.key == key {
            return Some(entry.value.clone());
        }
        node = &entry.next;
    }
    None
}

/// Remove the first entry matching `key` from a locked bucket, returning it.
pub(crate) fn remove_locked<V>(
    head: &mut Option<Box<Entry<V>>>,
    hash: u32,
    key: &[u8],
) -> Option<Box<Entry<V>>> {
    // Fast path: the match is the head of the chain.
    if matches!(head, Some(e) if e.hash == hash && &*e.key == key) {
        let mut entry = head.take().unwrap();
        *head = entry.next.take();
        return Some(entry);
    }

    // Otherwise walk the chain one link behind the candidate, so we can
    // splice it out once found.
    let mut prev = head;
    loop {
        let is_match = match prev.as_ref()?.next.as_deref() {
            Some(e) => e.hash == hash && &*e.key == key,
            None => return None,
        };
        if is_match {
            let mut matched = prev.as_mut()?.next.take().unwrap();
            prev.as_mut()?.next = matched.next.take();
            return Some(matched);
        }
        prev = &mut prev.as_mut()?.next;
    }
}

/// A cheap, address-based "did this chain change?" marker used by
/// `lookup_insert`'s optimistic allocate-then-validate discipline.
pub(crate) fn head_mark<V>(head: &Option<Box<Entry<V>>>) -> usize {
    head.as_deref().map_or(0, |e| e as *const Entry<V> as usize)
}

/// Copy `key` into a freshly boxed slice, reporting allocation failure
/// through a `Result` instead of the infallible-allocator assumption
/// ordinary `Vec`/`Box` construction makes.
pub(crate) fn try_box_slice(key: &[u8]) -> Result<Box<[u8]>, ChtError> {
    let mut v = Vec::new();
    v.try_reserve_exact(key.len()).map_err(|_| ChtError::OutOfMemory)?;
    v.extend_from_slice(key);
    Ok(v.into_boxed_slice())
}
