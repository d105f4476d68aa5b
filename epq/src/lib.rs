//! A lock-protected binary min-heap of deadline-ordered, handle-addressable
//! items: the expiring priority queue.
//!
//! A single mutex guards a 0-indexed binary heap keyed by absolute
//! expiration. Plain `insert`/`expire` hide the heap's item handles
//! entirely; the advanced handle API (`item_create`/`item_insert`/
//! `item_remove`/`item_resched`) exposes them so a caller can hold on to an
//! already-queued item and remove or reschedule it in O(log n) without
//! walking the heap.
//!
//! Handles are a thin, `Copy`able wrapper around a raw pointer into a
//! heap-allocated [`Item`], mirroring the original's `struct pq_item *`: the
//! queue takes ownership of the pointee the moment `item_insert` succeeds,
//! and hands it back (conceptually) the moment `item_remove` returns. The
//! type system doesn't enforce this hand-off — matching the pointer
//! semantics it's ported from — so passing a handle to the wrong queue, or
//! using one twice after `item_destroy`, is a programmer error the original
//! only catches with an assertion, and so does this port (`debug_assert!`).

mod config;
mod error;
mod stats;

pub use config::EpqConfig;
pub use error::EpqError;
pub use stats::Stats;

use std::ptr::NonNull;

use log::{debug, trace};
use parking_lot::Mutex;

use stats::AtomicStats;

/// One queued (or about-to-be-queued) element: its absolute expiration, the
/// caller's value, and its current slot in the heap array.
struct Item<V> {
    expire: u64,
    value: V,
    idx: usize,
}

/// A durable, `Copy`able reference to an item allocated via
/// [`ExpiringPriorityQueue::item_create`].
///
/// Valid from creation until the matching `item_destroy` call; while the
/// queue owns it (between a successful `item_insert` and the matching
/// `item_remove`/expiry), it additionally identifies that item's current
/// heap slot for O(log n) operations.
pub struct ItemHandle<V> {
    ptr: NonNull<Item<V>>,
}

impl<V> Clone for ItemHandle<V> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<V> Copy for ItemHandle<V> {}

// SAFETY: an `ItemHandle` is only ever dereferenced while the queue's single
// mutex is held (or, for item_create/item_destroy, while no queue holds a
// reference at all), so sending the pointer across threads is sound exactly
// when `V` itself is.
unsafe impl<V: Send> Send for ItemHandle<V> {}

type ExpireCb<V> = Box<dyn FnMut(V) + Send>;

struct HeapState<V> {
    items: Vec<Box<Item<V>>>,
    expire_cb: Option<ExpireCb<V>>,
}

impl<V> HeapState<V> {
    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if self.items[idx].expire < self.items[parent].expire {
                self.items.swap(idx, parent);
                self.items[idx].idx = idx;
                self.items[parent].idx = parent;
                idx = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        let len = self.items.len();
        loop {
            let left = 2 * idx + 1;
            let right = 2 * idx + 2;
            let mut smallest = idx;
            if left < len && self.items[left].expire < self.items[smallest].expire {
                smallest = left;
            }
            if right < len && self.items[right].expire < self.items[smallest].expire {
                smallest = right;
            }
            if smallest == idx {
                break;
            }
            self.items.swap(idx, smallest);
            self.items[idx].idx = idx;
            self.items[smallest].idx = smallest;
            idx = smallest;
        }
    }

    /// Grow the backing array by doubling if it's full. Leaves `items`
    /// untouched on failure.
    fn reserve_for_one_more(&mut self, stats: &AtomicStats) -> Result<(), EpqError> {
        if self.items.len() < self.items.capacity() {
            return Ok(());
        }
        let additional = self.items.capacity().max(1);
        match self.items.try_reserve(additional) {
            Ok(()) => {
                stats.double_size.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                Ok(())
            }
            Err(_) => {
                stats
                    .double_size_fail
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                Err(EpqError::OutOfMemory)
            }
        }
    }

    /// Push an already-boxed item onto the heap and restore the invariant.
    /// Caller must have reserved capacity first.
    fn push(&mut self, mut boxed: Box<Item<V>>) {
        let idx = self.items.len();
        boxed.idx = idx;
        self.items.push(boxed);
        self.sift_up(idx);
    }

    /// Remove the item at `idx`, restoring the invariant, and hand its box
    /// back to the caller (who already holds the equivalent `ItemHandle`).
    fn remove_at(&mut self, idx: usize) -> Box<Item<V>> {
        let removed = self.items.swap_remove(idx);
        if idx < self.items.len() {
            self.items[idx].idx = idx;
            let parent = idx.checked_sub(1).map(|p| p / 2);
            let smaller_than_parent =
                parent.map_or(false, |p| self.items[idx].expire < self.items[p].expire);
            if idx > 0 && smaller_than_parent {
                self.sift_up(idx);
            } else {
                self.sift_down(idx);
            }
        }
        removed
    }

    /// Pop and expire up to `max` items whose expiration is `<= now`, in
    /// non-decreasing expiration order. Returns the number expired.
    fn expire(&mut self, now: u64, max: u64) -> u64 {
        let mut count = 0u64;
        while count < max {
            let due = match self.items.first() {
                Some(item) if item.expire <= now => true,
                _ => false,
            };
            if !due {
                break;
            }
            let boxed = self.remove_at(0);
            let item = *boxed;
            if let Some(cb) = self.expire_cb.as_mut() {
                cb(item.value);
            }
            count += 1;
        }
        count
    }
}

/// A deadline-ordered, handle-addressable priority queue with expiry
/// callbacks.
///
/// See the crate-level docs for the handle ownership discipline. `V` needs
/// no bounds: values are moved, never cloned, and handed to the expiry
/// callback by value exactly once.
pub struct ExpiringPriorityQueue<V> {
    state: Mutex<HeapState<V>>,
    stats: AtomicStats,
}

impl<V> ExpiringPriorityQueue<V> {
    /// Create a queue with the default configuration and no expiry
    /// callback wired in (see [`Self::with_callback`] to set one).
    pub fn new() -> Self {
        Self::with_config(EpqConfig::default(), None)
    }

    /// Create a queue that invokes `expire_cb` on every value removed by
    /// `expire`/`expire_all`/`destroy`.
    ///
    /// `expire_cb` must not call back into this queue: it runs synchronously
    /// while the queue's single mutex is held.
    pub fn with_callback<F>(expire_cb: F) -> Self
    where
        F: FnMut(V) + Send + 'static,
    {
        Self::with_config(EpqConfig::default(), Some(Box::new(expire_cb)))
    }

    /// Create a queue from a fully specified [`EpqConfig`] and an optional
    /// expiry callback.
    pub fn with_config(config: EpqConfig, expire_cb: Option<ExpireCb<V>>) -> Self {
        let capacity = config.capacity();
        debug!("creating expiring priority queue: initial capacity {}", capacity);
        ExpiringPriorityQueue {
            state: Mutex::new(HeapState {
                items: Vec::with_capacity(capacity),
                expire_cb,
            }),
            stats: AtomicStats::default(),
        }
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read a snapshot of the diagnostic counters.
    pub fn stats(&self) -> Stats {
        self.stats.snapshot()
    }

    /// Insert `value` with expiration `now + ttl`. The queue owns the new
    /// item; there is no handle to track it with unless you use
    /// [`Self::item_create`]/[`Self::item_insert`] instead.
    pub fn insert(&self, now: u64, value: V, ttl: u64) -> Result<(), EpqError> {
        let boxed = Box::new(Item {
            expire: now.saturating_add(ttl),
            value,
            idx: 0,
        });
        let mut state = self.state.lock();
        state.reserve_for_one_more(&self.stats)?;
        state.push(boxed);
        self.stats.inserts.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Ok(())
    }

    /// Pop and expire up to `max` items whose expiration is `<= now`, in
    /// non-decreasing expiration order, invoking the callback on each.
    /// `max == 0` is a no-op.
    pub fn expire(&self, now: u64, max: u64) -> u64 {
        if max == 0 {
            return 0;
        }
        let count = self.state.lock().expire(now, max);
        if count > 0 {
            trace!("expired {} items at t={}", count, now);
        }
        self.stats.expires.fetch_add(count, std::sync::atomic::Ordering::Relaxed);
        count
    }

    /// Equivalent to `expire(now, u64::MAX)`.
    pub fn expire_all(&self, now: u64) -> u64 {
        self.expire(now, u64::MAX)
    }

    /// Allocate a free-standing item not yet owned by any queue.
    pub fn item_create(&self, expire: u64, value: V) -> ItemHandle<V> {
        let boxed = Box::new(Item { expire, value, idx: 0 });
        let ptr = Box::into_raw(boxed);
        // SAFETY: `Box::into_raw` never returns null.
        ItemHandle { ptr: unsafe { NonNull::new_unchecked(ptr) } }
    }

    /// Free a handle's storage. Must not be called while the queue still
    /// owns the item (i.e. after a successful `item_insert` and before the
    /// matching `item_remove`/expiry) — doing so is a programmer error.
    pub fn item_destroy(&self, handle: ItemHandle<V>) {
        // SAFETY: caller contract per the type's doc comment.
        unsafe {
            drop(Box::from_raw(handle.ptr.as_ptr()));
        }
    }

    /// Hand ownership of a free-standing handle to the queue.
    pub fn item_insert(&self, handle: ItemHandle<V>) -> Result<(), EpqError> {
        let mut state = self.state.lock();
        state.reserve_for_one_more(&self.stats)?;
        // SAFETY: `handle` is not currently owned by any queue (caller
        // contract), so reclaiming it as a `Box` here is sound and unique.
        let boxed = unsafe { Box::from_raw(handle.ptr.as_ptr()) };
        state.push(boxed);
        self.stats.inserts.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Ok(())
    }

    /// Detach a still-queued item and return ownership to the caller.
    pub fn item_remove(&self, handle: ItemHandle<V>) -> Result<(), EpqError> {
        let mut state = self.state.lock();
        // SAFETY: the pointee is alive as long as the queue owns it, which
        // is the precondition for calling `item_remove` at all.
        let idx = unsafe { handle.ptr.as_ref().idx };
        if idx >= state.items.len() {
            return Err(EpqError::InvalidArgument);
        }
        debug_assert_eq!(
            state.items[idx].as_ref() as *const Item<V>,
            handle.ptr.as_ptr() as *const Item<V>,
            "item handle's recorded index does not match this queue"
        );
        let boxed = state.remove_at(idx);
        // The item is now solely owned via `handle` again; don't drop it.
        let _ = Box::into_raw(boxed);
        self.stats.removes.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Ok(())
    }

    /// Remove, re-stamp with a new expiration, and reinsert `handle`, all
    /// while holding the queue's single lock — no other caller observes the
    /// item in a removed-but-not-yet-reinserted state.
    pub fn item_resched(&self, now: u64, handle: ItemHandle<V>, new_ttl: u64) -> Result<(), EpqError> {
        let mut state = self.state.lock();
        let idx = unsafe { handle.ptr.as_ref().idx };
        if idx >= state.items.len() {
            return Err(EpqError::InvalidArgument);
        }
        let mut boxed = state.remove_at(idx);
        if let Err(e) = state.reserve_for_one_more(&self.stats) {
            // Leave the item detached but intact and reachable via `handle`,
            // exactly as a bare `item_remove` would: no partial mutation of
            // the item itself, just like every other failure path here.
            let _ = Box::into_raw(boxed);
            return Err(e);
        }
        boxed.expire = now.saturating_add(new_ttl);
        state.push(boxed);
        self.stats.reschedules.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Ok(())
    }

    /// Read the value stored in a still-queued or free-standing handle.
    ///
    /// Mirrors `pq_item_value`; requires `V: Clone` because the queue may
    /// still own the item and must not give out a reference that outlives
    /// the lock.
    pub fn item_value(&self, handle: ItemHandle<V>) -> V
    where
        V: Clone,
    {
        unsafe { handle.ptr.as_ref().value.clone() }
    }
}

impl<V> Drop for ExpiringPriorityQueue<V> {
    /// Expire everything (`now = u64::MAX`, invoking the callback on each
    /// remaining value), then drop the backing storage.
    fn drop(&mut self) {
        self.state.lock().expire(u64::MAX, u64::MAX);
    }
}

impl<V> Default for ExpiringPriorityQueue<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};

    fn init_log() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn recording_cb<V: Send + 'static>() -> (impl FnMut(V) + Send, Arc<StdMutex<Vec<V>>>) {
        let fired = Arc::new(StdMutex::new(Vec::new()));
        let sink = fired.clone();
        (move |v: V| sink.lock().unwrap().push(v), fired)
    }

    #[test]
    fn epq_a_single_item_fires_once() {
        init_log();
        let (cb, fired) = recording_cb::<u32>();
        let q = ExpiringPriorityQueue::with_callback(cb);
        q.insert(0, 42, 0).unwrap();
        assert_eq!(q.expire(0, 0), 0);
        assert_eq!(q.expire(1, 1), 1);
        assert_eq!(*fired.lock().unwrap(), vec![42]);
        assert_eq!(q.expire(1, 1), 0);
    }

    #[test]
    fn epq_b_expire_all_drains_everything_due() {
        let (cb, fired) = recording_cb::<u32>();
        let q = ExpiringPriorityQueue::with_callback(cb);
        q.insert(0, 1, 42).unwrap();
        q.insert(10, 2, 142).unwrap();
        q.insert(20, 3, 8888).unwrap();
        assert_eq!(q.expire_all(10), 0);
        assert_eq!(q.expire_all(10000), 3);
        assert_eq!(fired.lock().unwrap().len(), 3);
    }

    #[test]
    fn epq_c_resched_delays_expiry() {
        let (cb, fired) = recording_cb::<Option<u32>>();
        let q = ExpiringPriorityQueue::with_callback(cb);
        let h = q.item_create(10, None);
        q.item_insert(h).unwrap();
        q.item_resched(20, h, 20).unwrap();
        assert_eq!(q.expire_all(30), 0);
        assert_eq!(q.expire_all(50), 1);
        assert_eq!(fired.lock().unwrap().len(), 1);
    }

    #[test]
    fn heap_root_is_always_the_minimum() {
        let q: ExpiringPriorityQueue<u32> = ExpiringPriorityQueue::new();
        for (i, ttl) in [50u64, 10, 30, 5, 90, 1].into_iter().enumerate() {
            q.insert(0, i as u32, ttl).unwrap();
        }
        let state = q.state.lock();
        let min = state.items.iter().map(|it| it.expire).min().unwrap();
        assert_eq!(state.items[0].expire, min);
    }

    #[test]
    fn expire_respects_max_and_ordering() {
        let fired = Arc::new(StdMutex::new(Vec::new()));
        let sink = fired.clone();
        let q = ExpiringPriorityQueue::with_callback(move |v: u64| sink.lock().unwrap().push(v));
        for ttl in [5u64, 1, 3, 2, 4] {
            q.insert(0, ttl, ttl).unwrap();
        }
        assert_eq!(q.expire(2, 2), 2);
        assert_eq!(*fired.lock().unwrap(), vec![1, 2]);
        assert_eq!(q.expire(100, 100), 3);
        assert_eq!(*fired.lock().unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn item_remove_returns_ownership_and_stops_counting_it() {
        let q: ExpiringPriorityQueue<&'static str> = ExpiringPriorityQueue::new();
        let h = q.item_create(5, "later");
        q.item_insert(h).unwrap();
        assert_eq!(q.len(), 1);
        q.item_remove(h).unwrap();
        assert_eq!(q.len(), 0);
        assert_eq!(q.expire_all(1000), 0);
        q.item_destroy(h);
    }

    #[test]
    fn destroy_fires_remaining_items() {
        let fired = Arc::new(StdMutex::new(Vec::new()));
        let sink = fired.clone();
        {
            let q = ExpiringPriorityQueue::with_callback(move |v: u32| sink.lock().unwrap().push(v));
            q.insert(0, 1, 10).unwrap();
            q.insert(0, 2, 20).unwrap();
        }
        let mut got = fired.lock().unwrap().clone();
        got.sort();
        assert_eq!(got, vec![1, 2]);
    }
}
