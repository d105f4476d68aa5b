//! A hashed, single-level timer wheel: a fire-and-forget expiry ring for
//! large numbers of short-to-medium-lived timers.
//!
//! Each of the wheel's `size` slots (a power of two) owns its own mutex and
//! a bag of timer nodes. `add` takes only the destination slot's lock;
//! `tick` advances the wheel one tick at a time, draining one slot under its
//! lock, then walking the detached nodes with no lock held. A node whose
//! true expiry outlives the tick it was drained on (it "looped" around the
//! wheel without firing) is re-inserted into the slot its expiry now maps
//! to; everything else fires.
//!
//! Exactly one thread is expected to call [`TimerWheel::tick`] — the
//! design permits serializing tick calls at the caller rather than inside
//! the wheel.

mod config;
mod error;
mod stats;

pub use config::HtwConfig;
pub use error::HtwError;
pub use stats::Stats;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, trace, warn};
use parking_lot::Mutex;

use stats::AtomicStats;

/// One scheduled firing: its absolute expiry in nanoseconds and the
/// caller's opaque value.
struct Node<V> {
    expiry: u64,
    value: V,
}

type FireCb<V> = Box<dyn FnMut(V) + Send>;

/// A hashed timer wheel. See the crate-level docs for the tick/add
/// locking discipline.
pub struct TimerWheel<V> {
    slots: Vec<Mutex<VecDeque<Node<V>>>>,
    size: u32,
    mask: u32,
    tick_resolution: u64,
    /// Tick count, not a nanosecond timestamp, despite living alongside
    /// nanosecond fields elsewhere in the wheel — named explicitly to avoid
    /// the unit ambiguity the original's `current_tick` field name invited.
    current_tick: AtomicU64,
    callback: Mutex<FireCb<V>>,
    stats: AtomicStats,
}

impl<V> TimerWheel<V> {
    /// Create a wheel with the default configuration
    /// (`size == 0` -> 256 slots, `tick_resolution_ns == 0` -> 1000ns).
    pub fn new<F>(callback: F) -> Self
    where
        F: FnMut(V) + Send + 'static,
    {
        Self::with_config(HtwConfig::default(), callback)
    }

    /// Create a wheel from a fully specified [`HtwConfig`]. Non-power-of-two
    /// sizes are rounded up.
    pub fn with_config<F>(config: HtwConfig, callback: F) -> Self
    where
        F: FnMut(V) + Send + 'static,
    {
        let size = config.resolved_size();
        let tick_resolution = config.resolved_tick_resolution_ns();
        debug!(
            "creating timer wheel: {} slots, {}ns tick resolution",
            size, tick_resolution
        );
        let mut slots = Vec::with_capacity(size as usize);
        for _ in 0..size {
            slots.push(Mutex::new(VecDeque::new()));
        }
        TimerWheel {
            slots,
            size,
            mask: size - 1,
            tick_resolution,
            current_tick: AtomicU64::new(0),
            callback: Mutex::new(Box::new(callback)),
            stats: AtomicStats::default(),
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn tick_resolution_ns(&self) -> u64 {
        self.tick_resolution
    }

    /// Read a snapshot of the diagnostic counters.
    pub fn stats(&self) -> Stats {
        self.stats.snapshot()
    }

    fn slot_for_tick(&self, tick: u64) -> usize {
        (tick & self.mask as u64) as usize
    }

    fn fire(&self, value: V) {
        let mut cb = self.callback.lock();
        (*cb)(value);
    }

    /// Schedule `callback(value)` after at least `delay_ns`. `delay_ns == 0`
    /// is a no-op success, matching the original (it still counts toward
    /// the `added` stat, it just never reaches a slot).
    pub fn add(&self, delay_ns: u64, value: V) {
        self.stats.added.fetch_add(1, Ordering::Relaxed);
        if delay_ns == 0 {
            return;
        }

        let ticks_delay = (delay_ns + self.tick_resolution - 1) / self.tick_resolution;
        let tick_before = self.current_tick.load(Ordering::Relaxed);
        let expiry_tick = tick_before + ticks_delay;
        let expiry_ns = expiry_tick * self.tick_resolution;
        let slot_idx = self.slot_for_tick(expiry_tick);

        let mut slot = self.slots[slot_idx].lock();
        // The wheel may have ticked past `expiry_tick` while we computed it
        // and waited for the slot lock; in that case the timer would be a
        // full revolution late if we enqueued it, so fire it immediately
        // instead and don't count it as a normal expiry.
        let tick_now = self.current_tick.load(Ordering::Relaxed);
        if tick_now > tick_before {
            drop(slot);
            trace!("timer raced the wheel past its own expiry tick; firing inline");
            self.fire(value);
            self.stats.add_expired.fetch_add(1, Ordering::Relaxed);
            return;
        }

        slot.push_back(Node { expiry: expiry_ns, value });
    }

    /// Advance the wheel so every timer with expiry `<= now_ns` fires.
    /// Returns the count fired. Never rewinds: `now_ns` mapping to a tick
    /// behind the wheel's current tick is a no-op, not an error.
    pub fn tick(&self, now_ns: u64) -> Result<u64, HtwError> {
        if self.slots.is_empty() {
            return Err(HtwError::Uninitialized);
        }

        let target_tick = now_ns / self.tick_resolution;
        let mut tick = self.current_tick.load(Ordering::Relaxed);
        if target_tick < tick {
            return Ok(0);
        }

        let mut expired = 0u64;
        while tick <= target_tick {
            let slot_idx = self.slot_for_tick(tick);
            let drained: VecDeque<Node<V>> = {
                let mut slot = self.slots[slot_idx].lock();
                std::mem::take(&mut *slot)
            };

            for node in drained {
                if node.expiry <= now_ns {
                    self.fire(node.value);
                    expired += 1;
                } else {
                    // Outlived this revolution: put it back where its true
                    // expiry now maps to and keep waiting.
                    let new_tick = node.expiry / self.tick_resolution;
                    let new_slot = self.slot_for_tick(new_tick);
                    self.slots[new_slot].lock().push_back(node);
                    self.stats.timer_loop.fetch_add(1, Ordering::Relaxed);
                }
            }

            self.current_tick.fetch_add(1, Ordering::Relaxed);
            tick += 1;
        }

        self.stats.expired.fetch_add(expired, Ordering::Relaxed);
        Ok(expired)
    }

    /// Consume the wheel. If `run_callbacks` is true, invoke the expiry
    /// callback on every still-queued value first; either way, every timer
    /// node and the wheel itself is freed once this returns.
    pub fn destroy(self, run_callbacks: bool) {
        if !run_callbacks {
            let still_queued: usize = self.slots.iter().map(|s| s.lock().len()).sum();
            if still_queued > 0 {
                warn!(
                    "destroying timer wheel with {} queued timer(s) and run_callbacks=false; \
                     their values will be dropped without firing",
                    still_queued
                );
            }
            return;
        }
        for slot in &self.slots {
            let drained: VecDeque<Node<V>> = std::mem::take(&mut *slot.lock());
            for node in drained {
                self.fire(node.value);
            }
        }
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
    fn htw_a_fires_once_past_expiry() {
        init_log();
        let (cb, fired) = recording_cb::<u32>();
        let tw = TimerWheel::with_config(HtwConfig { size: 16, tick_resolution_ns: 1_000_000 }, cb);
        tw.add(500_000, 42);
        assert_eq!(tw.tick(1_000_000).unwrap(), 1);
        assert_eq!(*fired.lock().unwrap(), vec![42]);
    }

    #[test]
    fn htw_b_fires_in_tick_order() {
        let (cb, fired) = recording_cb::<u32>();
        let tw = TimerWheel::with_config(HtwConfig { size: 64, tick_resolution_ns: 1_000 }, cb);
        tw.add(3_000, 3);
        tw.add(1_000, 1);
        tw.add(2_000, 2);

        assert_eq!(tw.tick(1_000).unwrap(), 1);
        assert_eq!(tw.tick(2_000).unwrap(), 1);
        assert_eq!(tw.tick(3_000).unwrap(), 1);
        assert_eq!(tw.tick(4_000).unwrap(), 0);
        assert_eq!(*fired.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn htw_c_long_timer_loops_once_then_fires() {
        let (cb, fired) = recording_cb::<u32>();
        let tw = TimerWheel::with_config(HtwConfig { size: 16, tick_resolution_ns: 1_000 }, cb);
        tw.add(21_000, 77);

        for t in 1..=20 {
            assert_eq!(tw.tick(t * 1_000).unwrap(), 0);
        }
        assert_eq!(tw.stats().timer_loop, 1);
        assert_eq!(tw.tick(21_000).unwrap(), 1);
        assert_eq!(*fired.lock().unwrap(), vec![77]);
    }

    #[test]
    fn zero_delay_is_a_noop_but_still_counted() {
        let (cb, fired) = recording_cb::<u32>();
        let tw = TimerWheel::new(cb);
        tw.add(0, 99);
        assert!(fired.lock().unwrap().is_empty());
        assert_eq!(tw.stats().added, 1);
        assert_eq!(tw.tick(1_000_000).unwrap(), 0);
    }

    #[test]
    fn tick_never_rewinds() {
        let (cb, _fired) = recording_cb::<u32>();
        let tw = TimerWheel::with_config(HtwConfig { size: 16, tick_resolution_ns: 1_000 }, cb);
        assert_eq!(tw.tick(5_000).unwrap(), 0);
        assert_eq!(tw.tick(1_000).unwrap(), 0);
    }

    #[test]
    fn destroy_without_callbacks_drops_silently() {
        let (cb, fired) = recording_cb::<u32>();
        let tw = TimerWheel::with_config(HtwConfig { size: 16, tick_resolution_ns: 1_000 }, cb);
        tw.add(50_000, 1);
        tw.destroy(false);
        assert!(fired.lock().unwrap().is_empty());
    }

    #[test]
    fn destroy_with_callbacks_fires_everything_queued() {
        let (cb, fired) = recording_cb::<u32>();
        let tw = TimerWheel::with_config(HtwConfig { size: 16, tick_resolution_ns: 1_000 }, cb);
        tw.add(50_000, 1);
        tw.add(60_000, 2);
        tw.destroy(true);
        let mut got = fired.lock().unwrap().clone();
        got.sort();
        assert_eq!(got, vec![1, 2]);
    }
}
