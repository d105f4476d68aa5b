use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Diagnostic counters, one per kind of event named in the design.
///
/// Read with [`TimerWheel::stats`](crate::TimerWheel::stats); the exact
/// text format of `Display` is not a stability contract, only the fact
/// that it's a human-readable key/value listing is.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stats {
    pub added: u64,
    pub expired: u64,
    pub timer_loop: u64,
    pub add_expired: u64,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "added: {}", self.added)?;
        writeln!(f, "expired: {}", self.expired)?;
        writeln!(f, "timer_loop: {}", self.timer_loop)?;
        write!(f, "add_expired: {}", self.add_expired)
    }
}

#[derive(Debug, Default)]
pub(crate) struct AtomicStats {
    pub added: AtomicU64,
    pub expired: AtomicU64,
    pub timer_loop: AtomicU64,
    pub add_expired: AtomicU64,
}

impl AtomicStats {
    pub(crate) fn snapshot(&self) -> Stats {
        Stats {
            added: self.added.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            timer_loop: self.timer_loop.load(Ordering::Relaxed),
            add_expired: self.add_expired.load(Ordering::Relaxed),
        }
    }
}
