use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Diagnostic counters, one per kind of event named in the design.
///
/// Read with
/// [`ExpiringPriorityQueue::stats`](crate::ExpiringPriorityQueue::stats); the
/// exact text format of `Display` is not a stability contract, only the
/// fact that it's a human-readable key/value listing is.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stats {
    pub inserts: u64,
    pub expires: u64,
    pub reschedules: u64,
    pub removes: u64,
    pub double_size: u64,
    pub double_size_fail: u64,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "inserts: {}", self.inserts)?;
        writeln!(f, "expirations: {}", self.expires)?;
        writeln!(f, "rescheduled: {}", self.reschedules)?;
        writeln!(f, "removes: {}", self.removes)?;
        writeln!(f, "double-size: {}", self.double_size)?;
        write!(f, "failed double-size: {}", self.double_size_fail)
    }
}

#[derive(Debug, Default)]
pub(crate) struct AtomicStats {
    pub inserts: AtomicU64,
    pub expires: AtomicU64,
    pub reschedules: AtomicU64,
    pub removes: AtomicU64,
    pub double_size: AtomicU64,
    pub double_size_fail: AtomicU64,
}

impl AtomicStats {
    pub(crate) fn snapshot(&self) -> Stats {
        Stats {
            inserts: self.inserts.load(Ordering::Relaxed),
            expires: self.expires.load(Ordering::Relaxed),
            reschedules: self.reschedules.load(Ordering::Relaxed),
            removes: self.removes.load(Ordering::Relaxed),
            double_size: self.double_size.load(Ordering::Relaxed),
            double_size_fail: self.double_size_fail.load(Ordering::Relaxed),
        }
    }
}
