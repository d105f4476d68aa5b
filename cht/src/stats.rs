use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Diagnostic counters, one per kind of event named in the design.
///
/// Read with [`ConcurrentHashTable::stats`](crate::ConcurrentHashTable::stats);
/// the exact text format of `Display` is not a stability contract, only the
/// fact that it's a human-readable key/value listing is.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stats {
    pub inserts: u64,
    pub lookups: u64,
    pub removes: u64,
    pub collisions: u64,
    pub double_size: u64,
    pub double_size_fail: u64,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "inserts: {}", self.inserts)?;
        writeln!(f, "lookups: {}", self.lookups)?;
        writeln!(f, "removes: {}", self.removes)?;
        writeln!(f, "collisions: {}", self.collisions)?;
        writeln!(f, "double-size: {}", self.double_size)?;
        write!(f, "failed double-size: {}", self.double_size_fail)
    }
}

#[derive(Debug, Default)]
pub(crate) struct AtomicStats {
    pub inserts: AtomicU64,
    pub lookups: AtomicU64,
    pub removes: AtomicU64,
    pub collisions: AtomicU64,
    pub double_size: AtomicU64,
    pub double_size_fail: AtomicU64,
}

impl AtomicStats {
    pub(crate) fn snapshot(&self) -> Stats {
        Stats {
            inserts: self.inserts.load(Ordering::Relaxed),
            lookups: self.lookups.load(Ordering::Relaxed),
            removes: self.removes.load(Ordering::Relaxed),
            collisions: self.collisions.load(Ordering::Relaxed),
            double_size: self.double_size.load(Ordering::Relaxed),
            double_size_fail: self.double_size_fail.load(Ordering::Relaxed),
        }
    }
}
