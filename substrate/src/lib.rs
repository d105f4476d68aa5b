//! The time-and-lookup substrate, assembled.
//!
//! This crate has no logic of its own: it's a thin facade over
//! [`cht`], [`epq`] and [`htw`] for an embedder — the pipeline
//! orchestration layer this design treats as an external collaborator —
//! that wants all three cores behind a single dependency and a single
//! `use substrate::...`, without caring that they live in separate crates
//! internally.
//!
//! ```
//! use substrate::cht::ConcurrentHashTable;
//! use substrate::epq::ExpiringPriorityQueue;
//! use substrate::htw::TimerWheel;
//!
//! let table: ConcurrentHashTable<u64> = ConcurrentHashTable::new();
//! let queue: ExpiringPriorityQueue<u64> = ExpiringPriorityQueue::new();
//! let wheel: TimerWheel<u64> = TimerWheel::new(|_value| {});
//! ```

pub use cht;
pub use epq;
pub use htw;

pub use cht::ConcurrentHashTable;
pub use epq::ExpiringPriorityQueue;
pub use htw::TimerWheel;
