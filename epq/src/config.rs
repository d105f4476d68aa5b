/// Default initial capacity when the caller passes `initial_capacity <= 0`
/// (`initial_capacity: 0`, in the Rust API), ported from `DEFAULT_CAPACITY`
/// in the original implementation.
pub const DEFAULT_CAPACITY: usize = 64;

/// Construction parameters for an
/// [`ExpiringPriorityQueue`](crate::ExpiringPriorityQueue).
///
/// There is deliberately no allocator-hook field (see `cht::ChtConfig` for
/// the same reasoning): Rust's global allocator stands in for the
/// `alloc`/`free`/`realloc` triplet the original takes.
#[derive(Clone, Copy, Debug)]
pub struct EpqConfig {
    pub initial_capacity: usize,
}

impl EpqConfig {
    pub fn with_initial_capacity(initial_capacity: usize) -> Self {
        EpqConfig {
            initial_capacity: if initial_capacity == 0 {
                DEFAULT_CAPACITY
            } else {
                initial_capacity
            },
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        if self.initial_capacity == 0 {
            DEFAULT_CAPACITY
        } else {
            self.initial_capacity
        }
    }
}

impl Default for EpqConfig {
    fn default() -> Self {
        EpqConfig {
            initial_capacity: DEFAULT_CAPACITY,
        }
    }
}
