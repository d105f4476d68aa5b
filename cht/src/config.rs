use std::sync::Arc;

use substrate_toolbox::{isqrt, one_at_a_time_hash};

/// Default bucket count when the caller passes `bucket_count <= 0`
/// (`bucket_count: None`, in the Rust API), ported from `DEFAULT_NUM_LINES`
/// in the original implementation.
pub const DEFAULT_BUCKET_COUNT: usize = 100;

/// Default number of entries moved per cooperative migration step.
pub const DEFAULT_MIGRATION_STEP: usize = 10;

pub(crate) type HashFn = Arc<dyn Fn(&[u8]) -> u32 + Send + Sync>;

/// Construction parameters for a [`ConcurrentHashTable`](crate::ConcurrentHashTable).
///
/// Every field has a sensible default via [`ChtConfig::default`]; override
/// only what you need. There is deliberately no allocator-hook field: Rust's
/// global allocator already plays the role of the "process-default
/// allocator" the original falls back to when one isn't supplied, and
/// plumbing a custom allocator through this API would be out of proportion
/// to what the table needs.
#[derive(Clone)]
pub struct ChtConfig {
    pub bucket_count: usize,
    pub max_chain_depth: Option<usize>,
    pub migration_step: usize,
    pub(crate) hash_fn: HashFn,
}

impl ChtConfig {
    /// Start from the defaults and override the bucket count.
    pub fn with_bucket_count(bucket_count: usize) -> Self {
        ChtConfig {
            bucket_count: if bucket_count == 0 {
                DEFAULT_BUCKET_COUNT
            } else {
                bucket_count
            },
            ..Self::default()
        }
    }

    /// Supply a custom hash function in place of the default
    /// one-at-a-time mix. Must be deterministic and side-effect free.
    pub fn with_hash_fn<F>(mut self, hash_fn: F) -> Self
    where
        F: Fn(&[u8]) -> u32 + Send + Sync + 'static,
    {
        self.hash_fn = Arc::new(hash_fn);
        self
    }

    pub(crate) fn max_chain_depth_for(&self, bucket_count: usize) -> usize {
        self.max_chain_depth
            .unwrap_or_else(|| isqrt(bucket_count as u64).max(1) as usize)
    }
}

impl Default for ChtConfig {
    fn default() -> Self {
        ChtConfig {
            bucket_count: DEFAULT_BUCKET_COUNT,
            max_chain_depth: None,
            migration_step: DEFAULT_MIGRATION_STEP,
            hash_fn: Arc::new(one_at_a_time_hash),
        }
    }
}
