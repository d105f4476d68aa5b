use substrate_toolbox::next_power_of_two;

/// Default slot count when the caller passes `size == 0`, ported from
/// `TW_DEFAULT_SIZE` in the original implementation.
pub const DEFAULT_SIZE: u32 = 256;

/// Default tick resolution in nanoseconds when the caller passes
/// `tick_resolution_ns == 0`, ported from `TW_DEFAULT_RESOLUTION`.
pub const DEFAULT_TICK_RESOLUTION_NS: u64 = 1000;

/// Construction parameters for a [`TimerWheel`](crate::TimerWheel).
///
/// There is deliberately no allocator-hook field (see `cht::ChtConfig` for
/// the same reasoning): Rust's global allocator stands in for the
/// `alloc`/`free` pair the original takes.
#[derive(Clone, Copy, Debug)]
pub struct HtwConfig {
    pub size: u32,
    pub tick_resolution_ns: u64,
}

impl HtwConfig {
    pub fn with_size(size: u32) -> Self {
        HtwConfig {
            size,
            ..Self::default()
        }
    }

    pub(crate) fn resolved_size(&self) -> u32 {
        next_power_of_two(if self.size == 0 { DEFAULT_SIZE } else { self.size })
    }

    pub(crate) fn resolved_tick_resolution_ns(&self) -> u64 {
        if self.tick_resolution_ns == 0 {
            DEFAULT_TICK_RESOLUTION_NS
        } else {
            self.tick_resolution_ns
        }
    }
}

impl Default for HtwConfig {
    fn default() -> Self {
        HtwConfig {
            size: DEFAULT_SIZE,
            tick_resolution_ns: DEFAULT_TICK_RESOLUTION_NS,
        }
    }
}
