use thiserror::Error;

/// Failure modes exposed at the HTW's public boundary.
///
/// Most of the spec's error taxonomy "degrades silently" here by design —
/// a reversed clock in [`crate::TimerWheel::tick`] is a documented no-op,
/// not an error — so this enum stays small.
#[derive(Debug, Error)]
pub enum HtwError {
    /// The wheel's slot array is missing. Unreachable through the safe
    /// constructors in this crate; kept to mirror the original's explicit
    /// null-slots check in `tick`.
    #[error("timer wheel has no slots")]
    Uninitialized,
}
