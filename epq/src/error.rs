use thiserror::Error;

/// Failure modes exposed at the EPQ's public boundary.
///
/// `NotFound` has no variant here either: `expire`/`expire_all` simply
/// return a count (zero is a normal, successful outcome when nothing is
/// due), and the advanced handle API trusts its caller to pass a handle
/// that is actually owned by the queue it's called on — violating that is
/// a `ProgrammerError` in spec terms and is asserted, not returned.
#[derive(Debug, Error)]
pub enum EpqError {
    /// A handle's recorded index no longer falls inside the queue, or some
    /// other precondition on the arguments failed.
    #[error("invalid argument: stale or out-of-range item handle")]
    InvalidArgument,
    /// The backing store could not grow to accept a new item. The queue is
    /// left exactly as it was before the call.
    #[error("allocation failed")]
    OutOfMemory,
}
