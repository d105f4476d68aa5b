use thiserror::Error;

/// Failure modes exposed at the CHT's public boundary.
///
/// `NotFound` is deliberately not a member of this enum — per the design,
/// "not found" is a normal outcome of `remove`, and is expressed as `Ok(false)`
/// rather than an error. `TransientContention` (a resize already running) is
/// likewise not surfaced here: it only moves a stats counter.
#[derive(Debug, Error)]
pub enum ChtError {
    /// The key was empty, or some other precondition on the arguments failed.
    #[error("invalid argument: key must be non-empty")]
    InvalidArgument,
    /// The allocator could not satisfy a request for a new entry or bucket
    /// array. The table is left in its previous valid state.
    #[error("allocation failed")]
    OutOfMemory,
}
