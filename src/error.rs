//! Error taxonomy for the pipe engine
//!
//! Only protocol violations surface as errors. A double detach is a
//! defined no-op, and listener mutation during an emission pass is handled
//! structurally by snapshot iteration, so neither appears here.

/// Error type for pipe operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    /// A chunk was pushed after end-of-data was reached. Indicates a bug
    /// in the driving code: the end flag is set exactly once and never
    /// cleared.
    #[error("chunk pushed after end of data")]
    PushAfterEnd,
}
