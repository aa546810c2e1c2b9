//! Error type.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// The allocator had no memory for the requested buffer.
    #[error("insufficient RAM for buffer")]
    InsufficientRam,

    /// A new buffer would have the same size as the one it replaces.
    #[error("buffer would not change size")]
    SizeUnchanged,

    /// A persisted name did not match any known value.
    #[error("unknown name")]
    UnknownName,
}
