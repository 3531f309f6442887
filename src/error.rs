//! Error kinds for the secret-shared update protocol.
//!
//! All variants here are fatal: there is no in-protocol retry, matching the
//! error handling design of the protocol this crate implements. Binaries
//! wrap these in [`anyhow::Result`] to attach call-site context before the
//! error reaches `main`.

use thiserror::Error;

/// A fatal protocol or I/O error.
#[derive(Debug, Error)]
pub enum Error {
    /// Share or row lengths disagree where they must match.
    #[error("shape mismatch: expected length {expected}, got {got}")]
    ShapeMismatch {
        /// The length required by the caller.
        expected: usize,
        /// The length actually observed.
        got: usize,
    },

    /// A DPF key or numeric field failed to parse.
    #[error("malformed input: {context}")]
    MalformedInput {
        /// Human-readable description of what failed to parse and where.
        context: String,
    },

    /// A socket read/write failed, or an expected file was missing.
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),

    /// A structural precondition of the protocol was violated.
    #[error("invariant violation: {context}")]
    InvariantViolation {
        /// Human-readable description of the violated invariant.
        context: String,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
