//! Error types for the Cloister isolate core.
//!
//! This module defines the error hierarchy for the lifecycle API. The root
//! error type, `Error`, wraps the subsystem-specific errors, allowing for
//! uniform error handling at the top level: every lifecycle operation
//! either succeeds or surfaces one of these errors synchronously, and no
//! failure path leaves partial isolate or registry state behind.
//!
//! Precondition violations that the contract documents as caller-enforced
//! (detaching a record while code still executes under it, for example)
//! are not represented here; they are undefined behavior at the embedding
//! boundary, not recoverable errors this crate detects.

use crate::id::{AttachmentId, IsolateId};
use thiserror::Error;

/// Root error type for the Cloister system.
#[derive(Debug, Error)]
pub enum Error {
    /// Isolate lifecycle errors
    #[error("Isolate error: {0}")]
    Isolate(#[from] IsolateError),

    /// General runtime errors
    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Errors related to isolate lifecycle operations.
#[derive(Debug, Error)]
pub enum IsolateError {
    /// Isolate handle is unknown to the registry, or already destroyed
    #[error("Unknown isolate: {0}")]
    UnknownIsolate(IsolateId),

    /// Attachment handle is unknown, stale, or already detached
    #[error("Unknown or detached attachment: {0}")]
    UnknownAttachment(AttachmentId),

    /// Isolate is tearing down or destroyed; no further attaches or a
    /// second teardown are admitted
    #[error("Isolate {0} is tearing down or already destroyed")]
    TeardownInProgress(IsolateId),

    /// Registry cannot admit another isolate
    #[error("Isolate registry is at capacity ({0} isolates)")]
    RegistryFull(usize),

    /// Isolate creation could not reserve the requested address space
    #[error("Cannot reserve {requested} bytes of address space (ceiling {ceiling})")]
    AddressSpaceExhausted {
        /// Bytes requested by the creation parameters
        requested: usize,
        /// Per-isolate reservation ceiling
        ceiling: usize,
    },

    /// Waiting for teardown quiescence can never be satisfied because the
    /// calling thread itself remains attached
    #[error("Teardown of isolate {0} would deadlock: calling thread is still attached")]
    QuiescenceDeadlock(IsolateId),

    /// A bulk detach batch contained an invalid or foreign record; nothing
    /// in the batch was detached
    #[error("Bulk detach rejected: record {0} is not a live member of the caller's isolate")]
    BatchRejected(AttachmentId),
}

/// A specialized Result type for Cloister operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let id = IsolateId::nil();
        let err = Error::from(IsolateError::TeardownInProgress(id));
        let msg = err.to_string();
        assert!(msg.contains("tearing down"));
        assert!(msg.contains(&id.to_string()));
    }

    #[test]
    fn test_error_conversion() {
        let err: Error = IsolateError::RegistryFull(4).into();
        assert!(matches!(
            err,
            Error::Isolate(IsolateError::RegistryFull(4))
        ));
    }
}
