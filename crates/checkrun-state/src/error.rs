//! Error types for checkrun-state

use thiserror::Error;

/// Errors raised by [`crate::RunLedger`] implementations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// No run with this id exists in the ledger
    #[error("run not found: {run_id}")]
    RunNotFound { run_id: String },

    /// A run id that is not a UUID
    #[error("invalid run id: {run_id}")]
    InvalidRunId { run_id: String },

    /// The run is not in the state the operation requires
    #[error("run {run_id} is {status}, expected {expected}")]
    InvalidRunState {
        run_id: String,
        status: String,
        expected: String,
    },

    /// A digest string is not 64 hex characters
    #[error("invalid digest: {digest}")]
    InvalidDigest { digest: String },

    /// Filesystem error
    #[error("ledger io error: {0}")]
    Io(#[from] std::io::Error),

    /// Record or event (de)serialization error
    #[error("ledger serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
