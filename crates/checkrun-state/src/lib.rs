//! checkrun-state: run ledger persistence for checkrun
//!
//! Every pipeline run is recorded as a [`RunRecord`] plus an ordered log of
//! [`RunEvent`]s. The [`RunLedger`] trait abstracts the backend.
//!
//! ## Backends
//!
//! - [`fakes::MemoryRunLedger`]: in-process, used by tests and one-shot runs
//! - [`FsRunLedger`]: JSON files under a ledger root, used by the CLI

mod error;
pub mod fakes;
pub mod fs_ledger;
pub mod storage_traits;

pub use error::StorageError;
pub use fs_ledger::FsRunLedger;
pub use storage_traits::{
    ContentDigest, RunEvent, RunId, RunLedger, RunMetadata, RunRecord, RunStatus, RunSummary,
    StorageResult,
};
