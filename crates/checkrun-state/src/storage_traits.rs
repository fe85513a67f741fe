//! Storage trait and record types for run persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// ContentDigest
// ---------------------------------------------------------------------------

/// Content digest (SHA-256 hex string).
///
/// The inner field is private to guarantee the string is always valid
/// lowercase hex produced by `from_bytes` or validated via `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidDigest { digest: s });
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// RunLedger: pipeline run persistence
// ---------------------------------------------------------------------------

/// Unique identifier for a pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a new random RunId
    pub fn new() -> Self {
        RunId(uuid::Uuid::new_v4().to_string())
    }

    /// Parse a user-supplied run id. Only UUIDs are valid run ids.
    pub fn parse(s: &str) -> StorageResult<Self> {
        uuid::Uuid::parse_str(s.trim())
            .map(|id| RunId(id.to_string()))
            .map_err(|_| StorageError::InvalidRunId {
                run_id: s.to_string(),
            })
    }

    /// Whether this id has the shape of a generated run id.
    pub fn is_well_formed(&self) -> bool {
        uuid::Uuid::parse_str(&self.0).is_ok()
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata attached to a run at creation time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Workflow name
    pub workflow_name: String,
    /// Triggering event kind ("push" / "pull_request")
    pub event: String,
    /// Target branch of the triggering event
    pub branch: String,
    /// Commit SHA, when the event carried one
    pub git_sha: Option<String>,
    /// Arbitrary key-value tags
    pub tags: serde_json::Value,
}

/// A single event in a run's log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    /// Monotonic sequence number within the run
    pub seq: u64,
    /// Event kind (e.g. "run_started", "step_finished")
    pub kind: String,
    /// Event payload
    pub payload: serde_json::Value,
    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

/// Summary produced when a run completes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Total events recorded
    pub total_events: u64,
    /// Duration in milliseconds
    pub duration_ms: u64,
    /// Whether the run succeeded
    pub success: bool,
}

/// Status of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    /// Whether the run has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

/// Full record for a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub workflow_digest: ContentDigest,
    pub metadata: RunMetadata,
    pub status: RunStatus,
    pub summary: Option<RunSummary>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Pipeline run ledger.
///
/// Guarantees:
/// - Events are ordered by monotonic `seq` within a run.
/// - A run transitions: Running → Completed | Failed | Cancelled (terminal).
/// - Events cannot be appended to a terminal run.
#[async_trait]
pub trait RunLedger: Send + Sync {
    /// Create a new run, returning its unique ID.
    async fn create_run(
        &self,
        workflow_digest: &ContentDigest,
        metadata: RunMetadata,
    ) -> StorageResult<RunId>;

    /// Append an event to an active run. Fails if the run is terminal.
    async fn append_event(&self, run_id: &RunId, event: RunEvent) -> StorageResult<()>;

    /// Mark a run as completed with a summary.
    async fn complete_run(&self, run_id: &RunId, summary: RunSummary) -> StorageResult<()>;

    /// Mark a run as failed with a summary.
    async fn fail_run(&self, run_id: &RunId, summary: RunSummary) -> StorageResult<()>;

    /// Mark a run as cancelled.
    async fn cancel_run(&self, run_id: &RunId, summary: RunSummary) -> StorageResult<()>;

    /// Retrieve a run record by ID.
    async fn get_run(&self, run_id: &RunId) -> StorageResult<RunRecord>;

    /// Retrieve all events for a run, ordered by seq.
    async fn get_events(&self, run_id: &RunId) -> StorageResult<Vec<RunEvent>>;

    /// List runs oldest first, optionally filtered by workflow digest.
    async fn list_runs(
        &self,
        workflow_digest: Option<&ContentDigest>,
    ) -> StorageResult<Vec<RunRecord>>;
}

/// Move a running record into a terminal status.
///
/// Shared by the ledger backends so the state machine lives in one place.
pub(crate) fn finalize_record(
    record: &mut RunRecord,
    status: RunStatus,
    summary: Option<RunSummary>,
) -> StorageResult<()> {
    ensure_running(record)?;
    record.status = status;
    record.summary = summary;
    record.completed_at = Some(Utc::now());
    Ok(())
}

pub(crate) fn ensure_running(record: &RunRecord) -> StorageResult<()> {
    if record.status.is_terminal() {
        return Err(StorageError::InvalidRunState {
            run_id: record.run_id.0.clone(),
            status: format!("{:?}", record.status),
            expected: "Running".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_parse_accepts_only_uuids() {
        let id = RunId::new();
        assert_eq!(RunId::parse(&id.0).unwrap(), id);
        assert!(id.is_well_formed());

        for bad in ["../..", "runs/../x", "", "not-a-run"] {
            let err = RunId::parse(bad).unwrap_err();
            assert!(matches!(err, StorageError::InvalidRunId { .. }), "{}", bad);
        }
        assert!(!RunId("../..".to_string()).is_well_formed());
    }

    #[test]
    fn test_digest_from_bytes_is_hex() {
        let d = ContentDigest::from_bytes(b"abc");
        assert_eq!(d.as_str().len(), 64);
        assert_eq!(d.short().len(), 12);
    }

    #[test]
    fn test_digest_try_from_rejects_garbage() {
        let err = ContentDigest::try_from("not-a-digest".to_string()).unwrap_err();
        assert!(matches!(err, StorageError::InvalidDigest { .. }));
    }

    #[test]
    fn test_digest_try_from_lowercases() {
        let upper = ContentDigest::from_bytes(b"x").as_str().to_ascii_uppercase();
        let d = ContentDigest::try_from(upper).unwrap();
        assert_eq!(d, ContentDigest::from_bytes(b"x"));
    }

    #[test]
    fn test_run_status_terminal() {
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
    }
}
