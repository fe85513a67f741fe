//! Filesystem-backed RunLedger implementation.
//!
//! One directory per run under `<root>/runs/`, holding the run record and an
//! append-only event log. Usable across processes: the CLI writes a run and a
//! later `checkrun gate` reads it back.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::StorageError;
use crate::storage_traits::*;

const RECORD_FILE: &str = "record.json";
const EVENTS_FILE: &str = "events.jsonl";

/// Filesystem-backed run ledger.
///
/// Layout:
/// - `<root>/runs/<run_id>/record.json`: the [`RunRecord`], rewritten atomically
/// - `<root>/runs/<run_id>/events.jsonl`: one [`RunEvent`] per line, append-only
pub struct FsRunLedger {
    runs_dir: PathBuf,
    // Serializes read-modify-write of records within this process.
    write_lock: Mutex<()>,
}

impl FsRunLedger {
    /// Create a new `FsRunLedger` rooted at `root`. Creates `root/runs/` if needed.
    pub fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let runs_dir = root.as_ref().join("runs");
        fs::create_dir_all(&runs_dir)?;
        Ok(Self {
            runs_dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Directory of `run_id`. Ids that are not UUIDs never name a run, so
    /// they cannot reach outside `runs/`.
    fn run_dir(&self, run_id: &RunId) -> StorageResult<PathBuf> {
        if !run_id.is_well_formed() {
            return Err(StorageError::RunNotFound {
                run_id: run_id.0.clone(),
            });
        }
        Ok(self.runs_dir.join(&run_id.0))
    }

    fn read_record(&self, run_id: &RunId) -> StorageResult<RunRecord> {
        let path = self.run_dir(run_id)?.join(RECORD_FILE);
        let data = fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::RunNotFound {
                    run_id: run_id.0.clone(),
                }
            } else {
                StorageError::Io(e)
            }
        })?;
        Ok(serde_json::from_slice(&data)?)
    }

    fn write_record(&self, record: &RunRecord) -> StorageResult<()> {
        let dir = self.run_dir(&record.run_id)?;
        fs::create_dir_all(&dir)?;

        // Atomic write: write to temp file in the same directory, then rename.
        let mut tmp = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, record)?;
        tmp.write_all(b"\n")?;
        tmp.persist(dir.join(RECORD_FILE)).map_err(|e| e.error)?;
        Ok(())
    }

    fn finalize(
        &self,
        run_id: &RunId,
        status: RunStatus,
        summary: RunSummary,
    ) -> StorageResult<()> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut record = self.read_record(run_id)?;
        finalize_record(&mut record, status, Some(summary))?;
        self.write_record(&record)?;
        debug!(run_id = %run_id, status = ?record.status, "run finalized");
        Ok(())
    }
}

#[async_trait]
impl RunLedger for FsRunLedger {
    async fn create_run(
        &self,
        workflow_digest: &ContentDigest,
        metadata: RunMetadata,
    ) -> StorageResult<RunId> {
        let run_id = RunId::new();
        let record = RunRecord {
            run_id: run_id.clone(),
            workflow_digest: workflow_digest.clone(),
            metadata,
            status: RunStatus::Running,
            summary: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.write_record(&record)?;
        fs::File::create(self.run_dir(&run_id)?.join(EVENTS_FILE))?;
        Ok(run_id)
    }

    async fn append_event(&self, run_id: &RunId, event: RunEvent) -> StorageResult<()> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let record = self.read_record(run_id)?;
        ensure_running(&record)?;

        let mut line = serde_json::to_vec(&event)?;
        line.push(b'\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.run_dir(run_id)?.join(EVENTS_FILE))?;
        file.write_all(&line)?;
        Ok(())
    }

    async fn complete_run(&self, run_id: &RunId, summary: RunSummary) -> StorageResult<()> {
        self.finalize(run_id, RunStatus::Completed, summary)
    }

    async fn fail_run(&self, run_id: &RunId, summary: RunSummary) -> StorageResult<()> {
        self.finalize(run_id, RunStatus::Failed, summary)
    }

    async fn cancel_run(&self, run_id: &RunId, summary: RunSummary) -> StorageResult<()> {
        self.finalize(run_id, RunStatus::Cancelled, summary)
    }

    async fn get_run(&self, run_id: &RunId) -> StorageResult<RunRecord> {
        self.read_record(run_id)
    }

    async fn get_events(&self, run_id: &RunId) -> StorageResult<Vec<RunEvent>> {
        // Surface RunNotFound before looking for the log.
        self.read_record(run_id)?;

        let path = self.run_dir(run_id)?.join(EVENTS_FILE);
        let file = match fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut events = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str::<RunEvent>(&line)?);
        }
        events.sort_by_key(|e| e.seq);
        Ok(events)
    }

    async fn list_runs(
        &self,
        workflow_digest: Option<&ContentDigest>,
    ) -> StorageResult<Vec<RunRecord>> {
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.runs_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let run_id = RunId(entry.file_name().to_string_lossy().into_owned());
            let record = match self.read_record(&run_id) {
                Ok(r) => r,
                // A directory without a record is a run whose creation was interrupted.
                Err(StorageError::RunNotFound { .. }) => continue,
                Err(e) => return Err(e),
            };
            if workflow_digest
                .map(|d| record.workflow_digest == *d)
                .unwrap_or(true)
            {
                records.push(record);
            }
        }
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }
}
