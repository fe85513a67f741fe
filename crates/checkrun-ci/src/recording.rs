//! Run lifecycle adapter: bridges [`CiEvent`]s to [`RunLedger`] persistence.

use std::sync::Arc;

use checkrun_core::{CiEvent, CiEventKind};
use checkrun_state::{
    ContentDigest, RunEvent, RunId, RunLedger, RunMetadata, RunSummary, StorageResult,
};

/// Records one run's lifecycle events into a [`RunLedger`].
///
/// Usage:
/// 1. [`RunRecorder::start`] creates the run.
/// 2. [`RunRecorder::record`] appends events with increasing `seq`.
/// 3. [`RunRecorder::finish_ok`] or [`RunRecorder::finish_err`] finalizes it.
pub struct RunRecorder {
    ledger: Arc<dyn RunLedger>,
    run_id: RunId,
    next_seq: u64,
}

impl RunRecorder {
    /// Start a new run in the ledger, returning a recorder bound to that run.
    pub async fn start(
        ledger: Arc<dyn RunLedger>,
        workflow_digest: &ContentDigest,
        metadata: RunMetadata,
    ) -> StorageResult<Self> {
        let run_id = ledger.create_run(workflow_digest, metadata).await?;
        Ok(Self {
            ledger,
            run_id,
            next_seq: 1,
        })
    }

    /// Append an event; sequence numbers start at 1.
    pub async fn record(&mut self, kind: CiEventKind) -> StorageResult<()> {
        let event = CiEvent::new(self.next_seq, kind);
        let run_event = RunEvent {
            seq: event.seq,
            kind: event.kind.name().to_string(),
            payload: event.payload()?,
            timestamp: event.timestamp,
        };
        self.ledger.append_event(&self.run_id, run_event).await?;
        self.next_seq += 1;
        Ok(())
    }

    /// Number of events recorded so far.
    pub fn recorded(&self) -> u64 {
        self.next_seq - 1
    }

    /// Finalize the run as completed.
    pub async fn finish_ok(self, duration_ms: u64) -> StorageResult<()> {
        let summary = self.summary(duration_ms, true);
        checkrun_core::emit_run_finished(&self.run_id.0, duration_ms, summary.total_events, true);
        self.ledger.complete_run(&self.run_id, summary).await
    }

    /// Finalize the run as failed.
    pub async fn finish_err(self, duration_ms: u64) -> StorageResult<()> {
        let summary = self.summary(duration_ms, false);
        checkrun_core::emit_run_finished(&self.run_id.0, duration_ms, summary.total_events, false);
        self.ledger.fail_run(&self.run_id, summary).await
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    fn summary(&self, duration_ms: u64, success: bool) -> RunSummary {
        RunSummary {
            total_events: self.recorded(),
            duration_ms,
            success,
        }
    }
}
