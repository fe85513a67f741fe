//! Shared fixtures for checkrun-ci integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use checkrun_ci::{StepExecutor, StepInvocation, StepOutput};
use checkrun_state::fakes::MemoryRunLedger;
use checkrun_state::{
    ContentDigest, RunEvent, RunId, RunLedger, RunMetadata, RunRecord, RunSummary, StorageError,
    StorageResult,
};

/// Executor that never spawns processes: every step exits 0 unless it was
/// scripted to fail, and every invocation is remembered.
#[derive(Default)]
pub struct ScriptedExecutor {
    exit_codes: HashMap<String, i32>,
    calls: Mutex<Vec<StepInvocation>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(step: &str, exit_code: i32) -> Self {
        let mut executor = Self::default();
        executor.exit_codes.insert(step.to_string(), exit_code);
        executor
    }

    /// Names of the steps executed so far, in call order.
    pub fn executed(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|inv| inv.step.name.clone())
            .collect()
    }

    pub fn invocations(&self) -> Vec<StepInvocation> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl StepExecutor for ScriptedExecutor {
    async fn execute(&self, invocation: &StepInvocation) -> anyhow::Result<StepOutput> {
        self.calls.lock().unwrap().push(invocation.clone());
        // Yield so concurrent runs interleave.
        tokio::task::yield_now().await;
        let exit_code = self
            .exit_codes
            .get(&invocation.step.name)
            .copied()
            .unwrap_or(0);
        Ok(StepOutput {
            exit_code,
            stdout: format!("ran {}", invocation.step.name),
            stderr: String::new(),
        })
    }
}

/// In-memory ledger whose `append_event` fails once, on the given call.
pub struct FlakyLedger {
    inner: MemoryRunLedger,
    fail_on_append: u64,
    appends: AtomicU64,
}

impl FlakyLedger {
    /// Fail the `n`th `append_event` call (1-based).
    pub fn failing_append(n: u64) -> Self {
        Self {
            inner: MemoryRunLedger::new(),
            fail_on_append: n,
            appends: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl RunLedger for FlakyLedger {
    async fn create_run(
        &self,
        workflow_digest: &ContentDigest,
        metadata: RunMetadata,
    ) -> StorageResult<RunId> {
        self.inner.create_run(workflow_digest, metadata).await
    }

    async fn append_event(&self, run_id: &RunId, event: RunEvent) -> StorageResult<()> {
        let n = self.appends.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_on_append {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        self.inner.append_event(run_id, event).await
    }

    async fn complete_run(&self, run_id: &RunId, summary: RunSummary) -> StorageResult<()> {
        self.inner.complete_run(run_id, summary).await
    }

    async fn fail_run(&self, run_id: &RunId, summary: RunSummary) -> StorageResult<()> {
        self.inner.fail_run(run_id, summary).await
    }

    async fn cancel_run(&self, run_id: &RunId, summary: RunSummary) -> StorageResult<()> {
        self.inner.cancel_run(run_id, summary).await
    }

    async fn get_run(&self, run_id: &RunId) -> StorageResult<RunRecord> {
        self.inner.get_run(run_id).await
    }

    async fn get_events(&self, run_id: &RunId) -> StorageResult<Vec<RunEvent>> {
        self.inner.get_events(run_id).await
    }

    async fn list_runs(
        &self,
        workflow_digest: Option<&ContentDigest>,
    ) -> StorageResult<Vec<RunRecord>> {
        self.inner.list_runs(workflow_digest).await
    }
}
