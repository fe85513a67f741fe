//! Fail-fast pipeline orchestration and run recording.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use checkrun_core::{
    emit_run_finalize_error, emit_run_started, emit_step_finished, CheckrunError, CiEventKind,
    TriggerEvent, Workflow,
};
use checkrun_state::{ContentDigest, RunLedger, RunMetadata};
use serde_json::json;
use tracing::{info, info_span, warn, Instrument};

use crate::environment::Environment;
use crate::executor::StepExecutor;
use crate::recording::RunRecorder;
use crate::runner::{tail, CiRunner, StepResult};

/// Bytes of stdout/stderr kept per step in the ledger.
const OUTPUT_TAIL_BYTES: usize = 8 * 1024;

/// Final outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every step exited 0.
    Succeeded,
    /// `step` was the first step to fail; everything after it was skipped.
    Failed { step: String, exit_code: i32 },
}

/// Result of a complete pipeline execution.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// Run ID in the ledger.
    pub run_id: String,

    pub outcome: RunOutcome,

    /// Results of executed steps, in execution order.
    pub steps: Vec<StepResult>,

    /// Names of steps never executed because an earlier step failed.
    pub skipped: Vec<String>,

    /// Total duration in milliseconds.
    pub duration_ms: u64,

    /// Digest of the workflow that ran.
    pub workflow_digest: String,
}

impl PipelineResult {
    pub fn success(&self) -> bool {
        self.outcome == RunOutcome::Succeeded
    }

    /// Number of steps that passed.
    pub fn passed_count(&self) -> usize {
        self.steps.iter().filter(|s| s.passed()).count()
    }

    /// Number of steps that failed (0 or 1 under fail-fast).
    pub fn failed_count(&self) -> usize {
        self.steps.iter().filter(|s| !s.passed()).count()
    }

    /// The failing step, if any.
    pub fn failed_step(&self) -> Option<&StepResult> {
        self.steps.iter().find(|s| !s.passed())
    }

    /// Convert a failed run into the `StepFailed` error.
    pub fn ensure_success(&self) -> checkrun_core::Result<()> {
        match &self.outcome {
            RunOutcome::Succeeded => Ok(()),
            RunOutcome::Failed { step, exit_code } => Err(CheckrunError::StepFailed {
                step: step.clone(),
                exit_code: *exit_code,
            }),
        }
    }
}

/// Pipeline runner: provisions an environment and executes a workflow's
/// steps in order, stopping at the first failure.
#[derive(Clone)]
pub struct CiPipeline {
    ledger: Arc<dyn RunLedger>,
    executor: Arc<dyn StepExecutor>,
    work_root: Option<PathBuf>,
}

impl CiPipeline {
    pub fn new(ledger: Arc<dyn RunLedger>, executor: Arc<dyn StepExecutor>) -> Self {
        Self {
            ledger,
            executor,
            work_root: None,
        }
    }

    /// Create run workspaces under `root` instead of the system temp dir.
    pub fn with_work_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.work_root = Some(root.into());
        self
    }

    pub fn ledger(&self) -> &Arc<dyn RunLedger> {
        &self.ledger
    }

    /// Execute `workflow` for a matched `event` and record it in the ledger.
    ///
    /// The event is not re-checked against the trigger policy; use
    /// [`crate::Dispatcher`] for that. Each executed step produces a
    /// `step_started`/`step_finished` pair, each skipped step a
    /// `step_skipped`, bracketed by `run_started` and `run_finished`.
    ///
    /// A failing step is reported through [`PipelineResult::outcome`];
    /// `Err` is reserved for invalid workflows, provisioning and ledger errors.
    pub async fn run(
        &self,
        workflow: &Workflow,
        event: &TriggerEvent,
        source: &str,
    ) -> anyhow::Result<PipelineResult> {
        workflow.validate()?;

        let workflow_digest = ContentDigest::try_from(workflow.digest())?;
        let metadata = RunMetadata {
            workflow_name: workflow.name.clone(),
            event: event.kind.to_string(),
            branch: event.branch.clone(),
            git_sha: event.sha.clone(),
            tags: json!({
                "steps": workflow.step_names(),
                "runtime": format!("{} {}", workflow.runtime.language, workflow.runtime.version),
                "source": source,
            }),
        };

        let recorder = RunRecorder::start(self.ledger.clone(), &workflow_digest, metadata)
            .await
            .context("Failed to create run in ledger")?;
        let run_id = recorder.run_id().to_string();

        let span = info_span!("checkrun.run", run_id = %run_id, workflow = %workflow.name);
        self.execute(recorder, workflow, event, source, workflow_digest)
            .instrument(span)
            .await
    }

    async fn execute(
        &self,
        mut recorder: RunRecorder,
        workflow: &Workflow,
        event: &TriggerEvent,
        source: &str,
        workflow_digest: ContentDigest,
    ) -> anyhow::Result<PipelineResult> {
        let start = Instant::now();
        let run_id = recorder.run_id().to_string();

        let executed = match self
            .record_steps(&mut recorder, workflow, event, source, start)
            .await
        {
            Ok(executed) => executed,
            Err(e) => {
                // The run must not stay Running once this call returns.
                let duration_ms = start.elapsed().as_millis() as u64;
                if let Err(finalize_err) = recorder.finish_err(duration_ms).await {
                    emit_run_finalize_error(&run_id, &finalize_err);
                }
                return Err(e);
            }
        };

        let passed = executed.outcome == RunOutcome::Succeeded;
        let finalized = if passed {
            recorder.finish_ok(executed.duration_ms).await
        } else {
            recorder.finish_err(executed.duration_ms).await
        };
        if let Err(e) = finalized {
            emit_run_finalize_error(&run_id, &e);
            return Err(anyhow::Error::new(e).context("Failed to finalize run"));
        }
        if passed {
            info!(run_id = %run_id, "Pipeline completed successfully");
        } else {
            info!(run_id = %run_id, "Pipeline failed");
        }

        Ok(PipelineResult {
            run_id,
            outcome: executed.outcome,
            steps: executed.steps,
            skipped: executed.skipped,
            duration_ms: executed.duration_ms,
            workflow_digest: workflow_digest.to_string(),
        })
    }

    /// Everything between `run_started` and `run_finished`, inclusive.
    async fn record_steps(
        &self,
        recorder: &mut RunRecorder,
        workflow: &Workflow,
        event: &TriggerEvent,
        source: &str,
        start: Instant,
    ) -> anyhow::Result<ExecutedSteps> {
        let run_id = recorder.run_id().to_string();

        emit_run_started(&run_id, &workflow.name, workflow.steps.len());
        recorder
            .record(CiEventKind::RunStarted {
                workflow: workflow.name.clone(),
                event: event.kind,
                branch: event.branch.clone(),
                runtime: format!("{} {}", workflow.runtime.language, workflow.runtime.version),
                steps: workflow.step_names(),
            })
            .await?;

        let environment = match Environment::provision(
            workflow,
            event,
            source,
            &run_id,
            self.work_root.as_deref(),
        ) {
            Ok(env) => env,
            Err(e) => {
                let recorded = recorder
                    .record(CiEventKind::RunFinished {
                        passed: false,
                        total_duration_ms: start.elapsed().as_millis() as u64,
                        failed_step: None,
                    })
                    .await;
                if let Err(record_err) = recorded {
                    warn!(run_id = %run_id, error = %record_err, "Could not record run_finished");
                }
                return Err(e.context("Failed to provision run environment"));
            }
        };

        let mut steps = Vec::new();
        let mut skipped = Vec::new();
        let mut outcome = RunOutcome::Succeeded;

        for (index, step) in workflow.steps.iter().enumerate() {
            if outcome != RunOutcome::Succeeded {
                info!(step = %step.name, "Skipping step after failure");
                recorder
                    .record(CiEventKind::StepSkipped {
                        index,
                        step: step.name.clone(),
                    })
                    .await?;
                skipped.push(step.name.clone());
                continue;
            }

            info!(step = %step.name, "Executing step");
            recorder
                .record(CiEventKind::StepStarted {
                    index,
                    step: step.name.clone(),
                    command: step.run.clone(),
                })
                .await?;

            let invocation = environment.invocation(step, workflow.effective_timeout(step));
            let result = CiRunner::execute_step(self.executor.as_ref(), index, &invocation).await;

            emit_step_finished(
                &run_id,
                &result.step_name,
                result.passed(),
                result.exit_code,
                result.duration_ms,
            );
            recorder
                .record(CiEventKind::StepFinished {
                    index,
                    step: result.step_name.clone(),
                    passed: result.passed(),
                    exit_code: result.exit_code,
                    duration_ms: result.duration_ms,
                    stdout: tail(&result.stdout, OUTPUT_TAIL_BYTES),
                    stderr: tail(&result.stderr, OUTPUT_TAIL_BYTES),
                })
                .await?;

            if !result.passed() {
                outcome = RunOutcome::Failed {
                    step: result.step_name.clone(),
                    exit_code: result.exit_code,
                };
            }
            steps.push(result);
        }

        // The workspace is discarded regardless of outcome.
        drop(environment);

        let duration_ms = start.elapsed().as_millis() as u64;
        let failed_step = match &outcome {
            RunOutcome::Succeeded => None,
            RunOutcome::Failed { step, .. } => Some(step.clone()),
        };
        recorder
            .record(CiEventKind::RunFinished {
                passed: failed_step.is_none(),
                total_duration_ms: duration_ms,
                failed_step,
            })
            .await?;

        Ok(ExecutedSteps {
            outcome,
            steps,
            skipped,
            duration_ms,
        })
    }
}

struct ExecutedSteps {
    outcome: RunOutcome,
    steps: Vec<StepResult>,
    skipped: Vec<String>,
    duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(index: usize, name: &str, exit_code: i32) -> StepResult {
        StepResult {
            index,
            step_name: name.to_string(),
            exit_code,
            stdout: "".to_string(),
            stderr: "".to_string(),
            duration_ms: 100,
            success: exit_code == 0,
        }
    }

    #[test]
    fn test_pipeline_result_counts() {
        let result = PipelineResult {
            run_id: "run123".to_string(),
            outcome: RunOutcome::Succeeded,
            steps: vec![step(0, "Checkout source", 0), step(1, "Upgrade pip", 0)],
            skipped: vec![],
            duration_ms: 300,
            workflow_digest: "abc123".to_string(),
        };

        assert_eq!(result.passed_count(), 2);
        assert_eq!(result.failed_count(), 0);
        assert!(result.success());
        assert!(result.ensure_success().is_ok());
        assert!(result.failed_step().is_none());
    }

    #[test]
    fn test_pipeline_result_with_failure() {
        let result = PipelineResult {
            run_id: "run123".to_string(),
            outcome: RunOutcome::Failed {
                step: "Black formatting check".to_string(),
                exit_code: 1,
            },
            steps: vec![
                step(0, "Checkout source", 0),
                step(1, "Black formatting check", 1),
            ],
            skipped: vec!["Ruff lint (astrapy)".to_string()],
            duration_ms: 300,
            workflow_digest: "abc123".to_string(),
        };

        assert_eq!(result.passed_count(), 1);
        assert_eq!(result.failed_count(), 1);
        assert!(!result.success());
        assert_eq!(
            result.failed_step().map(|s| s.step_name.as_str()),
            Some("Black formatting check")
        );

        let err = result.ensure_success().unwrap_err();
        assert!(matches!(
            err,
            CheckrunError::StepFailed { ref step, exit_code: 1 } if step == "Black formatting check"
        ));
    }
}
