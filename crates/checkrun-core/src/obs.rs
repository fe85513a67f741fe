//! Structured observability hooks for the run lifecycle.
//!
//! Provides a run-scoped span guard and one emitter per lifecycle event:
//! trigger evaluation, run start, step completion, run finish, gate verdict.
//!
//! All events use `event = "<area>.<name>"` so they can be filtered in JSON
//! output.

use tracing::{info, warn};

use crate::domain::trigger::TriggerEvent;

/// RAII guard that enters a run-scoped tracing span for the duration of a run.
///
/// ```ignore
/// let _span = RunSpan::enter("run-12345");
/// // every tracing call below is associated with run_id = "run-12345"
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    pub fn enter(run_id: &str) -> Self {
        let span = tracing::info_span!("checkrun.run", run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_trigger_evaluated(workflow: &str, event: &TriggerEvent, matched: bool) {
    info!(
        event = "trigger.evaluated",
        workflow = %workflow,
        kind = %event.kind,
        branch = %event.branch,
        matched = matched,
    );
}

pub fn emit_run_started(run_id: &str, workflow: &str, steps: usize) {
    info!(event = "run.started", run_id = %run_id, workflow = %workflow, steps = steps);
}

pub fn emit_step_finished(run_id: &str, step: &str, passed: bool, exit_code: i32, duration_ms: u64) {
    if passed {
        info!(
            event = "step.finished",
            run_id = %run_id,
            step = %step,
            exit_code = exit_code,
            duration_ms = duration_ms,
        );
    } else {
        warn!(
            event = "step.failed",
            run_id = %run_id,
            step = %step,
            exit_code = exit_code,
            duration_ms = duration_ms,
        );
    }
}

pub fn emit_run_finished(run_id: &str, duration_ms: u64, total_events: u64, success: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        total_events = total_events,
        success = success,
    );
}

pub fn emit_gate_evaluated(run_id: &str, violations: usize, passed: bool) {
    info!(
        event = "gate.evaluated",
        run_id = %run_id,
        violations = violations,
        passed = passed,
    );
}

/// Run finalization error (warning level).
pub fn emit_run_finalize_error(run_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "run.finalize_error", run_id = %run_id, error = %error);
}
