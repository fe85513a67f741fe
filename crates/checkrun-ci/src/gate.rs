//! Gate evaluation over a recorded run log.

use std::collections::BTreeMap;

use checkrun_core::{CiEvent, CiEventKind};
use checkrun_state::RunEvent;
use serde::{Deserialize, Serialize};

/// Gate evaluation verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateVerdict {
    /// Whether the gate passed.
    pub passed: bool,

    /// Violations that caused failure (empty if passed).
    pub violations: Vec<String>,

    /// Summary message.
    pub message: String,
}

/// Gate rules for a recorded run.
pub struct CiGate;

impl CiGate {
    /// Evaluate whether a recorded run passed and respected fail-fast.
    ///
    /// Gate rules:
    /// - Every `step_started` is followed by a `step_finished` for the same step
    /// - No `step_finished` reports a failure
    /// - No step starts after a step has failed
    /// - The log ends the run with `run_finished`, whose `passed` flag agrees
    ///   with the step outcomes
    pub fn evaluate(events: &[RunEvent]) -> GateVerdict {
        let mut violations = Vec::new();

        let mut in_flight: BTreeMap<usize, String> = BTreeMap::new();
        let mut first_failure: Option<String> = None;
        let mut run_finished: Option<bool> = None;

        for event in events {
            let kind = match CiEvent::kind_from_payload(&event.payload) {
                Ok(kind) => kind,
                Err(e) => {
                    violations.push(format!(
                        "Event #{} ('{}') is not a recognized run event: {}",
                        event.seq, event.kind, e
                    ));
                    continue;
                }
            };

            match kind {
                CiEventKind::RunStarted { .. } | CiEventKind::StepSkipped { .. } => {}
                CiEventKind::StepStarted { index, step, .. } => {
                    if let Some(failed) = &first_failure {
                        violations.push(format!(
                            "Step '{}' started after '{}' failed",
                            step, failed
                        ));
                    }
                    in_flight.insert(index, step);
                }
                CiEventKind::StepFinished {
                    index,
                    step,
                    passed,
                    exit_code,
                    ..
                } => {
                    in_flight.remove(&index);
                    if !passed {
                        violations.push(format!(
                            "Step '{}' failed with exit code {}",
                            step, exit_code
                        ));
                        if first_failure.is_none() {
                            first_failure = Some(step);
                        }
                    }
                }
                CiEventKind::RunFinished { passed, .. } => {
                    run_finished = Some(passed);
                }
            }
        }

        for step in in_flight.values() {
            violations.push(format!("Step '{}' was started but never finished", step));
        }

        match run_finished {
            None => violations.push("Run has no run_finished event".to_string()),
            Some(false) if first_failure.is_none() => {
                violations.push("Run failed before any step failed".to_string())
            }
            Some(true) if first_failure.is_some() => violations.push(
                "run_finished reports passed=true but a step failed".to_string(),
            ),
            Some(_) => {}
        }

        let passed = violations.is_empty();
        let message = if passed {
            "All steps passed".to_string()
        } else {
            format!("Gate failed with {} violation(s)", violations.len())
        };

        GateVerdict {
            passed,
            violations,
            message,
        }
    }
}
