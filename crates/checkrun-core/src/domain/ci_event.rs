//! Run lifecycle event types.
//!
//! Events are emitted while a pipeline executes and persisted in the run
//! ledger. The serde tag doubles as the ledger event kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::trigger::EventKind;

/// Classification of a run lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CiEventKind {
    /// A triggered run has started executing its workflow.
    RunStarted {
        workflow: String,
        event: EventKind,
        branch: String,
        runtime: String,
        steps: Vec<String>,
    },

    /// A step is about to execute.
    StepStarted {
        index: usize,
        step: String,
        command: String,
    },

    /// A step has finished, successfully or not.
    StepFinished {
        index: usize,
        step: String,
        passed: bool,
        exit_code: i32,
        duration_ms: u64,
        #[serde(default)]
        stdout: String,
        #[serde(default)]
        stderr: String,
    },

    /// A step was not executed because an earlier step failed.
    StepSkipped { index: usize, step: String },

    /// The run is over.
    RunFinished {
        passed: bool,
        total_duration_ms: u64,
        #[serde(default)]
        failed_step: Option<String>,
    },
}

impl CiEventKind {
    /// The snake_case kind name, identical to the serde tag.
    pub fn name(&self) -> &'static str {
        match self {
            CiEventKind::RunStarted { .. } => "run_started",
            CiEventKind::StepStarted { .. } => "step_started",
            CiEventKind::StepFinished { .. } => "step_finished",
            CiEventKind::StepSkipped { .. } => "step_skipped",
            CiEventKind::RunFinished { .. } => "run_finished",
        }
    }
}

/// A single lifecycle event in a run's trace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CiEvent {
    /// Monotonically increasing sequence number within the run.
    pub seq: u64,

    /// When the event occurred.
    pub timestamp: DateTime<Utc>,

    /// Event classification and payload.
    pub kind: CiEventKind,
}

impl CiEvent {
    pub fn new(seq: u64, kind: CiEventKind) -> Self {
        Self {
            seq,
            timestamp: Utc::now(),
            kind,
        }
    }

    /// Payload for the ledger: the tagged kind as a JSON object.
    pub fn payload(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(&self.kind)
    }

    /// Rebuild the kind from a ledger payload.
    pub fn kind_from_payload(payload: &serde_json::Value) -> serde_json::Result<CiEventKind> {
        CiEventKind::deserialize(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_matches_serde_tag() {
        let kinds = vec![
            CiEventKind::RunStarted {
                workflow: "quality".to_string(),
                event: EventKind::Push,
                branch: "master".to_string(),
                runtime: "python 3.11".to_string(),
                steps: vec!["Checkout source".to_string()],
            },
            CiEventKind::StepStarted {
                index: 0,
                step: "Checkout source".to_string(),
                command: "git clone".to_string(),
            },
            CiEventKind::StepFinished {
                index: 0,
                step: "Checkout source".to_string(),
                passed: true,
                exit_code: 0,
                duration_ms: 12,
                stdout: String::new(),
                stderr: String::new(),
            },
            CiEventKind::StepSkipped {
                index: 1,
                step: "Upgrade pip".to_string(),
            },
            CiEventKind::RunFinished {
                passed: false,
                total_duration_ms: 40,
                failed_step: Some("Checkout source".to_string()),
            },
        ];

        for kind in kinds {
            let value = serde_json::to_value(&kind).expect("serialize");
            assert_eq!(value["type"], kind.name());
        }
    }

    #[test]
    fn test_payload_rebuilds_kind() {
        let event = CiEvent::new(
            3,
            CiEventKind::StepSkipped {
                index: 7,
                step: "Ruff lint (tests)".to_string(),
            },
        );
        let payload = event.payload().expect("payload");
        assert_eq!(payload["index"], 7);
        let kind = CiEvent::kind_from_payload(&payload).expect("deserialize");
        assert_eq!(kind, event.kind);
    }

    #[test]
    fn test_step_finished_tolerates_missing_output() {
        let payload = serde_json::json!({
            "type": "step_finished",
            "index": 0,
            "step": "Upgrade pip",
            "passed": true,
            "exit_code": 0,
            "duration_ms": 5
        });
        let kind = CiEvent::kind_from_payload(&payload).expect("deserialize");
        assert!(matches!(kind, CiEventKind::StepFinished { stdout, .. } if stdout.is_empty()));
    }
}
