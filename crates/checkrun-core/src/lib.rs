//! checkrun core library
//!
//! Domain model shared by the pipeline engine and the CLI: trigger policy,
//! workflow definitions, steps and the run event vocabulary, plus the
//! tracing setup used by every binary.

pub mod domain;
pub mod obs;
pub mod telemetry;

pub use domain::{
    normalize_branch, BranchFilter, CheckrunError, CiEvent, CiEventKind, EventKind, Result,
    RuntimeSpec, Step, TriggerEvent, TriggerPolicy, Workflow, DEFAULT_STEP_TIMEOUT_SECS,
};

pub use obs::{
    emit_gate_evaluated, emit_run_finalize_error, emit_run_finished, emit_run_started,
    emit_step_finished, emit_trigger_evaluated, RunSpan,
};
pub use telemetry::init_tracing;

/// checkrun version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
