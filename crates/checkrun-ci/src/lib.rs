//! checkrun CI - fail-fast pipeline execution
//!
//! Provides the pipeline engine that:
//! - Evaluates repository events against a workflow's trigger policy
//! - Provisions an ephemeral environment per run
//! - Executes steps in order and stops at the first failure
//! - Records every run into a run ledger and evaluates gates over it

pub mod dispatch;
pub mod environment;
pub mod executor;
pub mod gate;
pub mod pipeline;
pub mod recording;
pub mod runner;

// Re-export key types
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use environment::Environment;
pub use executor::{ShellExecutor, StepExecutor, StepInvocation, StepOutput};
pub use gate::{CiGate, GateVerdict};
pub use pipeline::{CiPipeline, PipelineResult, RunOutcome};
pub use recording::RunRecorder;
pub use runner::{CiRunner, StepResult};
