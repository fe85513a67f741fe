//! Single-step execution.

use std::time::Instant;

use crate::executor::{StepExecutor, StepInvocation};

/// Result of a step execution.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Position of the step in the workflow (0-based).
    pub index: usize,

    /// Step display name.
    pub step_name: String,

    /// Exit code (0 = success, -1 = could not run to completion).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr, or the execution error.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Whether execution succeeded.
    pub success: bool,
}

impl StepResult {
    /// Whether this step passed (exit code 0).
    pub fn passed(&self) -> bool {
        self.success && self.exit_code == 0
    }
}

/// Runs one step through an executor and normalizes the outcome.
pub struct CiRunner;

impl CiRunner {
    /// Execute a single step.
    ///
    /// Never fails: spawn errors and timeouts become a failed [`StepResult`]
    /// with exit code -1, so the pipeline sees a single failure kind.
    pub async fn execute_step(
        executor: &dyn StepExecutor,
        index: usize,
        invocation: &StepInvocation,
    ) -> StepResult {
        let start = Instant::now();
        let outcome = executor.execute(invocation).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => StepResult {
                index,
                step_name: invocation.step.name.clone(),
                exit_code: output.exit_code,
                success: output.success(),
                stdout: output.stdout,
                stderr: output.stderr,
                duration_ms,
            },
            Err(e) => StepResult {
                index,
                step_name: invocation.step.name.clone(),
                exit_code: -1,
                stdout: String::new(),
                stderr: format!("{:#}", e),
                duration_ms,
                success: false,
            },
        }
    }
}

/// Keep at most the last `max_bytes` of `text`, cut on a char boundary.
pub(crate) fn tail(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}
