//! Step execution backends.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use checkrun_core::Step;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Everything needed to execute one step inside a run environment.
#[derive(Debug, Clone)]
pub struct StepInvocation {
    pub step: Step,

    /// Shell the command is handed to as `<shell> -c <run>`.
    pub shell: String,

    /// Working directory (the run workspace).
    pub workdir: PathBuf,

    /// Full environment overlay: run variables plus the step's own.
    pub env: BTreeMap<String, String>,

    /// `None` means no timeout.
    pub timeout: Option<Duration>,
}

/// Raw outcome of a process that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl StepOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Backend that executes a step's command.
///
/// An `Err` means the command could not be run to completion (spawn
/// failure, timeout); the pipeline records it as a failed step.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, invocation: &StepInvocation) -> anyhow::Result<StepOutput>;
}

/// Executes steps as child processes through the workflow's shell.
///
/// On unix each step runs in its own process group. When the shell exits or
/// the step times out, the whole group is killed, so nothing a step started
/// outlives it or keeps its output pipes open.
#[derive(Debug, Default, Clone)]
pub struct ShellExecutor;

#[async_trait]
impl StepExecutor for ShellExecutor {
    async fn execute(&self, invocation: &StepInvocation) -> anyhow::Result<StepOutput> {
        let mut command = Command::new(&invocation.shell);
        command
            .arg("-c")
            .arg(&invocation.step.run)
            .current_dir(&invocation.workdir)
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| {
            anyhow::anyhow!(
                "Step '{}' could not start '{}': {}",
                invocation.step.name,
                invocation.shell,
                e
            )
        })?;
        let group = child.id();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // The pipes are drained while waiting; once the shell has exited its
        // group is killed so leftover background jobs release them.
        let run = async {
            let (status, stdout, stderr) = tokio::join!(
                async {
                    let status = child.wait().await;
                    kill_process_group(group).await;
                    status
                },
                read_pipe(stdout),
                read_pipe(stderr),
            );
            Ok::<_, std::io::Error>((status?, stdout?, stderr?))
        };

        let (status, stdout, stderr) = match invocation.timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(result) => result?,
                Err(_) => {
                    kill_process_group(group).await;
                    anyhow::bail!(
                        "Step '{}' timed out after {} seconds",
                        invocation.step.name,
                        limit.as_secs()
                    );
                }
            },
            None => run.await?,
        };

        Ok(StepOutput {
            exit_code: status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).to_string(),
        })
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// SIGKILL every process in the step's group. Best-effort: the group may
/// already be empty.
#[cfg(unix)]
async fn kill_process_group(group: Option<u32>) {
    let Some(pgid) = group else {
        return;
    };
    let _ = Command::new("kill")
        .arg("-KILL")
        .arg("--")
        .arg(format!("-{}", pgid))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
}

#[cfg(not(unix))]
async fn kill_process_group(_group: Option<u32>) {}
