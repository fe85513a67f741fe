//! checkrun - fail-fast CI pipeline runner
//!
//! ## Commands
//!
//! - `trigger`: decide whether an event would start a run
//! - `plan`: show the workflow's steps and digest
//! - `run`: evaluate an event and, if it triggers, execute the pipeline
//! - `runs`: list recorded runs
//! - `gate`: re-check a recorded run's event log

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, Level};

use checkrun_ci::{CiGate, CiPipeline, DispatchOutcome, Dispatcher, GateVerdict, ShellExecutor};
use checkrun_core::{emit_gate_evaluated, EventKind, RunSpan, TriggerEvent, Workflow};
use checkrun_state::{FsRunLedger, RunId, RunLedger};

#[derive(Parser)]
#[command(name = "checkrun")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Fail-fast CI pipeline runner", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Workflow YAML file (default: built-in quality workflow)
    #[arg(long, global = true, env = "CHECKRUN_WORKFLOW")]
    workflow: Option<PathBuf>,

    /// Run ledger directory
    #[arg(long, global = true, env = "CHECKRUN_LEDGER_DIR", default_value = ".checkrun")]
    ledger_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether an event would trigger a run (exit 0 = yes, 1 = no)
    Trigger {
        #[command(flatten)]
        event: EventArgs,
    },

    /// Show the workflow that would run
    Plan {
        /// Print the workflow as YAML
        #[arg(long)]
        yaml: bool,
    },

    /// Evaluate an event and run the pipeline if it triggers
    Run {
        #[command(flatten)]
        event: EventArgs,

        /// Repository to check out (path or URL)
        #[arg(long, default_value = ".")]
        source: String,

        /// Parent directory for run workspaces (default: system temp dir)
        #[arg(long)]
        work_root: Option<PathBuf>,
    },

    /// List recorded runs, newest first
    Runs {
        /// Maximum number of runs to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Evaluate the gate over a recorded run
    Gate {
        /// Run ID
        #[arg(long)]
        run: String,
    },
}

#[derive(Args, Debug, Clone)]
struct EventArgs {
    /// Event kind: push or pull_request
    #[arg(short, long, default_value = "push")]
    event: EventKind,

    /// Target branch (a full ref such as refs/heads/master is accepted)
    #[arg(short, long, required_unless_present = "event_path")]
    branch: Option<String>,

    /// Webhook JSON payload to read the branch and commit from
    #[arg(long, conflicts_with = "branch")]
    event_path: Option<PathBuf>,

    /// Commit SHA (default: from the payload, or `git rev-parse HEAD`)
    #[arg(long)]
    sha: Option<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    checkrun_core::init_tracing(cli.json, level);

    let workflow = load_workflow(cli.workflow.as_deref())?;

    match cli.command {
        Commands::Trigger { event } => {
            let event = resolve_event(&event)?;
            let matched = cmd_trigger(&workflow, &event);
            Ok(if matched {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Plan { yaml } => {
            cmd_plan(&workflow, yaml)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run {
            event,
            source,
            work_root,
        } => {
            let mut trigger = resolve_event(&event)?;
            if trigger.sha.is_none() {
                trigger.sha = detect_git_sha(&source);
            }
            let ledger = open_ledger(&cli.ledger_dir)?;
            cmd_run(ledger, workflow, trigger, &source, work_root.as_deref()).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Runs { limit } => {
            let ledger = open_ledger(&cli.ledger_dir)?;
            cmd_runs(ledger.as_ref(), limit).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Gate { run } => {
            let ledger = open_ledger(&cli.ledger_dir)?;
            let verdict = cmd_gate(ledger.as_ref(), &run).await?;
            if verdict.passed {
                Ok(ExitCode::SUCCESS)
            } else {
                anyhow::bail!("Gate failed for run {}", run)
            }
        }
    }
}

fn load_workflow(path: Option<&Path>) -> Result<Workflow> {
    match path {
        Some(path) => Workflow::load(path)
            .with_context(|| format!("Failed to load workflow from {}", path.display())),
        None => Ok(Workflow::default()),
    }
}

fn open_ledger(dir: &Path) -> Result<Arc<FsRunLedger>> {
    let ledger = FsRunLedger::new(dir)
        .with_context(|| format!("Failed to open run ledger at {}", dir.display()))?;
    Ok(Arc::new(ledger))
}

/// Build the trigger event from flags or a webhook payload file.
fn resolve_event(args: &EventArgs) -> Result<TriggerEvent> {
    let mut event = match (&args.event_path, &args.branch) {
        (Some(path), _) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read event payload {}", path.display()))?;
            let payload: serde_json::Value = serde_json::from_str(&raw)
                .with_context(|| format!("Event payload {} is not JSON", path.display()))?;
            TriggerEvent::from_webhook(args.event, &payload)?
        }
        (None, Some(branch)) => TriggerEvent::new(args.event, branch),
        (None, None) => anyhow::bail!("Either --branch or --event-path is required"),
    };
    if let Some(sha) = &args.sha {
        event.sha = Some(sha.clone());
    }
    Ok(event)
}

fn detect_git_sha(source: &str) -> Option<String> {
    if !Path::new(source).is_dir() {
        return None;
    }
    let output = std::process::Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(source)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!sha.is_empty()).then_some(sha)
}

/// Report whether `event` triggers `workflow`.
fn cmd_trigger(workflow: &Workflow, event: &TriggerEvent) -> bool {
    let matched = workflow.should_run(event);
    checkrun_core::emit_trigger_evaluated(&workflow.name, event, matched);
    if matched {
        println!(
            "{} on '{}' triggers workflow '{}'",
            event.kind, event.branch, workflow.name
        );
    } else {
        println!(
            "{} on '{}' does not trigger workflow '{}'",
            event.kind, event.branch, workflow.name
        );
    }
    matched
}

fn cmd_plan(workflow: &Workflow, yaml: bool) -> Result<()> {
    workflow.validate()?;

    if yaml {
        print!("{}", workflow.to_yaml()?);
        return Ok(());
    }

    let events: Vec<&str> = workflow.trigger.events.iter().map(|e| e.as_str()).collect();
    let branches: Vec<&str> = workflow
        .trigger
        .branches
        .iter()
        .map(|b| b.pattern())
        .collect();

    println!("Workflow: {}", workflow.name);
    println!(
        "Runtime:  {} {}",
        workflow.runtime.language, workflow.runtime.version
    );
    println!("On:       {} -> {}", events.join(", "), branches.join(", "));
    println!("Digest:   {}", workflow.digest());
    println!();
    for (i, step) in workflow.steps.iter().enumerate() {
        println!("  {:>2}. {}", i + 1, step.name);
        println!("      $ {}", step.run);
    }
    Ok(())
}

async fn cmd_run(
    ledger: Arc<FsRunLedger>,
    workflow: Workflow,
    event: TriggerEvent,
    source: &str,
    work_root: Option<&Path>,
) -> Result<()> {
    let mut pipeline = CiPipeline::new(ledger.clone(), Arc::new(ShellExecutor));
    if let Some(root) = work_root {
        pipeline = pipeline.with_work_root(root);
    }
    let dispatcher = Dispatcher::new(pipeline, workflow, source);

    println!(
        "Workflow '{}' for {} on '{}'",
        dispatcher.workflow().name,
        event.kind,
        event.branch
    );
    if let Some(sha) = &event.sha {
        println!("Git SHA: {}", sha);
    }
    println!();

    let result = match dispatcher
        .dispatch(event)
        .await
        .context("CI pipeline failed to run")?
    {
        DispatchOutcome::Ran(result) => result,
        DispatchOutcome::NotTriggered(_) => {
            println!("Event does not match the trigger policy; nothing to run.");
            return Ok(());
        }
    };

    // Print results
    println!("Run ID: {}", result.run_id);
    println!(
        "Status: {}",
        if result.success() {
            "✓ PASSED"
        } else {
            "✗ FAILED"
        }
    );
    println!("Duration: {}ms", result.duration_ms);
    println!();

    for step in &result.steps {
        let status = if step.passed() { "✓" } else { "✗" };
        println!(
            "  {} {} ({}ms, exit code: {})",
            status, step.step_name, step.duration_ms, step.exit_code
        );
    }
    for name in &result.skipped {
        println!("  - {} (skipped)", name);
    }
    if let Some(failed) = result.failed_step() {
        let output = if failed.stderr.trim().is_empty() {
            &failed.stdout
        } else {
            &failed.stderr
        };
        if !output.trim().is_empty() {
            println!();
            println!("Output of '{}':", failed.step_name);
            for line in output.trim_end().lines() {
                println!("    {}", line);
            }
        }
    }

    println!();
    println!(
        "Summary: {}/{} steps passed",
        result.passed_count(),
        result.steps.len() + result.skipped.len()
    );

    // Evaluate gate
    let verdict = evaluate_gate(ledger.as_ref(), &result.run_id).await?;

    result.ensure_success().context("CI checks failed")?;
    if !verdict.passed {
        anyhow::bail!("CI checks failed: gate rejected run {}", result.run_id);
    }

    info!(run_id = %result.run_id, "All checks passed");
    println!("\n✓ All checks passed!");
    Ok(())
}

async fn cmd_runs(ledger: &dyn RunLedger, limit: usize) -> Result<()> {
    let runs = ledger.list_runs(None).await?;
    if runs.is_empty() {
        println!("No runs recorded.");
        return Ok(());
    }

    for record in runs.iter().rev().take(limit) {
        let duration = record
            .summary
            .as_ref()
            .map(|s| format!("{}ms", s.duration_ms))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {:<9}  {:<12} {:<20} {:>8}  {}",
            record.run_id,
            format!("{:?}", record.status),
            record.metadata.event,
            record.metadata.branch,
            duration,
            record.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

async fn cmd_gate(ledger: &dyn RunLedger, run_id: &str) -> Result<GateVerdict> {
    let _span = RunSpan::enter(run_id);
    evaluate_gate(ledger, run_id).await
}

async fn evaluate_gate(ledger: &dyn RunLedger, run_id: &str) -> Result<GateVerdict> {
    let id = RunId::parse(run_id)?;
    let events = ledger
        .get_events(&id)
        .await
        .with_context(|| format!("Failed to load events for run {}", run_id))?;

    let verdict = CiGate::evaluate(&events);
    emit_gate_evaluated(run_id, verdict.violations.len(), verdict.passed);

    println!(
        "Gate: {}",
        if verdict.passed {
            "✓ PASSED"
        } else {
            "✗ FAILED"
        }
    );
    if !verdict.violations.is_empty() {
        println!("Violations:");
        for violation in &verdict.violations {
            println!("  - {}", violation);
        }
    }
    Ok(verdict)
}
