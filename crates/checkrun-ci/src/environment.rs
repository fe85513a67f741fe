//! Ephemeral per-run execution environment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use checkrun_core::{Step, TriggerEvent, Workflow};
use tempfile::TempDir;
use tracing::debug;

use crate::executor::StepInvocation;

/// A fresh workspace directory plus the variables every step sees.
///
/// The directory is removed when the environment is dropped, whatever the
/// outcome of the run.
#[derive(Debug)]
pub struct Environment {
    dir: TempDir,
    vars: BTreeMap<String, String>,
    shell: String,
}

impl Environment {
    /// Provision a workspace for one run of `workflow`.
    ///
    /// `source` is what the checkout step clones from. Local paths are made
    /// absolute because steps run inside the new workspace. `base` selects
    /// the parent directory (system temp dir when `None`).
    pub fn provision(
        workflow: &Workflow,
        event: &TriggerEvent,
        source: &str,
        run_id: &str,
        base: Option<&Path>,
    ) -> anyhow::Result<Self> {
        let builder = {
            let mut b = tempfile::Builder::new();
            b.prefix("checkrun-");
            b
        };
        let dir = match base {
            Some(base) => {
                std::fs::create_dir_all(base)
                    .with_context(|| format!("Failed to create work root {}", base.display()))?;
                builder.tempdir_in(base)
            }
            None => builder.tempdir(),
        }
        .context("Failed to create run workspace")?;

        let workspace = dir.path().to_path_buf();
        let source = resolve_source(source);

        let mut vars = BTreeMap::new();
        vars.insert("CI".to_string(), "true".to_string());
        vars.insert("CHECKRUN_RUN_ID".to_string(), run_id.to_string());
        vars.insert("CHECKRUN_SOURCE".to_string(), source);
        vars.insert(
            "CHECKRUN_WORKSPACE".to_string(),
            workspace.to_string_lossy().into_owned(),
        );
        vars.insert(
            "CHECKRUN_RUNTIME".to_string(),
            workflow.runtime.language.clone(),
        );
        vars.insert(
            "CHECKRUN_RUNTIME_VERSION".to_string(),
            workflow.runtime.version.clone(),
        );
        vars.insert("CHECKRUN_EVENT".to_string(), event.kind.to_string());
        vars.insert("CHECKRUN_BRANCH".to_string(), event.branch.clone());
        if let Some(sha) = &event.sha {
            vars.insert("CHECKRUN_SHA".to_string(), sha.clone());
        }
        vars.insert(
            "PATH".to_string(),
            search_path(&workspace, &workflow.path, std::env::var("PATH").ok()),
        );

        debug!(workspace = %workspace.display(), "provisioned run environment");

        Ok(Self {
            dir,
            vars,
            shell: workflow.shell.clone(),
        })
    }

    pub fn workdir(&self) -> &Path {
        self.dir.path()
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    /// Build the invocation for `step`; step variables override run variables.
    pub fn invocation(&self, step: &Step, timeout_secs: u64) -> StepInvocation {
        let mut env = self.vars.clone();
        env.extend(step.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        StepInvocation {
            step: step.clone(),
            shell: self.shell.clone(),
            workdir: self.workdir().to_path_buf(),
            env,
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
        }
    }
}

fn resolve_source(source: &str) -> String {
    let path = Path::new(source);
    if path.exists() {
        if let Ok(abs) = path.canonicalize() {
            return abs.to_string_lossy().into_owned();
        }
    }
    source.to_string()
}

fn search_path(workspace: &Path, extra: &[String], inherited: Option<String>) -> String {
    let mut entries: Vec<PathBuf> = extra.iter().map(|p| workspace.join(p)).collect();
    if let Some(inherited) = inherited {
        entries.extend(std::env::split_paths(&inherited));
    }
    std::env::join_paths(&entries)
        .map(|joined| joined.to_string_lossy().into_owned())
        .unwrap_or_else(|_| {
            entries
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join(":")
        })
}
