//! Workflow definition: trigger policy, runtime pin and the ordered steps.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::error::{CheckrunError, Result};
use crate::domain::step::Step;
use crate::domain::trigger::{TriggerEvent, TriggerPolicy};

/// Default per-step timeout in seconds (30 minutes).
pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 1_800;

/// Language runtime a run's environment is pinned to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuntimeSpec {
    pub language: String,
    pub version: String,
}

impl RuntimeSpec {
    pub fn new(language: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            version: version.into(),
        }
    }
}

/// A complete pipeline definition.
///
/// Steps run strictly in declaration order and the list is never modified
/// once a run starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Workflow {
    pub name: String,

    #[serde(rename = "on", default)]
    pub trigger: TriggerPolicy,

    pub runtime: RuntimeSpec,

    /// Directories, relative to the run workspace, prepended to `PATH`.
    #[serde(default)]
    pub path: Vec<String>,

    #[serde(default = "default_shell")]
    pub shell: String,

    #[serde(default = "default_step_timeout")]
    pub step_timeout_secs: u64,

    pub steps: Vec<Step>,
}

fn default_shell() -> String {
    "sh".to_string()
}

fn default_step_timeout() -> u64 {
    DEFAULT_STEP_TIMEOUT_SECS
}

impl Default for Workflow {
    /// The Python quality workflow over `astrapy` and `tests` on Python 3.11.
    fn default() -> Self {
        Self::python_quality("3.11", &["astrapy", "tests"])
    }
}

impl Workflow {
    /// Quality-check workflow for a Python project.
    ///
    /// Checkout, runtime provisioning, installer upgrade, runtime and dev
    /// dependency installs, a formatter check over the tree, then the linter
    /// for every target followed by the type checker for every target.
    pub fn python_quality(version: &str, targets: &[&str]) -> Self {
        let mut steps = vec![
            Step::new("Checkout source", "git clone --quiet \"$CHECKRUN_SOURCE\" ."),
            Step::new(
                format!("Set up Python {version}"),
                "python$CHECKRUN_RUNTIME_VERSION -m venv .venv",
            ),
            Step::new("Upgrade pip", "python -m pip install --upgrade pip"),
            Step::new("Install dependencies", "pip install -r requirements.txt"),
            Step::new(
                "Install dev dependencies",
                "pip install -r requirements-dev.txt",
            ),
            Step::new("Black formatting check", "black --check ."),
        ];
        for target in targets {
            steps.push(Step::new(
                format!("Ruff lint ({target})"),
                format!("ruff {target}"),
            ));
        }
        for target in targets {
            steps.push(Step::new(format!("Mypy ({target})"), format!("mypy {target}")));
        }

        Self {
            name: "quality".to_string(),
            trigger: TriggerPolicy::default(),
            runtime: RuntimeSpec::new("python", version),
            path: vec![".venv/bin".to_string()],
            shell: default_shell(),
            step_timeout_secs: DEFAULT_STEP_TIMEOUT_SECS,
            steps,
        }
    }

    /// Parse and validate a workflow from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let workflow: Workflow = serde_yaml::from_str(yaml)?;
        workflow.validate()?;
        Ok(workflow)
    }

    /// Load and validate a workflow file.
    pub fn load(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(CheckrunError::InvalidWorkflow(msg));

        if self.name.trim().is_empty() {
            return invalid("name cannot be empty".to_string());
        }
        if self.runtime.version.trim().is_empty() {
            return invalid("runtime.version cannot be empty".to_string());
        }
        if self.shell.trim().is_empty() {
            return invalid("shell cannot be empty".to_string());
        }
        if self.trigger.events.is_empty() {
            return invalid("on.events cannot be empty".to_string());
        }
        if self.trigger.branches.is_empty() {
            return invalid("on.branches cannot be empty".to_string());
        }
        if self.steps.is_empty() {
            return invalid("steps cannot be empty".to_string());
        }
        for (index, step) in self.steps.iter().enumerate() {
            if step.name.trim().is_empty() {
                return invalid(format!("step {} has an empty name", index + 1));
            }
            if step.run.trim().is_empty() {
                return invalid(format!("step '{}' has an empty command", step.name));
            }
        }
        Ok(())
    }

    pub fn should_run(&self, event: &TriggerEvent) -> bool {
        self.trigger.should_run(event)
    }

    pub fn step_names(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.name.clone()).collect()
    }

    /// Timeout for `step` in seconds; `0` means unbounded.
    pub fn effective_timeout(&self, step: &Step) -> u64 {
        step.timeout_secs.unwrap_or(self.step_timeout_secs)
    }

    /// SHA-256 over the runtime pin and the ordered (name, command) pairs.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.runtime.language.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.runtime.version.as_bytes());
        hasher.update(b"\0");
        for step in &self.steps {
            hasher.update(step.name.as_bytes());
            hasher.update(b"\0");
            hasher.update(step.run.as_bytes());
            hasher.update(b"\0");
        }
        hex::encode(hasher.finalize())
    }
}
