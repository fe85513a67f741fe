//! Domain types for checkrun.

pub mod ci_event;
pub mod error;
pub mod step;
pub mod trigger;
pub mod workflow;

pub use ci_event::{CiEvent, CiEventKind};
pub use error::{CheckrunError, Result};
pub use step::Step;
pub use trigger::{normalize_branch, BranchFilter, EventKind, TriggerEvent, TriggerPolicy};
pub use workflow::{RuntimeSpec, Workflow, DEFAULT_STEP_TIMEOUT_SECS};
