//! Event dispatch: trigger evaluation in front of the pipeline.

use checkrun_core::{emit_trigger_evaluated, TriggerEvent, Workflow};
use futures::future::join_all;
use tracing::info;

use crate::pipeline::{CiPipeline, PipelineResult};

/// What happened to one event.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// The trigger policy did not match; no run was created.
    NotTriggered(TriggerEvent),
    /// A run was executed (successfully or not).
    Ran(PipelineResult),
}

impl DispatchOutcome {
    pub fn triggered(&self) -> bool {
        matches!(self, DispatchOutcome::Ran(_))
    }

    pub fn result(&self) -> Option<&PipelineResult> {
        match self {
            DispatchOutcome::Ran(result) => Some(result),
            DispatchOutcome::NotTriggered(_) => None,
        }
    }
}

/// Routes repository events to pipeline runs of one workflow.
pub struct Dispatcher {
    pipeline: CiPipeline,
    workflow: Workflow,
    source: String,
}

impl Dispatcher {
    pub fn new(pipeline: CiPipeline, workflow: Workflow, source: impl Into<String>) -> Self {
        Self {
            pipeline,
            workflow,
            source: source.into(),
        }
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    /// Trigger decision for `event`, without running anything.
    pub fn evaluate(&self, event: &TriggerEvent) -> bool {
        let matched = self.workflow.should_run(event);
        emit_trigger_evaluated(&self.workflow.name, event, matched);
        matched
    }

    /// Evaluate the trigger and, if it matches, execute one run.
    pub async fn dispatch(&self, event: TriggerEvent) -> anyhow::Result<DispatchOutcome> {
        if !self.evaluate(&event) {
            info!(kind = %event.kind, branch = %event.branch, "Event did not match trigger; no run");
            return Ok(DispatchOutcome::NotTriggered(event));
        }
        let result = self.pipeline.run(&self.workflow, &event, &self.source).await?;
        Ok(DispatchOutcome::Ran(result))
    }

    /// Dispatch every event; triggered runs execute concurrently, each in its
    /// own environment. Outcomes are returned in input order.
    pub async fn dispatch_all(
        &self,
        events: Vec<TriggerEvent>,
    ) -> Vec<anyhow::Result<DispatchOutcome>> {
        join_all(events.into_iter().map(|event| self.dispatch(event))).await
    }
}
