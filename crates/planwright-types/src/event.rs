//! Event types for the plan execution event bus.
//!
//! `PlanEvent` is broadcast while a plan runs. All variants are
//! Clone + Send + Sync for use with tokio broadcast channels.

use serde::{Deserialize, Serialize};

use crate::plan::{ExecutionModel, OnError, PlanId, StepId};

/// Events emitted during plan execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlanEvent {
    /// Execution of a plan has begun.
    PlanStarted {
        plan_id: PlanId,
        execution_model: ExecutionModel,
        total_steps: usize,
    },

    /// A step invocation is about to start.
    StepStarted {
        plan_id: PlanId,
        step_id: StepId,
        action: String,
        attempt: u32,
    },

    /// A step attempt failed and will be retried after `delay_ms`.
    StepRetrying {
        plan_id: PlanId,
        step_id: StepId,
        attempt: u32,
        delay_ms: u64,
        error: String,
    },

    /// A step has completed successfully.
    StepCompleted {
        plan_id: PlanId,
        step_id: StepId,
        action: String,
        attempts: u32,
        duration_ms: u64,
    },

    /// A step failed for good; `on_error` says what happens next.
    StepFailed {
        plan_id: PlanId,
        step_id: StepId,
        action: String,
        error: String,
        on_error: OnError,
    },

    /// Cancellation was observed at a step boundary.
    PlanCancelled { plan_id: PlanId },

    /// Execution finished (successfully or not).
    PlanFinished {
        plan_id: PlanId,
        success: bool,
        completed_steps: usize,
        total_steps: usize,
        duration_ms: u64,
    },
}

impl PlanEvent {
    /// The plan this event belongs to.
    pub fn plan_id(&self) -> PlanId {
        match self {
            PlanEvent::PlanStarted { plan_id, .. }
            | PlanEvent::StepStarted { plan_id, .. }
            | PlanEvent::StepRetrying { plan_id, .. }
            | PlanEvent::StepCompleted { plan_id, .. }
            | PlanEvent::StepFailed { plan_id, .. }
            | PlanEvent::PlanCancelled { plan_id }
            | PlanEvent::PlanFinished { plan_id, .. } => *plan_id,
        }
    }
}
