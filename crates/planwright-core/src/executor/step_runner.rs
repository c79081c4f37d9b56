//! Single-step execution with retry and exponential backoff.
//!
//! `StepRunner` resolves a step's action, builds its invocation context, and
//! invokes it up to `max_retries + 1` times, sleeping
//! `backoff_ms * backoff_multiplier^(attempt - 1)` between attempts. An
//! unresolvable action fails immediately without retrying. What happens after
//! the last failed attempt is the caller's decision (the step's on-error
//! policy).

use std::sync::Arc;

use chrono::Utc;
use planwright_types::event::PlanEvent;
use planwright_types::execution::{MessageContext, StepResult};
use planwright_types::plan::{PlanId, PlanStep};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info_span};

use crate::action::{ActionContext, ActionRegistry};
use crate::event::EventBus;
use crate::memory::WorkingMemory;

// ---------------------------------------------------------------------------
// StepError
// ---------------------------------------------------------------------------

/// Why a step did not produce a result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    /// No registered action matches the step's action name.
    #[error("action '{0}' is not registered")]
    ActionNotFound(String),

    /// Every permitted attempt failed; `message` is the last error.
    #[error("failed after {attempts} attempt(s): {message}")]
    Failed { attempts: u32, message: String },
}

impl StepError {
    /// Invocations made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            StepError::ActionNotFound(_) => 0,
            StepError::Failed { attempts, .. } => *attempts,
        }
    }
}

// ---------------------------------------------------------------------------
// StepInvocation
// ---------------------------------------------------------------------------

/// Execution-wide state handed to every step of one run.
#[derive(Debug, Clone)]
pub struct StepInvocation {
    pub plan_id: PlanId,
    /// Results completed before this step starts.
    pub previous: Vec<StepResult>,
    pub memory: WorkingMemory,
    pub message: MessageContext,
    pub cancel: CancellationToken,
}

// ---------------------------------------------------------------------------
// StepRunner
// ---------------------------------------------------------------------------

/// Runs individual plan steps. Cheap to clone.
#[derive(Debug, Clone)]
pub struct StepRunner {
    actions: Arc<ActionRegistry>,
    events: EventBus,
}

impl StepRunner {
    pub fn new(actions: Arc<ActionRegistry>, events: EventBus) -> Self {
        Self { actions, events }
    }

    /// Run one step to success or until its retries are exhausted.
    pub async fn run(
        &self,
        step: &PlanStep,
        invocation: &StepInvocation,
    ) -> Result<StepResult, StepError> {
        let span = info_span!(
            "plan.step",
            plan.id = %invocation.plan_id,
            step.id = %step.id,
            step.action = %step.action,
            step.max_retries = step.retry.max_retries,
        );
        self.run_attempts(step, invocation).instrument(span).await
    }

    async fn run_attempts(
        &self,
        step: &PlanStep,
        invocation: &StepInvocation,
    ) -> Result<StepResult, StepError> {
        let Some(action) = self.actions.resolve(&step.action) else {
            tracing::warn!(action = %step.action, "no registered action matches step");
            return Err(StepError::ActionNotFound(step.action.clone()));
        };

        let started = Instant::now();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.events.publish(PlanEvent::StepStarted {
                plan_id: invocation.plan_id,
                step_id: step.id,
                action: step.action.clone(),
                attempt,
            });

            let ctx = ActionContext {
                plan_id: invocation.plan_id,
                step_id: step.id,
                parameters: step.parameters.clone(),
                previous_results: invocation.previous.clone(),
                memory: invocation.memory.clone(),
                memory_snapshot: invocation.memory.snapshot(),
                message: invocation.message.clone(),
                cancel: invocation.cancel.clone(),
            };

            match action.invoke(ctx).await {
                Ok(output) => {
                    let duration_ms = started.elapsed().as_millis() as u64;
                    tracing::debug!(attempt, duration_ms, "step completed");
                    self.events.publish(PlanEvent::StepCompleted {
                        plan_id: invocation.plan_id,
                        step_id: step.id,
                        action: step.action.clone(),
                        attempts: attempt,
                        duration_ms,
                    });
                    return Ok(StepResult {
                        step_id: step.id,
                        action: step.action.clone(),
                        text: output.text,
                        data: output.data,
                        attempts: attempt,
                        completed_at: Utc::now(),
                    });
                }
                Err(e) if attempt <= step.retry.max_retries => {
                    let delay = step.retry.backoff_for(attempt);
                    let delay_ms = delay.as_millis() as u64;
                    tracing::warn!(attempt, delay_ms, error = %e, "step attempt failed, retrying");
                    self.events.publish(PlanEvent::StepRetrying {
                        plan_id: invocation.plan_id,
                        step_id: step.id,
                        attempt,
                        delay_ms,
                        error: e.to_string(),
                    });
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "step failed, retries exhausted");
                    return Err(StepError::Failed {
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingAction, MemoryWriteAction, StaticAction};
    use planwright_types::plan::RetryPolicy;
    use serde_json::json;
    use std::time::Duration;

    fn invocation() -> StepInvocation {
        StepInvocation {
            plan_id: PlanId::new(),
            previous: Vec::new(),
            memory: WorkingMemory::new(),
            message: MessageContext::from_text("hi"),
            cancel: CancellationToken::new(),
        }
    }

    fn runner(actions: ActionRegistry) -> StepRunner {
        StepRunner::new(Arc::new(actions), EventBus::new(64))
    }

    #[tokio::test]
    async fn stamps_result_with_step_identity() {
        let runner = runner(ActionRegistry::new().with(StaticAction::new("REPLY", "hello")));
        let step = PlanStep::new("reply");

        let result = runner.run(&step, &invocation()).await.unwrap();
        assert_eq!(result.step_id, step.id);
        assert_eq!(result.action, "reply");
        assert_eq!(result.text.as_deref(), Some("hello"));
        assert_eq!(result.attempts, 1);
    }

    #[tokio::test]
    async fn unknown_action_fails_without_retry() {
        let runner = runner(ActionRegistry::new());
        let step = PlanStep::new("NOPE");
        let err = runner.run(&step, &invocation()).await.unwrap_err();
        assert_eq!(err, StepError::ActionNotFound("NOPE".into()));
        assert_eq!(err.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_step_is_invoked_max_retries_plus_one_times() {
        let failing = FailingAction::always("FLAKY");
        let calls = failing.calls();
        let runner = runner(ActionRegistry::new().with(failing));
        let step = PlanStep::new("FLAKY").with_retry(RetryPolicy {
            max_retries: 2,
            backoff_ms: 1000,
            backoff_multiplier: 2.0,
            ..RetryPolicy::default()
        });

        let started = tokio::time::Instant::now();
        let err = runner.run(&step, &invocation()).await.unwrap_err();
        let waited = started.elapsed();

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
        assert_eq!(err.attempts(), 3);
        // 1000 ms + 2000 ms of backoff
        assert!(waited >= Duration::from_millis(3000), "waited {waited:?}");
        assert!(waited < Duration::from_millis(4000), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_on_a_later_attempt() {
        let flaky = FailingAction::times("FLAKY", 1);
        let calls = flaky.calls();
        let runner = runner(ActionRegistry::new().with(flaky));
        let step = PlanStep::new("FLAKY");

        let result = runner.run(&step, &invocation()).await.unwrap();
        assert_eq!(result.attempts, 2);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn zero_retries_means_one_attempt() {
        let failing = FailingAction::always("FLAKY");
        let calls = failing.calls();
        let runner = runner(ActionRegistry::new().with(failing));
        let step = PlanStep::new("FLAKY").with_retry(RetryPolicy::no_retry());

        let err = runner.run(&step, &invocation()).await.unwrap_err();
        assert!(matches!(err, StepError::Failed { attempts: 1, .. }));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_retry_events() {
        let bus = EventBus::new(64);
        let mut rx = bus.subscribe();
        let runner = StepRunner::new(
            Arc::new(ActionRegistry::new().with(FailingAction::times("FLAKY", 1))),
            bus,
        );
        let step = PlanStep::new("FLAKY");
        runner.run(&step, &invocation()).await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(match event {
                PlanEvent::StepStarted { attempt, .. } => format!("started:{attempt}"),
                PlanEvent::StepRetrying { delay_ms, .. } => format!("retrying:{delay_ms}"),
                PlanEvent::StepCompleted { attempts, .. } => format!("completed:{attempts}"),
                other => format!("{other:?}"),
            });
        }
        assert_eq!(
            kinds,
            vec!["started:1", "retrying:1000", "started:2", "completed:2"]
        );
    }

    #[tokio::test]
    async fn actions_see_shared_memory() {
        let runner = runner(
            ActionRegistry::new().with(MemoryWriteAction::new("REMEMBER", "topic", json!("rust"))),
        );
        let inv = invocation();
        runner.run(&PlanStep::new("REMEMBER"), &inv).await.unwrap();
        assert_eq!(inv.memory.get("topic"), Some(json!("rust")));
    }
}
