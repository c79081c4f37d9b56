//! Plan executor: the public face of the engine.
//!
//! `PlanExecutor` owns the action registry, an optional planning model, the
//! plan registry and the event bus. `execute_plan` dispatches on the plan's
//! execution model:
//! - sequential: steps one at a time in declaration order
//! - graph: steps one at a time in deterministic topological order
//! - parallel: every step launched at once, dependencies ignored, all joined
//!
//! Cancellation is cooperative: the token is checked before each serial step
//! (and once after the last), and once before a parallel fan-out. A step that
//! is already running is never interrupted.

pub mod step_runner;

use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;
use planwright_types::config::PlannerConfig;
use planwright_types::event::PlanEvent;
use planwright_types::execution::{
    ExecutionResult, MessageContext, StepFailure, StepResult, ValidationReport,
};
use planwright_types::plan::{
    ExecutionModel, OnError, Plan, PlanId, PlanStatus, RunState, StepStatus,
};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info_span};

use crate::action::ActionRegistry;
use crate::event::EventBus;
use crate::llm::{BoxPlanningModel, ModelError, PlanningModel, PlanningRequest};
use crate::memory::WorkingMemory;
use crate::plan::builder::{self, PlanningContext};
use crate::plan::{
    AlreadyRunning, ExecutionGuard, PlanRegistry, SchedulingError, adapter, execution_order, parse_plan,
    validate_plan,
};

pub use step_runner::{StepError, StepInvocation, StepRunner};

// ---------------------------------------------------------------------------
// ExecutorError
// ---------------------------------------------------------------------------

/// Errors surfaced by [`PlanExecutor`].
///
/// Ordinary step failures are not errors: they are accumulated into the
/// returned [`ExecutionResult`].
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// An execution for this plan id is already in flight.
    #[error("plan {0} is already executing")]
    AlreadyRunning(PlanId),

    /// Cancellation was observed; `partial` holds the progress made so far.
    #[error(
        "plan {} cancelled after {} of {} steps",
        .partial.plan_id, .partial.completed_steps, .partial.total_steps
    )]
    Aborted { partial: Box<ExecutionResult> },

    /// Graph ordering could not place every step.
    #[error("scheduling failed: {0}")]
    Scheduling(#[from] SchedulingError),

    #[error("planning context must have a non-empty goal")]
    EmptyGoal,

    #[error("no planning model configured")]
    NoModel,

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl From<AlreadyRunning> for ExecutorError {
    fn from(AlreadyRunning(plan_id): AlreadyRunning) -> Self {
        ExecutorError::AlreadyRunning(plan_id)
    }
}

/// Why a run stopped before reaching the end of its step list.
enum Halt {
    Cancelled,
    Scheduling(SchedulingError),
}

/// Per-run inputs shared by the serial and parallel loops.
struct Execution<'a> {
    message: &'a MessageContext,
    cancel: &'a CancellationToken,
    guard: &'a ExecutionGuard<'a>,
}

/// Accumulated state of one execution.
#[derive(Default)]
struct Ledger {
    memory: WorkingMemory,
    results: Vec<StepResult>,
    errors: Vec<StepFailure>,
}

// ---------------------------------------------------------------------------
// PlanExecutor
// ---------------------------------------------------------------------------

pub struct PlanExecutor {
    actions: Arc<ActionRegistry>,
    model: Option<Arc<BoxPlanningModel>>,
    config: PlannerConfig,
    registry: PlanRegistry,
    events: EventBus,
    runner: StepRunner,
}

impl PlanExecutor {
    pub fn new(actions: ActionRegistry, config: PlannerConfig) -> Self {
        let actions = Arc::new(actions);
        let events = EventBus::new(config.event_capacity);
        let runner = StepRunner::new(Arc::clone(&actions), events.clone());
        Self {
            actions,
            model: None,
            config,
            registry: PlanRegistry::new(),
            events,
            runner,
        }
    }

    /// Attach the planning model used for comprehensive plans and adaptation.
    pub fn with_model<M: PlanningModel + 'static>(self, model: M) -> Self {
        self.with_boxed_model(BoxPlanningModel::new(model))
    }

    pub fn with_boxed_model(mut self, model: BoxPlanningModel) -> Self {
        self.model = Some(Arc::new(model));
        self
    }

    pub fn actions(&self) -> &ActionRegistry {
        &self.actions
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlanEvent> {
        self.events.subscribe()
    }

    // -- plan creation ------------------------------------------------------

    /// Keyword-heuristic plan for a message; no model involved.
    pub fn create_simple_plan(&self, message: &MessageContext) -> Plan {
        let plan = builder::simple_plan(message, &self.config);
        tracing::info!(plan_id = %plan.id, steps = plan.total_steps(), "simple plan created");
        self.registry.insert_plan(plan.clone());
        plan
    }

    /// Ask the planning model for a plan and parse its answer tolerantly.
    pub async fn create_comprehensive_plan(
        &self,
        ctx: PlanningContext,
    ) -> Result<Plan, ExecutorError> {
        if ctx.goal.trim().is_empty() {
            return Err(ExecutorError::EmptyGoal);
        }
        let model = self.model.as_ref().ok_or(ExecutorError::NoModel)?;

        let catalog = if ctx.available_actions.is_empty() {
            self.actions.catalog()
        } else {
            ctx.available_actions
                .iter()
                .map(|name| {
                    let description = self
                        .actions
                        .resolve(name)
                        .map(|a| a.description().to_string())
                        .unwrap_or_default();
                    (name.clone(), description)
                })
                .collect()
        };

        let request = PlanningRequest {
            prompt: builder::comprehensive_prompt(&ctx, &catalog),
            temperature: self.config.model.temperature,
            max_tokens: self.config.model.max_tokens,
        };
        let span = info_span!("plan.create", model.name = model.name(), plan.goal = %ctx.goal);
        let text = model.complete(&request).instrument(span).await?;

        let plan = match ctx.preferred_model {
            Some(preferred) => {
                let config = PlannerConfig {
                    default_execution_model: preferred,
                    ..self.config.clone()
                };
                parse_plan(&text, &ctx.goal, &config)
            }
            None => parse_plan(&text, &ctx.goal, &self.config),
        };
        tracing::info!(
            plan_id = %plan.id,
            steps = plan.total_steps(),
            execution_model = %plan.execution_model,
            "comprehensive plan created"
        );
        self.registry.insert_plan(plan.clone());
        Ok(plan)
    }

    pub fn validate_plan(&self, plan: &Plan) -> ValidationReport {
        validate_plan(plan, &self.actions)
    }

    /// Replace the suffix of `plan` from `current_step_index` after a failure.
    /// Never fails; see [`adapter::adapt_plan`].
    pub async fn adapt_plan(
        &self,
        plan: &Plan,
        current_step_index: usize,
        results: &[StepResult],
        error: &str,
    ) -> Plan {
        let adapted = adapter::adapt_plan(
            self.model.as_deref(),
            plan,
            current_step_index,
            results,
            error,
            &self.config,
        )
        .await;
        self.registry.insert_plan(adapted.clone());
        adapted
    }

    // -- registry -----------------------------------------------------------

    /// Live run state, or `None` when nothing is in flight for this id.
    pub fn get_plan_status(&self, plan_id: PlanId) -> Option<RunState> {
        self.registry.status(plan_id)
    }

    /// Retained plan definition, including the last recorded run state.
    pub fn get_plan(&self, plan_id: PlanId) -> Option<Plan> {
        self.registry.plan(plan_id)
    }

    pub fn cancel_plan(&self, plan_id: PlanId) -> bool {
        let cancelled = self.registry.cancel(plan_id);
        if cancelled {
            tracing::info!(plan_id = %plan_id, "plan cancellation requested");
        }
        cancelled
    }

    /// Cancel every in-flight execution and forget all plans.
    pub fn stop(&self) {
        let cancelled = self.registry.cancel_all();
        self.registry.clear();
        tracing::info!(cancelled, "executor stopped");
    }

    // -- execution ----------------------------------------------------------

    /// Run `plan` to completion under its execution model.
    ///
    /// Step records and run state are written back into `plan`. Returns
    /// `Ok` with `success == false` when steps failed (including an abort
    /// policy halting the run); returns `Err` only for cancellation,
    /// scheduling failure, or a concurrent execution of the same plan.
    pub async fn execute_plan(
        &self,
        plan: &mut Plan,
        message: &MessageContext,
    ) -> Result<ExecutionResult, ExecutorError> {
        let cancel = CancellationToken::new();
        let guard = self.registry.begin_execution(plan.id, cancel.clone())?;

        let span = info_span!(
            "plan.execute",
            plan.id = %plan.id,
            plan.execution_model = %plan.execution_model,
            plan.total_steps = plan.total_steps(),
        );
        self.run(plan, message, cancel, &guard).instrument(span).await
    }

    async fn run(
        &self,
        plan: &mut Plan,
        message: &MessageContext,
        cancel: CancellationToken,
        guard: &ExecutionGuard<'_>,
    ) -> Result<ExecutionResult, ExecutorError> {
        let started = Instant::now();
        plan.run_state = RunState::running();
        for step in &mut plan.steps {
            step.status = StepStatus::Pending;
            step.result = None;
            step.error = None;
        }
        self.registry.insert_plan(plan.clone());
        self.events.publish(PlanEvent::PlanStarted {
            plan_id: plan.id,
            execution_model: plan.execution_model,
            total_steps: plan.total_steps(),
        });
        tracing::info!("plan execution started");

        let mut ledger = Ledger::default();
        let execution = Execution {
            message,
            cancel: &cancel,
            guard,
        };
        let outcome = match plan.execution_model {
            ExecutionModel::Sequential => {
                let order: Vec<usize> = (0..plan.steps.len()).collect();
                self.run_serial(plan, &order, &execution, &mut ledger).await
            }
            ExecutionModel::Graph => match execution_order(&plan.steps) {
                Ok(order) => self.run_serial(plan, &order, &execution, &mut ledger).await,
                Err(e) => Err(Halt::Scheduling(e)),
            },
            ExecutionModel::Parallel => {
                self.run_parallel(plan, &execution, &mut ledger).await
            }
        };
        // The end of the step list is a boundary too.
        let outcome = match outcome {
            Ok(()) if cancel.is_cancelled() => Err(Halt::Cancelled),
            other => other,
        };

        let errors = std::mem::take(&mut ledger.errors);
        let result = ExecutionResult {
            plan_id: plan.id,
            success: errors.is_empty() && outcome.is_ok(),
            completed_steps: ledger.results.len(),
            total_steps: plan.total_steps(),
            results: std::mem::take(&mut ledger.results),
            errors: (!errors.is_empty()).then_some(errors),
            duration_ms: started.elapsed().as_millis() as u64,
        };

        let now = Utc::now();
        match &outcome {
            Ok(()) if result.success => plan.run_state.status = PlanStatus::Completed,
            Ok(()) => {
                plan.run_state.status = PlanStatus::Failed;
                if plan.run_state.error.is_none() {
                    plan.run_state.error = result
                        .errors
                        .as_ref()
                        .and_then(|e| e.last())
                        .map(|f| f.error.clone());
                }
            }
            Err(Halt::Cancelled) => {
                plan.run_state.status = PlanStatus::Cancelled;
                plan.run_state.error = Some("cancelled".to_string());
                self.events.publish(PlanEvent::PlanCancelled { plan_id: plan.id });
            }
            Err(Halt::Scheduling(e)) => {
                plan.run_state.status = PlanStatus::Failed;
                plan.run_state.error = Some(e.to_string());
            }
        }
        // Keep the timestamp cancel_plan recorded, if any.
        plan.run_state.ended_at = guard.state().and_then(|s| s.ended_at).or(Some(now));
        let final_state = plan.run_state.clone();
        guard.update_state(|state| *state = final_state);
        // A run that outlived stop() must not overwrite a newer definition.
        if guard.is_current() {
            self.registry.update_plan(plan);
        }

        self.events.publish(PlanEvent::PlanFinished {
            plan_id: plan.id,
            success: result.success,
            completed_steps: result.completed_steps,
            total_steps: result.total_steps,
            duration_ms: result.duration_ms,
        });
        tracing::info!(
            status = %plan.run_state.status,
            completed = result.completed_steps,
            failed = result.error_count(),
            duration_ms = result.duration_ms,
            "plan execution finished"
        );

        match outcome {
            Ok(()) => Ok(result),
            Err(Halt::Cancelled) => Err(ExecutorError::Aborted {
                partial: Box::new(result),
            }),
            Err(Halt::Scheduling(e)) => Err(ExecutorError::Scheduling(e)),
        }
    }

    /// Run the steps at `order` one at a time, honouring on-error policies.
    async fn run_serial(
        &self,
        plan: &mut Plan,
        order: &[usize],
        execution: &Execution<'_>,
        ledger: &mut Ledger,
    ) -> Result<(), Halt> {
        for &idx in order {
            if execution.cancel.is_cancelled() {
                tracing::info!(next_step = idx, "cancellation observed at step boundary");
                return Err(Halt::Cancelled);
            }

            plan.steps[idx].status = StepStatus::Running;
            let invocation = StepInvocation {
                plan_id: plan.id,
                previous: ledger.results.clone(),
                memory: ledger.memory.clone(),
                message: execution.message.clone(),
                cancel: execution.cancel.clone(),
            };
            match self.runner.run(&plan.steps[idx], &invocation).await {
                Ok(result) => self.record_success(plan, idx, result, execution.guard, ledger),
                Err(err) => {
                    let on_error = plan.steps[idx].retry.on_error;
                    let status = match on_error {
                        OnError::Skip => StepStatus::Skipped,
                        OnError::Abort | OnError::Continue => StepStatus::Failed,
                    };
                    self.record_failure(plan, idx, &err, status, on_error, ledger);
                    if on_error == OnError::Abort {
                        tracing::warn!(step_index = idx, "step failed with abort policy, halting plan");
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }

    /// Launch every step at once and collect all outcomes.
    async fn run_parallel(
        &self,
        plan: &mut Plan,
        execution: &Execution<'_>,
        ledger: &mut Ledger,
    ) -> Result<(), Halt> {
        if execution.cancel.is_cancelled() {
            return Err(Halt::Cancelled);
        }

        let plan_id = plan.id;
        let handles: Vec<_> = plan
            .steps
            .iter_mut()
            .map(|step| {
                step.status = StepStatus::Running;
                let runner = self.runner.clone();
                let step = step.clone();
                let invocation = StepInvocation {
                    plan_id,
                    previous: Vec::new(),
                    memory: ledger.memory.clone(),
                    message: execution.message.clone(),
                    cancel: execution.cancel.clone(),
                };
                tokio::spawn(
                    async move { runner.run(&step, &invocation).await }
                        .in_current_span(),
                )
            })
            .collect();

        for (idx, joined) in join_all(handles).await.into_iter().enumerate() {
            let on_error = plan.steps[idx].retry.on_error;
            match joined {
                Ok(Ok(result)) => {
                    self.record_success(plan, idx, result, execution.guard, ledger);
                }
                Ok(Err(err)) => {
                    self.record_failure(plan, idx, &err, StepStatus::Failed, on_error, ledger);
                }
                Err(join_err) => {
                    let err = StepError::Failed {
                        attempts: 0,
                        message: format!("step task did not complete: {join_err}"),
                    };
                    self.record_failure(plan, idx, &err, StepStatus::Failed, on_error, ledger);
                }
            }
        }
        Ok(())
    }

    fn record_success(
        &self,
        plan: &mut Plan,
        idx: usize,
        result: StepResult,
        guard: &ExecutionGuard<'_>,
        ledger: &mut Ledger,
    ) {
        let step = &mut plan.steps[idx];
        step.status = StepStatus::Completed;
        step.result = serde_json::to_value(&result).ok();
        step.error = None;

        plan.run_state.current_step += 1;
        let cursor = plan.run_state.current_step;
        guard.update_state(|state| state.current_step = cursor);
        ledger.results.push(result);
    }

    fn record_failure(
        &self,
        plan: &mut Plan,
        idx: usize,
        err: &StepError,
        status: StepStatus,
        on_error: OnError,
        ledger: &mut Ledger,
    ) {
        let step = &mut plan.steps[idx];
        step.status = status;
        step.error = Some(err.to_string());

        self.events.publish(PlanEvent::StepFailed {
            plan_id: plan.id,
            step_id: step.id,
            action: step.action.clone(),
            error: err.to_string(),
            on_error,
        });
        ledger.errors.push(StepFailure {
            step_id: step.id,
            action: step.action.clone(),
            error: err.to_string(),
            attempts: err.attempts(),
        });
    }
}

impl std::fmt::Debug for PlanExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanExecutor")
            .field("actions", &self.actions.names())
            .field("model", &self.model.as_ref().map(|m| m.name().to_string()))
            .field("in_flight", &self.registry.in_flight())
            .finish()
    }
}
