//! In-memory plan registry owned by one executor.
//!
//! Two maps keyed by plan id:
//! - plan definitions, kept after execution for inspection
//! - in-flight executions (cancellation token + live run state), present only
//!   while an `execute_plan` call for that id is running
//!
//! Nothing here is global: every executor has its own registry.
//!
//! Each execution entry carries a generation number. A guard only touches the
//! entry it created, so a run that outlives [`PlanRegistry::clear`] cannot
//! remove or overwrite a later execution of the same plan id.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use planwright_types::plan::{Plan, PlanId, PlanStatus, RunState};
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct Execution {
    generation: u64,
    cancel: CancellationToken,
    state: RunState,
}

/// A second execution was requested for a plan that is already running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlreadyRunning(pub PlanId);

#[derive(Debug, Default)]
pub struct PlanRegistry {
    plans: DashMap<PlanId, Plan>,
    executions: DashMap<PlanId, Execution>,
    next_generation: AtomicU64,
}

impl PlanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // -- definitions --------------------------------------------------------

    /// Store (or replace) a plan definition.
    pub fn insert_plan(&self, plan: Plan) {
        self.plans.insert(plan.id, plan);
    }

    /// Overwrite a definition that is still registered. A plan forgotten in
    /// the meantime (see [`clear`](Self::clear)) stays forgotten.
    pub fn update_plan(&self, plan: &Plan) -> bool {
        match self.plans.get_mut(&plan.id) {
            Some(mut existing) => {
                *existing = plan.clone();
                true
            }
            None => false,
        }
    }

    pub fn plan(&self, plan_id: PlanId) -> Option<Plan> {
        self.plans.get(&plan_id).map(|p| p.value().clone())
    }

    pub fn plan_count(&self) -> usize {
        self.plans.len()
    }

    // -- executions ---------------------------------------------------------

    /// Register an in-flight execution. The entry lives as long as the
    /// returned guard.
    pub fn begin_execution(
        &self,
        plan_id: PlanId,
        cancel: CancellationToken,
    ) -> Result<ExecutionGuard<'_>, AlreadyRunning> {
        match self.executions.entry(plan_id) {
            Entry::Occupied(_) => Err(AlreadyRunning(plan_id)),
            Entry::Vacant(slot) => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                slot.insert(Execution {
                    generation,
                    cancel,
                    state: RunState::running(),
                });
                Ok(ExecutionGuard {
                    registry: self,
                    plan_id,
                    generation,
                })
            }
        }
    }

    /// Live run state, or `None` when nothing is in flight for this id.
    pub fn status(&self, plan_id: PlanId) -> Option<RunState> {
        self.executions.get(&plan_id).map(|e| e.state.clone())
    }

    /// Signal cancellation and mark the execution cancelled.
    ///
    /// Returns `false` when no execution is in flight for this id.
    pub fn cancel(&self, plan_id: PlanId) -> bool {
        let Some(mut execution) = self.executions.get_mut(&plan_id) else {
            return false;
        };
        execution.cancel.cancel();
        execution.state.status = PlanStatus::Cancelled;
        execution.state.ended_at = Some(Utc::now());
        true
    }

    /// Cancel every in-flight execution, returning how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let ids: Vec<PlanId> = self.executions.iter().map(|e| *e.key()).collect();
        ids.into_iter().filter(|id| self.cancel(*id)).count()
    }

    pub fn in_flight(&self) -> usize {
        self.executions.len()
    }

    /// Drop every definition and execution entry.
    pub fn clear(&self) {
        self.executions.clear();
        self.plans.clear();
    }
}

/// Removes the execution entry when dropped, whatever path the execution
/// took out of `execute_plan`.
#[derive(Debug)]
pub struct ExecutionGuard<'a> {
    registry: &'a PlanRegistry,
    plan_id: PlanId,
    generation: u64,
}

impl ExecutionGuard<'_> {
    pub fn plan_id(&self) -> PlanId {
        self.plan_id
    }

    /// Whether this guard's entry is still the registered one.
    pub fn is_current(&self) -> bool {
        self.registry
            .executions
            .get(&self.plan_id)
            .is_some_and(|e| e.generation == self.generation)
    }

    /// Live run state of this execution; `None` once the entry was cleared.
    pub fn state(&self) -> Option<RunState> {
        self.registry
            .executions
            .get(&self.plan_id)
            .filter(|e| e.generation == self.generation)
            .map(|e| e.state.clone())
    }

    /// Mutate this execution's run state. No-op once the entry was cleared.
    pub fn update_state(&self, update: impl FnOnce(&mut RunState)) {
        if let Some(mut execution) = self.registry.executions.get_mut(&self.plan_id) {
            if execution.generation == self.generation {
                update(&mut execution.state);
            }
        }
    }
}

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        let generation = self.generation;
        self.registry
            .executions
            .remove_if(&self.plan_id, |_, e| e.generation == generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planwright_types::plan::{ExecutionModel, PlanStep};

    #[test]
    fn definitions_outlive_executions() {
        let registry = PlanRegistry::new();
        let plan = Plan::new("goal", vec![PlanStep::new("REPLY")], ExecutionModel::Sequential);
        let id = plan.id;
        registry.insert_plan(plan);

        {
            let _guard = registry.begin_execution(id, CancellationToken::new()).unwrap();
            assert_eq!(registry.status(id).map(|s| s.status), Some(PlanStatus::Running));
        }

        assert!(registry.status(id).is_none());
        assert!(registry.plan(id).is_some());
        assert_eq!(registry.plan_count(), 1);
    }

    #[test]
    fn update_plan_only_touches_registered_plans() {
        let registry = PlanRegistry::new();
        let mut plan = Plan::new("goal", vec![PlanStep::new("REPLY")], ExecutionModel::Sequential);
        assert!(!registry.update_plan(&plan));

        registry.insert_plan(plan.clone());
        plan.run_state.status = PlanStatus::Completed;
        assert!(registry.update_plan(&plan));
        assert_eq!(registry.plan(plan.id).unwrap().run_state.status, PlanStatus::Completed);
    }

    #[test]
    fn second_execution_for_same_id_is_rejected() {
        let registry = PlanRegistry::new();
        let id = PlanId::new();
        let _guard = registry.begin_execution(id, CancellationToken::new()).unwrap();
        assert_eq!(
            registry.begin_execution(id, CancellationToken::new()).unwrap_err(),
            AlreadyRunning(id)
        );
    }

    #[test]
    fn cancel_signals_token_and_stamps_state() {
        let registry = PlanRegistry::new();
        let id = PlanId::new();
        let token = CancellationToken::new();
        let _guard = registry.begin_execution(id, token.clone()).unwrap();

        assert!(registry.cancel(id));
        assert!(token.is_cancelled());
        let state = registry.status(id).unwrap();
        assert_eq!(state.status, PlanStatus::Cancelled);
        assert!(state.ended_at.is_some());
    }

    #[test]
    fn cancel_without_execution_returns_false() {
        let registry = PlanRegistry::new();
        assert!(!registry.cancel(PlanId::new()));
    }

    #[test]
    fn update_state_reaches_live_entry() {
        let registry = PlanRegistry::new();
        let id = PlanId::new();
        let guard = registry.begin_execution(id, CancellationToken::new()).unwrap();
        guard.update_state(|s| s.current_step = 3);
        assert_eq!(registry.status(id).unwrap().current_step, 3);
        assert_eq!(guard.state().map(|s| s.current_step), Some(3));
    }

    #[test]
    fn stale_guard_leaves_newer_execution_alone() {
        let registry = PlanRegistry::new();
        let id = PlanId::new();
        let old = registry.begin_execution(id, CancellationToken::new()).unwrap();

        registry.clear();
        let new = registry.begin_execution(id, CancellationToken::new()).unwrap();
        assert!(!old.is_current());
        assert!(new.is_current());

        old.update_state(|s| s.current_step = 9);
        assert!(old.state().is_none());
        drop(old);

        let state = registry.status(id).unwrap();
        assert_eq!(state.status, PlanStatus::Running);
        assert_eq!(state.current_step, 0);
        assert!(registry.begin_execution(id, CancellationToken::new()).is_err());

        drop(new);
        assert!(registry.status(id).is_none());
    }

    #[test]
    fn cancel_all_then_clear() {
        let registry = PlanRegistry::new();
        let tokens: Vec<CancellationToken> = (0..3).map(|_| CancellationToken::new()).collect();
        let guards: Vec<_> = tokens
            .iter()
            .map(|t| registry.begin_execution(PlanId::new(), t.clone()).unwrap())
            .collect();

        assert_eq!(registry.cancel_all(), 3);
        assert!(tokens.iter().all(CancellationToken::is_cancelled));

        registry.clear();
        assert_eq!(registry.in_flight(), 0);
        drop(guards);
    }
}
