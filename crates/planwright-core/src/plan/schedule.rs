//! Deterministic topological ordering for graph-model plans.
//!
//! In-degree counting over the dependency relation, with a min-heap of ready
//! steps keyed by declaration index so ties always break toward the step that
//! was declared first. The same plan always yields the same order.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use planwright_types::plan::{PlanStep, StepId};

/// Ordering could not place every step.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulingError {
    /// The ready set emptied before every step was ordered.
    #[error(
        "no steps ready to execute after ordering {ordered} of {total}; \
         unresolved steps: {}", format_ids(.blocked)
    )]
    NoReadySteps {
        ordered: usize,
        total: usize,
        blocked: Vec<StepId>,
    },
}

fn format_ids(ids: &[StepId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Compute the serial execution order as indices into `steps`.
///
/// Every step appears after all of its dependencies. A dependency on an id
/// that is not in `steps` never resolves, so such a step (and everything
/// downstream of it) ends up blocked, as does every step on a cycle.
pub fn execution_order(steps: &[PlanStep]) -> Result<Vec<usize>, SchedulingError> {
    let index_by_id: HashMap<StepId, usize> = steps
        .iter()
        .enumerate()
        .map(|(idx, step)| (step.id, idx))
        .collect();

    let mut remaining: Vec<usize> = steps.iter().map(|s| s.dependencies.len()).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); steps.len()];
    for (idx, step) in steps.iter().enumerate() {
        for dep in &step.dependencies {
            if let Some(&dep_idx) = index_by_id.get(dep) {
                dependents[dep_idx].push(idx);
            }
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = remaining
        .iter()
        .enumerate()
        .filter(|(_, count)| **count == 0)
        .map(|(idx, _)| Reverse(idx))
        .collect();

    let mut order = Vec::with_capacity(steps.len());
    while let Some(Reverse(idx)) = ready.pop() {
        order.push(idx);
        for &next in &dependents[idx] {
            // Duplicate dependency entries are counted and released once each.
            remaining[next] -= 1;
            if remaining[next] == 0 {
                ready.push(Reverse(next));
            }
        }
    }

    if order.len() != steps.len() {
        let blocked = remaining
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .map(|(idx, _)| steps[idx].id)
            .collect();
        return Err(SchedulingError::NoReadySteps {
            ordered: order.len(),
            total: steps.len(),
            blocked,
        });
    }

    Ok(order)
}

/// [`execution_order`] expressed as step identifiers.
pub fn execution_order_ids(steps: &[PlanStep]) -> Result<Vec<StepId>, SchedulingError> {
    Ok(execution_order(steps)?
        .into_iter()
        .map(|idx| steps[idx].id)
        .collect())
}
