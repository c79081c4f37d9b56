//! Structural plan validation.
//!
//! Every check runs and every finding is accumulated; nothing short-circuits
//! and nothing returns an error. Graph-model plans are additionally checked
//! for cycles with a depth-first search that tracks the current recursion
//! stack, so cycles of any length are reported along with their path.

use std::collections::{HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};
use planwright_types::execution::ValidationReport;
use planwright_types::plan::{ExecutionModel, Plan, PlanStep, StepId};

use crate::action::ActionRegistry;

/// Validate a plan against the registered actions.
pub fn validate_plan(plan: &Plan, actions: &ActionRegistry) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if plan.id.0.is_nil() {
        errors.push("plan id is missing".to_string());
    }
    if plan.goal.trim().is_empty() {
        errors.push("plan goal is empty".to_string());
    }
    if plan.steps.is_empty() {
        errors.push("plan has no steps".to_string());
    }

    let mut seen: HashSet<StepId> = HashSet::with_capacity(plan.steps.len());
    for (idx, step) in plan.steps.iter().enumerate() {
        let label = step_label(idx, step);

        if step.id.is_nil() {
            errors.push(format!("{label} has no id"));
        } else if !seen.insert(step.id) {
            errors.push(format!("{label} reuses step id {}", step.id));
        }

        if step.action.trim().is_empty() {
            errors.push(format!("{label} has no action"));
        } else if !actions.contains(&step.action) {
            errors.push(format!("{label} references unknown action '{}'", step.action));
        }

        if step.retry.backoff_multiplier < 1.0 {
            warnings.push(format!(
                "{label} has backoff multiplier {} (< 1), so retry delays shrink",
                step.retry.backoff_multiplier
            ));
        }
    }

    let ids: HashSet<StepId> = plan.steps.iter().map(|s| s.id).collect();
    for (idx, step) in plan.steps.iter().enumerate() {
        let label = step_label(idx, step);
        let mut declared = HashSet::with_capacity(step.dependencies.len());
        for dep in &step.dependencies {
            if !ids.contains(dep) {
                errors.push(format!("{label} depends on unknown step {dep}"));
            }
            if !declared.insert(*dep) {
                warnings.push(format!("{label} lists dependency {dep} more than once"));
            }
        }
        if !step.dependencies.is_empty() && plan.execution_model != ExecutionModel::Graph {
            warnings.push(format!(
                "{label} declares dependencies, which the {} model ignores",
                plan.execution_model
            ));
        }
    }

    if plan.execution_model == ExecutionModel::Graph {
        for cycle in find_cycles(&plan.steps) {
            let path = cycle
                .iter()
                .map(|&idx| step_label(idx, &plan.steps[idx]))
                .collect::<Vec<_>>()
                .join(" -> ");
            errors.push(format!("circular dependency: {path}"));
        }
    }

    tracing::debug!(
        plan_id = %plan.id,
        errors = errors.len(),
        warnings = warnings.len(),
        "plan validated"
    );

    ValidationReport::from_findings(errors, warnings)
}

fn step_label(idx: usize, step: &PlanStep) -> String {
    if step.action.trim().is_empty() {
        format!("step #{idx}")
    } else {
        format!("step #{idx} '{}'", step.action)
    }
}

// ---------------------------------------------------------------------------
// Cycle detection
// ---------------------------------------------------------------------------

/// Find dependency cycles, each returned as a closed path of step indices
/// (first index repeated at the end), following "depends on" edges.
///
/// Node weights are step indices. Unknown dependencies add no edge.
pub(crate) fn find_cycles(steps: &[PlanStep]) -> Vec<Vec<usize>> {
    let index_by_id: HashMap<StepId, usize> = steps
        .iter()
        .enumerate()
        .map(|(idx, step)| (step.id, idx))
        .collect();

    let mut graph = DiGraph::<usize, ()>::with_capacity(steps.len(), steps.len());
    let nodes: Vec<NodeIndex> = (0..steps.len()).map(|idx| graph.add_node(idx)).collect();
    for (idx, step) in steps.iter().enumerate() {
        for dep in &step.dependencies {
            if let Some(&dep_idx) = index_by_id.get(dep) {
                graph.update_edge(nodes[idx], nodes[dep_idx], ());
            }
        }
    }

    let mut search = CycleSearch {
        graph: &graph,
        visited: vec![false; steps.len()],
        on_stack: vec![false; steps.len()],
        path: Vec::new(),
        cycles: Vec::new(),
    };
    for idx in 0..steps.len() {
        if !search.visited[idx] {
            search.visit(idx);
        }
    }
    search.cycles
}

struct CycleSearch<'g> {
    graph: &'g DiGraph<usize, ()>,
    visited: Vec<bool>,
    /// Nodes on the current DFS path.
    on_stack: Vec<bool>,
    path: Vec<usize>,
    cycles: Vec<Vec<usize>>,
}

/// One DFS frame: a node and the dependencies still to explore.
struct Frame {
    idx: usize,
    deps: std::vec::IntoIter<usize>,
}

impl CycleSearch<'_> {
    /// Iterative DFS from `root`; dependency chains of any length are safe.
    fn visit(&mut self, root: usize) {
        let mut frames = vec![self.enter(root)];

        while let Some(frame) = frames.last_mut() {
            let Some(dep) = frame.deps.next() else {
                let idx = frame.idx;
                frames.pop();
                self.path.pop();
                self.on_stack[idx] = false;
                continue;
            };

            if self.on_stack[dep] {
                if let Some(start) = self.path.iter().position(|&p| p == dep) {
                    let mut cycle = self.path[start..].to_vec();
                    cycle.push(dep);
                    self.cycles.push(cycle);
                }
            } else if !self.visited[dep] {
                let next = self.enter(dep);
                frames.push(next);
            }
        }
    }

    fn enter(&mut self, idx: usize) -> Frame {
        self.visited[idx] = true;
        self.on_stack[idx] = true;
        self.path.push(idx);

        // petgraph yields neighbors newest-edge first; sort for stable reports.
        let mut deps: Vec<usize> = self
            .graph
            .neighbors(NodeIndex::new(idx))
            .map(|n| self.graph[n])
            .collect();
        deps.sort_unstable();
        Frame {
            idx,
            deps: deps.into_iter(),
        }
    }
}
