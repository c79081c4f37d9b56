//! Plan domain types for Planwright.
//!
//! A `Plan` decomposes a goal into ordered `PlanStep`s, each naming an action,
//! its parameters, and the steps it depends on. The executor mutates the plan's
//! `RunState` and per-step records in place while it runs.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Unique identifier for a plan, wrapping a UUID v7 (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlanId(pub Uuid);

impl PlanId {
    /// Mint a fresh plan identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for PlanId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PlanId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Unique identifier for a step within a plan.
///
/// Always minted by the engine; the literal tokens a planning model uses to
/// refer to its own steps never become step identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepId(pub Uuid);

impl StepId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// True for the all-zero identifier, which the validator rejects.
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for StepId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StepId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s.trim())?))
    }
}

// ---------------------------------------------------------------------------
// Execution model
// ---------------------------------------------------------------------------

/// Scheduling discipline applied to a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionModel {
    /// Steps run one at a time in declaration order.
    #[default]
    Sequential,
    /// Every step is launched at once; declared dependencies are ignored.
    Parallel,
    /// Steps run one at a time in topological order.
    #[serde(alias = "dag")]
    Graph,
}

impl ExecutionModel {
    /// Lenient parse used for untrusted model output: unknown values yield `None`.
    pub fn parse_lenient(s: &str) -> Option<Self> {
        s.parse().ok()
    }
}

impl fmt::Display for ExecutionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionModel::Sequential => write!(f, "sequential"),
            ExecutionModel::Parallel => write!(f, "parallel"),
            ExecutionModel::Graph => write!(f, "graph"),
        }
    }
}

impl FromStr for ExecutionModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sequential" => Ok(ExecutionModel::Sequential),
            "parallel" => Ok(ExecutionModel::Parallel),
            "graph" | "dag" => Ok(ExecutionModel::Graph),
            other => Err(format!("invalid execution model: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a plan run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl PlanStatus {
    /// Whether the run has reached a final state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PlanStatus::Completed | PlanStatus::Failed | PlanStatus::Cancelled
        )
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanStatus::Pending => write!(f, "pending"),
            PlanStatus::Running => write!(f, "running"),
            PlanStatus::Completed => write!(f, "completed"),
            PlanStatus::Failed => write!(f, "failed"),
            PlanStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Status of an individual step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Running => write!(f, "running"),
            StepStatus::Completed => write!(f, "completed"),
            StepStatus::Failed => write!(f, "failed"),
            StepStatus::Skipped => write!(f, "skipped"),
        }
    }
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// What the executor does once a step has exhausted its retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    /// Halt the remaining steps.
    #[default]
    Abort,
    /// Mark the step failed and move on.
    Continue,
    /// Mark the step skipped and move on.
    Skip,
}

impl fmt::Display for OnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnError::Abort => write!(f, "abort"),
            OnError::Continue => write!(f, "continue"),
            OnError::Skip => write!(f, "skip"),
        }
    }
}

/// Retry configuration for a plan step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt (default 2).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds (default 1000).
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    /// Growth factor applied per retry (default 2.0).
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default)]
    pub on_error: OnError,
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_ms() -> u64 {
    1000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl RetryPolicy {
    /// A policy that never retries and halts on failure.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Total invocations this policy allows (`max_retries + 1`).
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retrying after the given failed attempt (1-based).
    ///
    /// `backoff_ms * backoff_multiplier^(attempt - 1)`, saturating at `u64::MAX` ms.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.backoff_multiplier.max(0.0).powi(exponent);
        let millis = self.backoff_ms as f64 * factor;
        if !millis.is_finite() || millis >= u64::MAX as f64 {
            return Duration::from_millis(u64::MAX);
        }
        Duration::from_millis(millis.round() as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            on_error: OnError::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// One unit of work in a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: StepId,
    /// Name of the action to invoke (resolved against the action registry).
    pub action: String,
    #[serde(default)]
    pub status: StepStatus,
    /// Opaque parameters, validated only by the invoked action.
    #[serde(default)]
    pub parameters: serde_json::Map<String, Value>,
    /// Steps that must run before this one (graph model only).
    #[serde(default)]
    pub dependencies: Vec<StepId>,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PlanStep {
    /// Build a pending step with a fresh identifier and default retry policy.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            id: StepId::new(),
            action: action.into(),
            status: StepStatus::Pending,
            parameters: serde_json::Map::new(),
            dependencies: Vec::new(),
            retry: RetryPolicy::default(),
            result: None,
            error: None,
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = StepId>) -> Self {
        self.dependencies.extend(deps);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

// ---------------------------------------------------------------------------
// Run state and metadata
// ---------------------------------------------------------------------------

/// Mutable run state of a plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub status: PlanStatus,
    /// Cursor: number of steps that have completed successfully.
    pub current_step: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunState {
    /// A freshly started run.
    pub fn running() -> Self {
        Self {
            status: PlanStatus::Running,
            current_step: 0,
            started_at: Some(Utc::now()),
            ended_at: None,
            error: None,
        }
    }
}

/// Record of one adaptation applied to a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptationRecord {
    pub timestamp: DateTime<Utc>,
    /// The plan this one replaced.
    pub previous_plan_id: PlanId,
    /// Index of the step that failed.
    pub failed_step_index: usize,
    /// The error that triggered the adaptation.
    pub reason: String,
}

/// Descriptive metadata attached to a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanMetadata {
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration_ms: Option<u64>,
    #[serde(default)]
    pub priority: u8,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub adaptations: Vec<AdaptationRecord>,
    /// Extensible key/value metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, Value>,
}

impl Default for PlanMetadata {
    fn default() -> Self {
        Self {
            created_at: Utc::now(),
            estimated_duration_ms: None,
            priority: 1,
            tags: Vec::new(),
            adaptations: Vec::new(),
            extra: HashMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// A goal decomposed into steps, with an execution model and run state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub goal: String,
    /// Free-text rationale supplied by the planner.
    #[serde(default)]
    pub thought: String,
    pub steps: Vec<PlanStep>,
    #[serde(default)]
    pub execution_model: ExecutionModel,
    #[serde(default)]
    pub run_state: RunState,
    #[serde(default)]
    pub metadata: PlanMetadata,
}

impl Plan {
    /// Build a pending plan with a fresh identifier.
    pub fn new(goal: impl Into<String>, steps: Vec<PlanStep>, execution_model: ExecutionModel) -> Self {
        Self {
            id: PlanId::new(),
            goal: goal.into(),
            thought: String::new(),
            steps,
            execution_model,
            run_state: RunState::default(),
            metadata: PlanMetadata::default(),
        }
    }

    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    /// Position of a step in declaration order.
    pub fn step_index(&self, id: StepId) -> Option<usize> {
        self.steps.iter().position(|s| s.id == id)
    }

    pub fn step(&self, id: StepId) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.id == id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn execution_model_accepts_dag_alias() {
        assert_eq!("dag".parse::<ExecutionModel>().unwrap(), ExecutionModel::Graph);
        assert_eq!(" Graph ".parse::<ExecutionModel>().unwrap(), ExecutionModel::Graph);
        assert_eq!(
            serde_json::from_value::<ExecutionModel>(json!("dag")).unwrap(),
            ExecutionModel::Graph
        );
        assert!(ExecutionModel::parse_lenient("round-robin").is_none());
    }

    #[test]
    fn retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.backoff_ms, 1000);
        assert_eq!(policy.on_error, OnError::Abort);
        assert_eq!(policy.max_attempts(), 3);
    }

    #[test]
    fn backoff_grows_geometrically() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(1), Duration::from_millis(1000));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(2000));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(4000));
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let policy = RetryPolicy {
            max_retries: 100,
            backoff_ms: u64::MAX / 2,
            backoff_multiplier: 10.0,
            on_error: OnError::Continue,
        };
        assert_eq!(policy.backoff_for(50), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn retry_policy_deserializes_with_defaults() {
        let policy: RetryPolicy = serde_json::from_value(json!({ "on_error": "skip" })).unwrap();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.on_error, OnError::Skip);
    }

    #[test]
    fn plan_json_roundtrip_keeps_dependencies() {
        let first = PlanStep::new("SEARCH").with_parameter("query", json!("rust"));
        let second = PlanStep::new("REPLY").with_dependencies([first.id]);
        let plan = Plan::new("answer", vec![first.clone(), second], ExecutionModel::Graph);

        let json = serde_json::to_string(&plan).unwrap();
        let parsed: Plan = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, plan.id);
        assert_eq!(parsed.execution_model, ExecutionModel::Graph);
        assert_eq!(parsed.steps[1].dependencies, vec![first.id]);
        assert_eq!(parsed.step_index(first.id), Some(0));
    }

    #[test]
    fn minimal_plan_json_fills_defaults() {
        let step_id = Uuid::now_v7();
        let raw = json!({
            "id": Uuid::now_v7(),
            "goal": "say hi",
            "steps": [{ "id": step_id, "action": "REPLY" }]
        });
        let plan: Plan = serde_json::from_value(raw).unwrap();
        assert_eq!(plan.execution_model, ExecutionModel::Sequential);
        assert_eq!(plan.run_state.status, PlanStatus::Pending);
        assert_eq!(plan.steps[0].status, StepStatus::Pending);
        assert_eq!(plan.steps[0].retry, RetryPolicy::default());
        assert!(plan.metadata.adaptations.is_empty());
    }

    #[test]
    fn terminal_statuses() {
        assert!(PlanStatus::Cancelled.is_terminal());
        assert!(PlanStatus::Failed.is_terminal());
        assert!(!PlanStatus::Running.is_terminal());
    }
}
