//! Execution and validation result types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::plan::{PlanId, StepId};

/// Caller-supplied context for a plan execution (the triggering message).
///
/// Passed through untouched to every action invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageContext {
    /// Text of the message that triggered planning.
    #[serde(default)]
    pub text: String,
    /// Optional conversation or room identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, Value>,
}

impl MessageContext {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// Output of one successfully executed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: StepId,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub data: Value,
    /// Number of invocations it took (1 = first try).
    pub attempts: u32,
    pub completed_at: DateTime<Utc>,
}

/// A step failure accumulated into an execution result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub step_id: StepId,
    pub action: String,
    pub error: String,
    pub attempts: u32,
}

/// Outcome of `execute_plan`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub plan_id: PlanId,
    /// True iff no errors were accumulated.
    pub success: bool,
    pub completed_steps: usize,
    pub total_steps: usize,
    pub results: Vec<StepResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<StepFailure>>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub fn error_count(&self) -> usize {
        self.errors.as_ref().map_or(0, Vec::len)
    }
}

/// Structured outcome of plan validation. Never an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// Build a report, deriving `valid` from the absence of errors.
    pub fn from_findings(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}
