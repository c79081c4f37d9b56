//! Action capability boundary.
//!
//! An action is a named capability with an alias list and a single
//! polymorphic `invoke` operation. The engine never looks past this contract:
//! - `Action` -- RPITIT trait implemented by concrete actions
//! - `BoxAction` -- type-erased wrapper so heterogeneous actions share a registry
//! - `ActionRegistry` -- lookup by exact name, normalized name, or alias

pub mod box_action;
pub mod registry;

use std::collections::HashMap;
use std::future::Future;

use planwright_types::execution::{MessageContext, StepResult};
use planwright_types::plan::{PlanId, StepId};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::memory::WorkingMemory;

pub use box_action::BoxAction;
pub use registry::ActionRegistry;

// ---------------------------------------------------------------------------
// Action trait
// ---------------------------------------------------------------------------

/// A named capability that a plan step can invoke.
///
/// Uses RPITIT for `invoke`; wrap implementations in [`BoxAction`] (or
/// register them with [`ActionRegistry::register`]) for dynamic dispatch.
pub trait Action: Send + Sync {
    /// Canonical action name (e.g. "SEND_EMAIL").
    fn name(&self) -> &str;

    /// Alternative names this action answers to.
    fn aliases(&self) -> &[String] {
        &[]
    }

    /// One-line description shown to planning models.
    fn description(&self) -> &str {
        ""
    }

    /// Run the action for one step attempt.
    fn invoke(
        &self,
        ctx: ActionContext,
    ) -> impl Future<Output = Result<ActionOutput, ActionError>> + Send;
}

// ---------------------------------------------------------------------------
// Invocation context
// ---------------------------------------------------------------------------

/// Everything an action can see while it runs.
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub plan_id: PlanId,
    pub step_id: StepId,
    /// The step's own parameters.
    pub parameters: serde_json::Map<String, Value>,
    /// Results of steps completed before this invocation, in completion order.
    pub previous_results: Vec<StepResult>,
    /// Shared working memory of the execution. Writes are visible to later
    /// steps; concurrent writers to one key race (last write wins).
    pub memory: WorkingMemory,
    /// Working memory as it was when this attempt started.
    pub memory_snapshot: HashMap<String, Value>,
    pub message: MessageContext,
    /// Execution-wide cancellation token. Long-running actions may observe it.
    pub cancel: CancellationToken,
}

impl ActionContext {
    /// Look up a prior result by step id or by action name (case-insensitive).
    ///
    /// When several prior steps ran the same action, the latest one wins.
    pub fn previous_result(&self, key: &str) -> Option<&StepResult> {
        let key = key.trim();
        self.previous_results.iter().rev().find(|r| {
            r.action.eq_ignore_ascii_case(key) || r.step_id.to_string() == key
        })
    }

    pub fn parameter(&self, key: &str) -> Option<&Value> {
        self.parameters.get(key)
    }

    pub fn str_parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(Value::as_str)
    }
}

// ---------------------------------------------------------------------------
// Output and errors
// ---------------------------------------------------------------------------

/// What a successful action invocation produces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionOutput {
    pub text: Option<String>,
    pub data: Value,
}

impl ActionOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            data: Value::Null,
        }
    }

    pub fn data(data: Value) -> Self {
        Self { text: None, data }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

/// Errors an action can report.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// The action ran and failed.
    #[error("{0}")]
    Failed(String),

    /// The step's parameters were not acceptable to the action.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// The action observed cancellation and stopped early.
    #[error("action cancelled")]
    Cancelled,
}

impl ActionError {
    pub fn failed(message: impl Into<String>) -> Self {
        ActionError::Failed(message.into())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
