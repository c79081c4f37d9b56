//! Plan construction without parsing: the keyword heuristic planner and the
//! prompt sent to a planning model for comprehensive plans.

use planwright_types::config::PlannerConfig;
use planwright_types::execution::MessageContext;
use planwright_types::plan::{ExecutionModel, Plan, PlanStep, StepId};
use serde_json::Value;

/// Inputs for a model-backed plan.
#[derive(Debug, Clone, Default)]
pub struct PlanningContext {
    pub goal: String,
    pub constraints: Vec<String>,
    /// Action names offered to the model. Empty means "every registered action".
    pub available_actions: Vec<String>,
    pub preferred_model: Option<ExecutionModel>,
}

impl PlanningContext {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            ..Self::default()
        }
    }

    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraints.push(constraint.into());
        self
    }

    pub fn with_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.available_actions = actions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_preferred_model(mut self, model: ExecutionModel) -> Self {
        self.preferred_model = Some(model);
        self
    }
}

/// Pick an action chain from keywords in the message.
///
/// First match wins: email, research plus send/summary, search/find/research,
/// analysis, then a plain reply.
pub fn heuristic_actions(text: &str) -> &'static [&'static str] {
    let text = text.to_lowercase();
    if text.contains("email") {
        &["SEND_EMAIL"]
    } else if text.contains("research") && (text.contains("send") || text.contains("summary")) {
        &["SEARCH", "REPLY"]
    } else if text.contains("search") || text.contains("find") || text.contains("research") {
        &["SEARCH"]
    } else if text.contains("analyz") {
        &["THINK", "REPLY"]
    } else {
        &["REPLY"]
    }
}

/// Build a sequential plan from [`heuristic_actions`]. Each step carries the
/// message text and depends on the step before it.
pub fn simple_plan(message: &MessageContext, config: &PlannerConfig) -> Plan {
    let mut steps: Vec<PlanStep> = Vec::new();
    let mut previous: Option<StepId> = None;
    for action in heuristic_actions(&message.text) {
        let step = PlanStep::new(*action)
            .with_parameter("message", Value::String(message.text.clone()))
            .with_dependencies(previous)
            .with_retry(config.default_retry.clone());
        previous = Some(step.id);
        steps.push(step);
    }

    let goal = if message.text.trim().is_empty() {
        "Execute plan".to_string()
    } else {
        message.text.clone()
    };
    let mut plan = Plan::new(goal, steps, ExecutionModel::Sequential);
    plan.metadata.tags.push("heuristic".to_string());
    plan
}

/// Prompt asking a planning model for a complete plan.
pub fn comprehensive_prompt(ctx: &PlanningContext, actions: &[(String, String)]) -> String {
    let mut prompt = String::from(
        "You are an expert planning system. Decompose the goal into a plan of actions.\n\n",
    );
    prompt.push_str(&format!("GOAL: {}\n\n", ctx.goal.trim()));

    if !ctx.constraints.is_empty() {
        prompt.push_str("CONSTRAINTS:\n");
        for constraint in &ctx.constraints {
            prompt.push_str(&format!("- {constraint}\n"));
        }
        prompt.push('\n');
    }

    prompt.push_str("AVAILABLE ACTIONS:\n");
    for (name, description) in actions {
        if description.is_empty() {
            prompt.push_str(&format!("- {name}\n"));
        } else {
            prompt.push_str(&format!("- {name}: {description}\n"));
        }
    }
    prompt.push('\n');

    if let Some(model) = ctx.preferred_model {
        prompt.push_str(&format!("PREFERRED EXECUTION MODEL: {model}\n\n"));
    }

    prompt.push_str(PLAN_FORMAT);
    prompt
}

pub(crate) const PLAN_FORMAT: &str = "\
Respond with exactly one plan in this format:
<plan>
  <goal>restated goal</goal>
  <thought>why these steps, in this order</thought>
  <execution_model>sequential | parallel | graph</execution_model>
  <estimated_duration>milliseconds</estimated_duration>
  <steps>
    <step>
      <id>step_1</id>
      <action>ACTION_NAME</action>
      <parameters>{\"key\": \"value\"}</parameters>
      <dependencies>[]</dependencies>
    </step>
  </steps>
</plan>
Dependencies list the <id> values of earlier steps. Use only the available actions.
";
