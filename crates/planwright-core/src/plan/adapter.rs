//! Re-planning after a step failure.
//!
//! The unexecuted suffix of a plan is replaced by steps a planning model
//! proposes; the completed prefix is kept. The result is always a new plan
//! with its own id and one more adaptation record. Adaptation never fails:
//! without a usable model response the suffix becomes a single fallback step.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use planwright_types::config::PlannerConfig;
use planwright_types::execution::StepResult;
use planwright_types::plan::{AdaptationRecord, Plan, PlanId, RunState, StepId};

use super::builder::PLAN_FORMAT;
use super::parser::{extract_tag, fallback_step, parse_steps};
use crate::llm::{BoxPlanningModel, PlanningRequest};

/// Produce an adapted copy of `plan` that replaces every step from
/// `current_step_index` onward.
pub async fn adapt_plan(
    model: Option<&BoxPlanningModel>,
    plan: &Plan,
    current_step_index: usize,
    results: &[StepResult],
    error: &str,
    config: &PlannerConfig,
) -> Plan {
    let cut = current_step_index.min(plan.steps.len());
    let prefix = &plan.steps[..cut];
    let known: HashMap<String, StepId> = prefix.iter().map(|s| (s.id.to_string(), s.id)).collect();

    let mut thought = None;
    let mut replacement = Vec::new();
    match model {
        Some(model) => {
            let request = PlanningRequest {
                prompt: adaptation_prompt(plan, cut, results, error),
                temperature: config.model.temperature,
                max_tokens: config.model.max_tokens,
            };
            match model.complete(&request).await {
                Ok(text) => {
                    let body = extract_tag(&text, "plan").unwrap_or(&text);
                    replacement = parse_steps(body, config, &known);
                    thought = extract_tag(body, "thought").map(str::to_string);
                }
                Err(e) => {
                    tracing::warn!(plan_id = %plan.id, error = %e, "adaptation request failed");
                }
            }
        }
        None => tracing::warn!(plan_id = %plan.id, "no planning model configured for adaptation"),
    }
    if replacement.is_empty() {
        replacement.push(fallback_step(config));
    }

    let mut steps = prefix.to_vec();
    steps.extend(replacement);

    // Prefix steps may have pointed into the discarded suffix.
    let retained: HashSet<StepId> = steps.iter().map(|s| s.id).collect();
    for step in &mut steps[..cut] {
        step.dependencies.retain(|dep| retained.contains(dep));
    }

    let mut adapted = plan.clone();
    adapted.id = PlanId::new();
    adapted.steps = steps;
    if let Some(thought) = thought.filter(|t| !t.is_empty()) {
        adapted.thought = thought;
    }
    adapted.run_state = RunState {
        current_step: cut,
        ..RunState::default()
    };
    adapted.metadata.adaptations.push(AdaptationRecord {
        timestamp: Utc::now(),
        previous_plan_id: plan.id,
        failed_step_index: cut,
        reason: error.to_string(),
    });

    tracing::info!(
        plan_id = %adapted.id,
        previous_plan_id = %plan.id,
        kept = cut,
        replaced = adapted.steps.len() - cut,
        "plan adapted"
    );
    adapted
}

/// Prompt describing the plan, the failure point, completed work, and the error.
pub fn adaptation_prompt(plan: &Plan, cut: usize, results: &[StepResult], error: &str) -> String {
    let mut prompt = String::from(
        "A plan failed part-way through. Propose replacement steps for the remaining work.\n\n",
    );
    prompt.push_str(&format!("GOAL: {}\n\n", plan.goal));

    prompt.push_str("ORIGINAL STEPS:\n");
    for (idx, step) in plan.steps.iter().enumerate() {
        let marker = if idx < cut { "done" } else if idx == cut { "FAILED" } else { "pending" };
        prompt.push_str(&format!("{idx}. [{marker}] {} (id {})\n", step.action, step.id));
    }

    prompt.push_str("\nCOMPLETED RESULTS:\n");
    if results.is_empty() {
        prompt.push_str("(none)\n");
    }
    for result in results {
        let summary = result.text.as_deref().unwrap_or("(no text)");
        prompt.push_str(&format!("- {} (id {}): {summary}\n", result.action, result.step_id));
    }

    prompt.push_str(&format!("\nERROR AT STEP {cut}: {error}\n\n"));
    prompt.push_str("Only return the steps that replace the failed step and everything after it. ");
    prompt.push_str("They may depend on completed steps by their id.\n\n");
    prompt.push_str(PLAN_FORMAT);
    prompt
}
