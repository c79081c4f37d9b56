//! Tolerant parser for planner-produced plan text.
//!
//! The text comes from an external language model and is untrusted. The
//! recognised vocabulary is a `<plan>` block holding `<goal>`, `<thought>`,
//! `<execution_model>`, `<estimated_duration>` and any number of `<step>`
//! blocks, each with `<id>`, `<action>`, `<parameters>` (JSON object) and
//! `<dependencies>` (JSON array of the producer's own step ids).
//!
//! Parsing never fails. Every step gets a freshly minted [`StepId`]; the
//! producer's literal ids only live in a lookup table used to resolve
//! dependency references. When no usable step is found the result is a
//! single-step fallback plan.

use std::collections::HashMap;

use planwright_types::config::PlannerConfig;
use planwright_types::plan::{ExecutionModel, Plan, PlanStep, StepId};
use serde_json::Value;

/// Parse planner output into a plan.
///
/// `fallback_goal` is used when the text carries no `<goal>`.
pub fn parse_plan(text: &str, fallback_goal: &str, config: &PlannerConfig) -> Plan {
    let body = extract_tag(text, "plan").unwrap_or(text);

    let goal = extract_tag(body, "goal")
        .filter(|g| !g.is_empty())
        .unwrap_or(fallback_goal)
        .to_string();

    let execution_model = match extract_tag(body, "execution_model") {
        Some(raw) => ExecutionModel::parse_lenient(raw).unwrap_or_else(|| {
            tracing::warn!(value = raw, "unrecognised execution model, using default");
            config.default_execution_model
        }),
        None => config.default_execution_model,
    };

    let mut steps = parse_steps(body, config, &HashMap::new());
    if steps.is_empty() {
        tracing::warn!("planner output contained no usable steps, using fallback plan");
        steps.push(fallback_step(config));
    }

    let mut plan = Plan::new(goal, steps, execution_model);
    plan.thought = extract_tag(body, "thought").unwrap_or_default().to_string();
    plan.metadata.estimated_duration_ms =
        extract_tag(body, "estimated_duration").and_then(parse_duration_ms);
    plan
}

/// Parse every well-formed `<step>` block in `text`.
///
/// Dependencies resolve first against the steps parsed here, then against
/// `known`, which maps literal tokens (e.g. the string form of an existing
/// step id) to ids that already exist outside this text. References that
/// resolve nowhere are dropped.
pub(crate) fn parse_steps(
    text: &str,
    config: &PlannerConfig,
    known: &HashMap<String, StepId>,
) -> Vec<PlanStep> {
    let mut steps = Vec::new();
    let mut literal_ids: HashMap<String, StepId> = HashMap::new();
    let mut pending_deps: Vec<Vec<String>> = Vec::new();

    for (position, block) in extract_blocks(text, "step").into_iter().enumerate() {
        let literal = extract_tag(block, "id").filter(|s| !s.is_empty());
        let action = extract_tag(block, "action").filter(|s| !s.is_empty());
        let (Some(literal), Some(action)) = (literal, action) else {
            tracing::warn!(position, "skipping step block without id or action");
            continue;
        };

        let mut step = PlanStep::new(action).with_retry(config.default_retry.clone());
        step.parameters = extract_tag(block, "parameters")
            .map(|raw| parse_parameters(raw, action))
            .unwrap_or_default();

        if literal_ids.insert(literal.to_string(), step.id).is_some() {
            tracing::warn!(literal, "duplicate step id in planner output, later step wins");
        }
        pending_deps.push(
            extract_tag(block, "dependencies")
                .map(parse_dependency_tokens)
                .unwrap_or_default(),
        );
        steps.push(step);
    }

    for (step, tokens) in steps.iter_mut().zip(pending_deps) {
        for token in tokens {
            match literal_ids.get(&token).or_else(|| known.get(&token)) {
                Some(id) => step.dependencies.push(*id),
                None => tracing::warn!(
                    action = %step.action,
                    dependency = %token,
                    "dropping unresolved dependency"
                ),
            }
        }
    }

    steps
}

/// The single step used when nothing usable could be parsed.
pub(crate) fn fallback_step(config: &PlannerConfig) -> PlanStep {
    PlanStep::new(config.fallback_action.clone())
        .with_parameter("text", Value::String(config.fallback_text.clone()))
        .with_retry(config.default_retry.clone())
}

fn parse_parameters(raw: &str, action: &str) -> serde_json::Map<String, Value> {
    if raw.is_empty() {
        return serde_json::Map::new();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            tracing::warn!(action, "step parameters are not a JSON object, using none");
            serde_json::Map::new()
        }
    }
}

/// JSON array of ids (strings or numbers); a bare comma-separated list is
/// accepted too.
fn parse_dependency_tokens(raw: &str) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Vec<Value>>(raw) {
        Ok(values) => values
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => raw
            .trim_matches(|c| c == '[' || c == ']')
            .split(',')
            .map(|s| s.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    }
}

/// Leading digits in milliseconds, e.g. `"45000"` or `"45000ms"`.
fn parse_duration_ms(raw: &str) -> Option<u64> {
    let digits: String = raw.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

// ---------------------------------------------------------------------------
// Tag extraction
// ---------------------------------------------------------------------------

/// Trimmed content of the first `<tag>...</tag>` pair in `text`.
pub(crate) fn extract_tag<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = text.find(&open)? + open.len();
    let len = text[start..].find(&close)?;
    Some(text[start..start + len].trim())
}

/// Raw contents of every non-overlapping `<tag>...</tag>` pair, in order.
/// An unterminated final block is ignored.
fn extract_blocks<'a>(text: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(found) = rest.find(&open) {
        let after = &rest[found + open.len()..];
        let Some(end) = after.find(&close) else {
            break;
        };
        blocks.push(&after[..end]);
        rest = &after[end + close.len()..];
    }
    blocks
}
