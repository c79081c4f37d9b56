//! `validate`, `order`, `parse`, and `simple` subcommands.

use std::path::Path;

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use planwright_core::PlanExecutor;
use planwright_core::plan::{execution_order, parse_plan};
use planwright_types::config::PlannerConfig;
use planwright_types::execution::MessageContext;
use planwright_types::plan::{Plan, StepStatus};

use crate::builtin;
use crate::cli::{goal_from_path, load_plan, run};

// ---------------------------------------------------------------------------
// Validate
// ---------------------------------------------------------------------------

pub async fn handle_validate(file: &Path, config: &PlannerConfig, json: bool) -> Result<()> {
    let plan = load_plan(file, config).await?;
    let executor = PlanExecutor::new(builtin::registry(), config.clone());
    let report = executor.validate_plan(&plan);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!();
        let verdict = if report.valid {
            style("valid").green().bold()
        } else {
            style("invalid").red().bold()
        };
        println!(
            "  Plan '{}' ({} steps, {}) is {verdict}",
            style(&plan.goal).cyan(),
            plan.total_steps(),
            plan.execution_model
        );
        for error in &report.errors {
            println!("  {} {error}", style("✗").red());
        }
        for warning in &report.warnings {
            println!("  {} {warning}", style("!").yellow());
        }
        println!();
    }

    if !report.valid {
        bail!("plan has {} validation error(s)", report.errors.len());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

pub async fn handle_order(file: &Path, config: &PlannerConfig, json: bool) -> Result<()> {
    let plan = load_plan(file, config).await?;
    let order = execution_order(&plan.steps)?;

    if json {
        let out: Vec<_> = order
            .iter()
            .map(|&idx| {
                let step = &plan.steps[idx];
                serde_json::json!({
                    "index": idx,
                    "step_id": step.id.to_string(),
                    "action": step.action,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Run").fg(Color::Cyan),
            Cell::new("Step"),
            Cell::new("Action"),
            Cell::new("After"),
        ]);
    for (position, &idx) in order.iter().enumerate() {
        let step = &plan.steps[idx];
        table.add_row(vec![
            Cell::new(position + 1),
            Cell::new(format!("#{idx}")),
            Cell::new(&step.action),
            Cell::new(dependency_labels(&plan, idx)),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Parse
// ---------------------------------------------------------------------------

pub async fn handle_parse(
    file: &Path,
    goal: Option<&str>,
    config: &PlannerConfig,
    json: bool,
) -> Result<()> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let fallback_goal = goal.map_or_else(|| goal_from_path(file), str::to_string);
    let plan = parse_plan(&text, &fallback_goal, config);

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print_plan(&plan, false);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Simple
// ---------------------------------------------------------------------------

pub async fn handle_simple(
    words: &[String],
    run_it: bool,
    config: &PlannerConfig,
    json: bool,
) -> Result<()> {
    let message = MessageContext::from_text(words.join(" "));
    let executor = PlanExecutor::new(builtin::registry(), config.clone());
    let plan = executor.create_simple_plan(&message);

    if run_it {
        return run::execute_and_report(&executor, plan, message, json).await;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print_plan(&plan, false);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Styled summary of a plan: header line plus one table row per step.
pub fn print_plan(plan: &Plan, with_status: bool) {
    println!();
    println!(
        "  {} {}",
        style("Plan").bold(),
        style(&plan.goal).cyan()
    );
    println!(
        "  {} · {} · {}",
        plan.id,
        plan.execution_model,
        plan.run_state.status
    );
    if !plan.thought.is_empty() {
        println!("  {}", style(&plan.thought).dim());
    }

    let mut header = vec![
        Cell::new("#").fg(Color::Cyan),
        Cell::new("Action"),
        Cell::new("Parameters"),
        Cell::new("After"),
    ];
    if with_status {
        header.push(Cell::new("Status"));
        header.push(Cell::new("Error"));
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);

    for (idx, step) in plan.steps.iter().enumerate() {
        let params = serde_json::Value::Object(step.parameters.clone()).to_string();
        let mut row = vec![
            Cell::new(idx),
            Cell::new(&step.action),
            Cell::new(params),
            Cell::new(dependency_labels(plan, idx)),
        ];
        if with_status {
            row.push(Cell::new(step.status).fg(status_color(step.status)));
            row.push(Cell::new(step.error.as_deref().unwrap_or("")));
        }
        table.add_row(row);
    }

    println!("{table}");
    println!();
}

fn status_color(status: StepStatus) -> Color {
    match status {
        StepStatus::Completed => Color::Green,
        StepStatus::Failed => Color::Red,
        StepStatus::Skipped => Color::Yellow,
        _ => Color::Grey,
    }
}

/// `#i` labels of a step's dependencies; `?` for ids not in the plan.
fn dependency_labels(plan: &Plan, idx: usize) -> String {
    plan.steps[idx]
        .dependencies
        .iter()
        .map(|dep| match plan.step_index(*dep) {
            Some(i) => format!("#{i}"),
            None => "?".to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use planwright_types::plan::{ExecutionModel, PlanStep, StepId};

    #[test]
    fn dependency_labels_use_declaration_indexes() {
        let a = PlanStep::new("A");
        let b = PlanStep::new("B");
        let c = PlanStep::new("C").with_dependencies([b.id, a.id, StepId::new()]);
        let plan = Plan::new("goal", vec![a, b, c], ExecutionModel::Graph);
        assert_eq!(dependency_labels(&plan, 2), "#1, #0, ?");
        assert_eq!(dependency_labels(&plan, 0), "");
    }
}
