//! `run` subcommand: execute a plan with the built-in actions.
//!
//! Progress is rendered from the executor's event stream. The first Ctrl-C
//! requests cancellation; the plan stops at the next step boundary.

use std::path::Path;

use anyhow::{Result, bail};
use console::style;
use tokio::sync::broadcast::error::TryRecvError;

use planwright_core::{ExecutorError, PlanExecutor};
use planwright_types::config::PlannerConfig;
use planwright_types::event::PlanEvent;
use planwright_types::execution::{ExecutionResult, MessageContext};
use planwright_types::plan::Plan;

use crate::builtin;
use crate::cli::load_plan;
use crate::cli::plan::print_plan;

pub async fn handle_run(
    file: &Path,
    message: Option<&str>,
    config: &PlannerConfig,
    json: bool,
) -> Result<()> {
    let plan = load_plan(file, config).await?;
    let executor = PlanExecutor::new(builtin::registry(), config.clone());

    let report = executor.validate_plan(&plan);
    for warning in &report.warnings {
        tracing::warn!("{warning}");
    }
    if !report.valid {
        for error in &report.errors {
            eprintln!("  {} {error}", style("✗").red());
        }
        bail!("refusing to run an invalid plan ({} error(s))", report.errors.len());
    }

    let message = MessageContext::from_text(message.unwrap_or(&plan.goal));
    execute_and_report(&executor, plan, message, json).await
}

/// Execute `plan`, streaming progress, and print the outcome.
pub async fn execute_and_report(
    executor: &PlanExecutor,
    mut plan: Plan,
    message: MessageContext,
    json: bool,
) -> Result<()> {
    let plan_id = plan.id;
    let mut events = executor.subscribe();
    let mut cancel_requested = false;

    if !json {
        println!();
        println!(
            "  {} {} ({} steps, {})",
            style("Running").green().bold(),
            style(&plan.goal).cyan(),
            plan.total_steps(),
            plan.execution_model
        );
    }

    let outcome = {
        let execution = executor.execute_plan(&mut plan, &message);
        tokio::pin!(execution);
        loop {
            tokio::select! {
                outcome = &mut execution => break outcome,
                Ok(event) = events.recv() => {
                    if !json {
                        render_event(&event);
                    }
                }
                _ = tokio::signal::ctrl_c(), if !cancel_requested => {
                    cancel_requested = true;
                    if !json {
                        println!("  {} cancelling at the next step boundary", style("^C").yellow());
                    }
                    executor.cancel_plan(plan_id);
                }
            }
        }
    };

    // Events published after the last poll.
    loop {
        match events.try_recv() {
            Ok(event) if !json => render_event(&event),
            Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }

    match outcome {
        Ok(result) => {
            print_outcome(&plan, &result, json)?;
            if !result.success {
                bail!("plan finished with {} failed step(s)", result.error_count());
            }
            Ok(())
        }
        Err(ExecutorError::Aborted { partial }) => {
            print_outcome(&plan, &partial, json)?;
            bail!(
                "plan cancelled after {} of {} steps",
                partial.completed_steps,
                partial.total_steps
            );
        }
        Err(e) => Err(e.into()),
    }
}

fn print_outcome(plan: &Plan, result: &ExecutionResult, json: bool) -> Result<()> {
    if json {
        let out = serde_json::json!({
            "result": result,
            "plan": plan,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    print_plan(plan, true);
    for step in &result.results {
        if let Some(text) = &step.text {
            println!("  {} {}", style(&step.action).bold(), text);
        }
    }
    println!(
        "  {} of {} steps completed in {} ms",
        result.completed_steps, result.total_steps, result.duration_ms
    );
    println!();
    Ok(())
}

fn render_event(event: &PlanEvent) {
    match event {
        PlanEvent::StepStarted {
            action, attempt, ..
        } => {
            if *attempt > 1 {
                println!("  {} {action} (attempt {attempt})", style("→").cyan());
            } else {
                println!("  {} {action}", style("→").cyan());
            }
        }
        PlanEvent::StepRetrying {
            attempt,
            delay_ms,
            error,
            ..
        } => {
            println!(
                "    {} attempt {attempt} failed: {error}; retrying in {delay_ms} ms",
                style("!").yellow()
            );
        }
        PlanEvent::StepCompleted {
            action,
            duration_ms,
            ..
        } => {
            println!("  {} {action} ({duration_ms} ms)", style("✓").green());
        }
        PlanEvent::StepFailed {
            action,
            error,
            on_error,
            ..
        } => {
            println!(
                "  {} {action}: {error} [{on_error}]",
                style("✗").red()
            );
        }
        PlanEvent::PlanCancelled { .. } => {
            println!("  {} plan cancelled", style("■").yellow());
        }
        PlanEvent::PlanStarted { .. } | PlanEvent::PlanFinished { .. } => {}
    }
}
