//! CLI command definitions for the `pw` binary.
//!
//! Uses clap derive macros for argument parsing. Every command reads a plan
//! file, except `simple`, which builds one from a message.

pub mod plan;
pub mod run;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use planwright_core::plan::parse_plan;
use planwright_types::config::PlannerConfig;
use planwright_types::plan::Plan;

/// Validate, order, and run action plans.
#[derive(Parser)]
#[command(name = "pw", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Detailed output (-v for info, -vv for debug, -vvv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Planner configuration file (defaults to the platform config dir).
    #[arg(long, global = true, env = "PLANWRIGHT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check a plan for structural problems.
    Validate {
        /// Plan file (`.json`, or tagged planner text).
        file: PathBuf,
    },

    /// Print the order a graph execution would run the steps in.
    Order {
        /// Plan file (`.json`, or tagged planner text).
        file: PathBuf,
    },

    /// Parse tagged planner text into a plan, with fallback.
    Parse {
        /// File containing `<plan>...</plan>` text.
        file: PathBuf,

        /// Goal to use when the text has none.
        #[arg(long)]
        goal: Option<String>,
    },

    /// Build a keyword-heuristic plan for a message.
    Simple {
        /// The message to plan for.
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,

        /// Execute the plan with the built-in actions.
        #[arg(long)]
        run: bool,
    },

    /// Execute a plan with the built-in actions. Ctrl-C cancels.
    Run {
        /// Plan file (`.json`, or tagged planner text).
        file: PathBuf,

        /// Message text handed to actions (defaults to the plan goal).
        #[arg(long)]
        message: Option<String>,
    },
}

/// Load a plan from disk.
///
/// `.json` files hold a serialized [`Plan`]; anything else is treated as
/// tagged planner text and parsed tolerantly, with the file stem as the
/// fallback goal.
pub async fn load_plan(path: &Path, config: &PlannerConfig) -> Result<Plan> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read plan file {}", path.display()))?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        return serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse plan JSON in {}", path.display()));
    }

    Ok(parse_plan(&content, &goal_from_path(path), config))
}

/// `greet_the-user.plan` -> `greet the user`.
pub fn goal_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().replace(['-', '_'], " "))
        .unwrap_or_else(|| "Execute plan".to_string())
}
