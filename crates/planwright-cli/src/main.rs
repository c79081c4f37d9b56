//! Planwright CLI entry point.
//!
//! Binary name: `pw`
//!
//! Parses CLI arguments, loads the planner configuration, then dispatches to
//! the command handler.

mod builtin;
mod cli;
mod config;

use clap::Parser;

use cli::{Cli, Commands};
use planwright_observe::tracing_setup::{init_tracing, shutdown_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "info,planwright_core=debug,pw=debug",
        _ => "trace",
    };
    if let Err(e) = init_tracing(filter, cli.otel) {
        eprintln!("Warning: tracing setup failed: {e}");
    }

    let config = config::load_config(cli.config.as_deref()).await;

    let result = match cli.command {
        Commands::Validate { file } => cli::plan::handle_validate(&file, &config, cli.json).await,
        Commands::Order { file } => cli::plan::handle_order(&file, &config, cli.json).await,
        Commands::Parse { file, goal } => {
            cli::plan::handle_parse(&file, goal.as_deref(), &config, cli.json).await
        }
        Commands::Simple { message, run } => {
            cli::plan::handle_simple(&message, run, &config, cli.json).await
        }
        Commands::Run { file, message } => {
            cli::run::handle_run(&file, message.as_deref(), &config, cli.json).await
        }
    };

    shutdown_tracing();
    result
}
