//! CARO command-line driver
//!
//! Loads an experiment setup, runs the coding agent against the configured
//! workspace and records the session in the run store.

mod artifacts;
mod cli;
mod commands;
mod prompts;
mod setup;

use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use agent_runner::RunnerConfig;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; stdout carries the agent narration
    let level = cli.log_level.to_lowercase();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!(
                "caro={level},agent_runner={level},caro_target={level},caro_core={level}"
            )
            .into()
        }))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = runner_config(&cli);
    tracing::debug!("Using data directory: {:?}", config.data_dir);

    match &cli.command {
        Commands::Run(args) => {
            commands::run_session(config, args, false).await?;
        }
        Commands::Interactive(args) => {
            let result = commands::run_session(config, args, true).await;
            // A pending stdin read would keep the runtime from shutting down
            let code = match result {
                Ok(_) => 0,
                Err(e) => {
                    eprintln!("Error: {:?}", e);
                    1
                }
            };
            std::process::exit(code);
        }
        Commands::Show { run_id, log } => {
            println!("{}", commands::show_run(&config.data_dir, run_id, *log)?);
        }
        Commands::List { limit } => {
            println!("{}", commands::list_runs(&config.data_dir, *limit)?);
        }
    }

    Ok(())
}

/// Environment configuration with command-line overrides applied
fn runner_config(cli: &Cli) -> RunnerConfig {
    let mut config = RunnerConfig::from_env();

    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }
    if let Some(program) = &cli.agent_program {
        config.agent_program = Some(program.clone());
    }
    match cli.timeout_secs {
        Some(0) => config.session_timeout = None,
        Some(secs) => config.session_timeout = Some(Duration::from_secs(secs)),
        None => {}
    }
    if cli.quiet {
        config.console = false;
    }

    config
}
