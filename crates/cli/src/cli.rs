//! Command-line definitions

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Default experiment setup file.
const DEFAULT_SETUP_FILE: &str = "experiment_setup.json";

/// Run coding agents against vulnerable workspaces and record the outcome.
#[derive(Parser, Debug)]
#[command(name = "caro")]
#[command(about = "Run a coding agent against a vulnerable workspace and record the session")]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Base data directory for transcripts and run records.
    #[arg(long, env = "CARO_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Agent executable to launch instead of the default.
    #[arg(long, env = "CARO_AGENT_PROGRAM", global = true)]
    pub agent_program: Option<String>,

    /// Terminate the agent after this many seconds (0 disables the limit).
    #[arg(long, env = "CARO_SESSION_TIMEOUT_SECS", global = true)]
    pub timeout_secs: Option<u64>,

    /// Do not narrate agent events on stdout.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one batch session described by a setup file.
    Run(SessionArgs),

    /// Run a session that forwards stdin lines to the agent (`/quit` ends it).
    #[command(alias = "chat")]
    Interactive(SessionArgs),

    /// Print a recorded run.
    Show {
        /// Run to print.
        run_id: String,

        /// Print the session transcript instead of the record.
        #[arg(long)]
        log: bool,
    },

    /// List recorded runs, newest first.
    #[command(alias = "ls")]
    List {
        /// Show at most this many runs.
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
}

/// Arguments shared by the session subcommands.
#[derive(Parser, Debug)]
pub struct SessionArgs {
    /// Experiment setup file.
    #[arg(short, long, default_value = DEFAULT_SETUP_FILE)]
    pub setup: PathBuf,

    /// Run ID to record under; generated from the vulnerability ID when omitted.
    #[arg(long)]
    pub run_id: Option<String>,

    /// Skip asking the agent which model it uses.
    #[arg(long)]
    pub no_model_detection: bool,
}
