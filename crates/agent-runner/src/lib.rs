//! Agent Runner - drives coding-agent sessions against a workspace
//!
//! A session launches the agent as a subprocess, interprets its JSON event
//! stream line by line, detects the files it changed and assembles a
//! [`RunRecord`](caro_core::run::RunRecord). Every session that launched ends
//! with exactly one record and a transcript whose last entry is `session_end`.

mod assembler;
mod command;
mod config;
mod detector;
mod error;
mod event;
mod executor;
mod interpreter;
mod metrics;
mod parser;
mod presenter;
mod process;
mod session;
mod transcript;

pub use assembler::{assemble, RecordParts};
pub use command::{log_path, AgentInvocation, Attempt, CommandBuilder};
pub use config::{RunnerConfig, MODIFIED_FILES_MAX};
pub use detector::{detect_modified_files, reconcile};
pub use error::{Result, RunnerError};
pub use event::{AgentEvent, StreamEvent, TurnUsage};
pub use executor::{SessionRunner, QUIT_COMMAND};
pub use interpreter::{drive, DriveControl, Interpreter, StopReason};
pub use metrics::SessionMetrics;
pub use parser::{codex::CodexParser, create_parser, EventParser};
pub use presenter::{truncate_chars, ConsolePresenter, Presenter, QuietPresenter};
pub use process::{detect_agent_model, parse_model_line, AgentProcess, ProcessHandle};
pub use session::{FinalizeGuard, SessionLifecycle, SessionPhase};
pub use transcript::{load_records, LogRecord, LogType, TranscriptLog};
