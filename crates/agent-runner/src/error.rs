//! Error types for agent-runner

use std::path::PathBuf;
use thiserror::Error;

use caro_core::run::RunRecord;

use crate::session::SessionPhase;

/// Result type alias for runner operations
pub type Result<T> = std::result::Result<T, RunnerError>;

/// Errors that can occur while running an agent session
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Failed to spawn agent process
    #[error("Failed to spawn agent process: {message}")]
    SpawnFailed {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Run ID cannot name a run directory
    #[error("Invalid run id {0:?}")]
    InvalidRunId(String),

    /// A record for this run ID already exists
    #[error("Run already recorded: {0}")]
    DuplicateRun(String),

    /// Workspace target operation failed
    #[error("Workspace target error: {0}")]
    Target(#[from] caro_target::TargetError),

    /// Run store operation failed
    #[error("Run store error: {0}")]
    Store(#[from] caro_core::Error),

    /// The session finished but its record could not be persisted
    #[error("Failed to persist run {}: {source}", .record.run_id)]
    Persist {
        record: Box<RunRecord>,
        #[source]
        source: caro_core::Error,
    },

    /// Transcript could not be written
    #[error("Failed to write session log {path}: {source}")]
    Transcript {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Agent stdin is closed
    #[error("Agent process is no longer accepting input")]
    PipeClosed,

    /// Lifecycle transition that is not allowed
    #[error("Invalid session transition from {from:?} to {to:?}")]
    InvalidTransition { from: SessionPhase, to: SessionPhase },
}

impl RunnerError {
    /// Create a SpawnFailed error
    pub fn spawn_failed(message: impl Into<String>) -> Self {
        Self::SpawnFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a SpawnFailed error with source
    pub fn spawn_failed_with_source(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::SpawnFailed {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Whether the agent never started (no run record exists)
    pub fn is_launch_failure(&self) -> bool {
        matches!(
            self,
            Self::SpawnFailed { .. }
                | Self::InvalidRunId(_)
                | Self::DuplicateRun(_)
                | Self::Target(_)
                | Self::Transcript { .. }
        )
    }

    /// Record carried by a persistence failure
    pub fn into_record(self) -> Option<RunRecord> {
        match self {
            Self::Persist { record, .. } => Some(*record),
            _ => None,
        }
    }
}
