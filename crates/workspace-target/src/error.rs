//! Error types for workspace target operations

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for target operations
pub type Result<T> = std::result::Result<T, TargetError>;

/// Errors that can occur while talking to a workspace target
#[derive(Debug, Error)]
pub enum TargetError {
    /// A command could not be run or exited unsuccessfully
    #[error("Command failed: {message}")]
    CommandFailed {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Workspace directory does not exist
    #[error("Workspace not found at {path}")]
    WorkspaceNotFound { path: PathBuf },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse command output
    #[error("Failed to parse command output: {message}")]
    ParseError { message: String },
}

impl TargetError {
    /// Create a CommandFailed error
    pub fn command_failed(message: impl Into<String>) -> Self {
        Self::CommandFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a CommandFailed error with source
    pub fn command_failed_with_source(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            message: message.into(),
            source: Some(source),
        }
    }
}
