//! Run - Persistent session record
//!
//! A RunRecord is assembled exactly once when a session finalizes and is
//! never mutated after it is handed to a sink.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::agent_type::AgentType;

/// Token accounting for one turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    /// Subset of `input_tokens` served from cache
    pub cached_input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, cached_input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            cached_input_tokens,
            output_tokens,
            total_tokens: input_tokens.saturating_add(output_tokens),
        }
    }
}

/// A file the agent changed during the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifiedFileRecord {
    /// Path relative to the workspace root
    pub path: String,
    pub modified_at: DateTime<Utc>,
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    /// Agent output stream closed on its own
    Completed,
    /// The stream could not be interpreted to the end
    Faulted,
    /// Terminated on request
    Cancelled,
    /// Terminated after exceeding the configured session timeout
    TimedOut,
}

impl SessionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Faulted => "faulted",
            Self::Cancelled => "cancelled",
            Self::TimedOut => "timed_out",
        }
    }
}

/// A persistent run record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Unique run ID
    pub run_id: String,

    /// Vulnerability the session targeted
    pub vuln_id: String,

    /// Agent used for the session
    pub agent: AgentType,

    /// Model reported by the agent, when it could be detected
    #[serde(default)]
    pub agent_model: Option<String>,

    /// Resolved working directory of the workspace
    pub workspace: String,

    #[serde(default)]
    pub patch_url: Option<String>,

    pub prompt: String,

    /// Whether the session resumed an earlier one
    pub resume_flag: bool,

    /// Last session identifier reported by the agent; feeds the next resume
    #[serde(default)]
    pub resume_id: Option<String>,

    pub started_at: DateTime<Utc>,

    /// Wall-clock session duration in seconds
    pub duration_secs: f64,

    /// Agent exit code; `None` when killed by a signal or never reaped
    pub return_code: Option<i32>,

    pub outcome: SessionOutcome,

    /// Token usage of the most recent turn
    #[serde(flatten)]
    pub usage: TokenUsage,

    /// Last user-facing message from the agent
    #[serde(default)]
    pub agent_message: Option<String>,

    /// Workspace-relative paths of files changed during the session
    #[serde(default)]
    pub modified_files: Vec<String>,

    /// Tail of the agent's standard error
    #[serde(default)]
    pub stderr_tail: Option<String>,

    /// Error that interrupted the session, if any
    #[serde(default)]
    pub execution_error: Option<String>,

    /// Location of the session transcript
    pub log_path: PathBuf,

    /// Full transcript as written to `log_path`
    pub agent_log: String,
}

impl RunRecord {
    pub fn succeeded(&self) -> bool {
        self.outcome == SessionOutcome::Completed && self.return_code == Some(0)
    }
}

/// Summary of a run for listing purposes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub vuln_id: String,
    /// Truncated prompt (first 100 chars)
    pub prompt_preview: String,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub return_code: Option<i32>,
    pub outcome: SessionOutcome,
    pub total_tokens: u64,
    pub modified_file_count: usize,
}

impl From<&RunRecord> for RunSummary {
    fn from(run: &RunRecord) -> Self {
        let prompt_preview = if run.prompt.chars().count() > 100 {
            format!("{}...", run.prompt.chars().take(100).collect::<String>())
        } else {
            run.prompt.clone()
        };

        Self {
            run_id: run.run_id.clone(),
            vuln_id: run.vuln_id.clone(),
            prompt_preview,
            started_at: run.started_at,
            duration_secs: run.duration_secs,
            return_code: run.return_code,
            outcome: run.outcome,
            total_tokens: run.usage.total_tokens,
            modified_file_count: run.modified_files.len(),
        }
    }
}
