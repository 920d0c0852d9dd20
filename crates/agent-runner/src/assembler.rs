//! Run record assembly

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};

use caro_core::run::{ModifiedFileRecord, RunRecord, SessionOutcome, SessionRequest};

use crate::metrics::SessionMetrics;

/// Everything a finished session contributes to its record
#[derive(Debug)]
pub struct RecordParts<'a> {
    pub run_id: &'a str,
    pub request: &'a SessionRequest,
    pub agent_model: Option<String>,
    pub workspace: &'a Path,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub return_code: Option<i32>,
    pub outcome: SessionOutcome,
    pub metrics: SessionMetrics,
    pub modified_files: Vec<ModifiedFileRecord>,
    pub stderr_tail: Option<String>,
    pub execution_error: Option<String>,
    pub log_path: PathBuf,
    pub agent_log: String,
}

/// Combine session parts into the final record
pub fn assemble(parts: RecordParts<'_>) -> RunRecord {
    let SessionMetrics {
        usage,
        thread_id,
        last_agent_message,
        ..
    } = parts.metrics;

    // A resumed session that never re-announces itself keeps the id it resumed
    let resume_id = thread_id.or_else(|| parts.request.resume_session_id.clone());

    RunRecord {
        run_id: parts.run_id.to_string(),
        vuln_id: parts.request.vuln_id.clone(),
        agent: parts.request.agent,
        agent_model: parts.agent_model,
        workspace: parts.workspace.to_string_lossy().into_owned(),
        patch_url: parts.request.patch_url.clone(),
        prompt: parts.request.prompt.clone(),
        resume_flag: parts.request.resume,
        resume_id,
        started_at: parts.started_at,
        duration_secs: parts.duration.as_secs_f64(),
        return_code: parts.return_code,
        outcome: parts.outcome,
        usage,
        agent_message: last_agent_message,
        modified_files: parts.modified_files.into_iter().map(|f| f.path).collect(),
        stderr_tail: parts.stderr_tail,
        execution_error: parts.execution_error,
        log_path: parts.log_path,
        agent_log: parts.agent_log,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caro_core::run::{TargetDescriptor, TokenUsage};

    fn parts<'a>(request: &'a SessionRequest, metrics: SessionMetrics) -> RecordParts<'a> {
        RecordParts {
            run_id: "arvo-42488087-vul1768028264",
            request,
            agent_model: Some("gpt-5-codex".to_string()),
            workspace: Path::new("/src/wolfssl"),
            started_at: Utc::now(),
            duration: Duration::from_millis(1500),
            return_code: Some(0),
            outcome: SessionOutcome::Completed,
            metrics,
            modified_files: vec![ModifiedFileRecord {
                path: "src/internal.c".to_string(),
                modified_at: Utc::now(),
            }],
            stderr_tail: None,
            execution_error: None,
            log_path: PathBuf::from("runs/r/agent_r.log"),
            agent_log: "{}\n".to_string(),
        }
    }

    #[test]
    fn test_assemble_copies_request_and_metrics() {
        let request = SessionRequest::new("42488087", TargetDescriptor::container("c"), "fix it")
            .with_patch_url("https://github.com/wolfSSL/wolfssl/commit/abc");
        let metrics = SessionMetrics {
            usage: TokenUsage::new(100, 20, 50),
            thread_id: Some("abc".to_string()),
            last_agent_message: Some("Patched".to_string()),
            ..SessionMetrics::default()
        };

        let record = assemble(parts(&request, metrics));

        assert_eq!(record.vuln_id, "42488087");
        assert_eq!(record.resume_id.as_deref(), Some("abc"));
        assert_eq!(record.usage.total_tokens, 150);
        assert_eq!(record.agent_message.as_deref(), Some("Patched"));
        assert_eq!(record.modified_files, vec!["src/internal.c"]);
        assert_eq!(record.duration_secs, 1.5);
        assert_eq!(record.workspace, "/src/wolfssl");
        assert!(!record.resume_flag);
        assert!(record.succeeded());
    }

    #[test]
    fn test_resumed_session_keeps_requested_id() {
        let request = SessionRequest::new("1", TargetDescriptor::container("c"), "again")
            .resuming(Some("019b3597".to_string()));

        let record = assemble(parts(&request, SessionMetrics::default()));

        assert!(record.resume_flag);
        assert_eq!(record.resume_id.as_deref(), Some("019b3597"));
    }
}
