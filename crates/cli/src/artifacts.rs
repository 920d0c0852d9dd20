//! Post-run artifact archiving
//!
//! After a session the crash log and every modified file are copied out of
//! the workspace into the run store, so a run can be inspected after the
//! container is gone.

use std::path::Path;

use tracing::{info, warn};

use caro_core::run::{CrashLogKind, RunRecord, RunStore};
use caro_target::WorkspaceTarget;

const CRASH_LOG_FILE: &str = "crash.log";

/// What was archived for a run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub crash_log: bool,
    pub patch_files: Vec<String>,
    pub failures: usize,
}

/// Flatten a workspace-relative path into one file name
pub fn flatten_path(path: &str) -> String {
    path.replace(['/', '\\'], "__")
}

/// Store name for a modified file: `<flattened path>-patch1` or `-patch2`
pub fn patch_artifact_name(path: &str, resume_flag: bool) -> String {
    let suffix = if resume_flag { "patch2" } else { "patch1" };
    format!("{}-{}", flatten_path(path), suffix)
}

/// Copy the crash log and modified files of `record` into `store`
///
/// Failures are logged and counted; archiving never aborts part way.
pub async fn archive_artifacts(
    target: &dyn WorkspaceTarget,
    store: &RunStore,
    record: &RunRecord,
) -> ArchiveSummary {
    let mut summary = ArchiveSummary::default();
    let workspace = Path::new(&record.workspace);

    match target.read_file(&workspace.join(CRASH_LOG_FILE)).await {
        Ok(Some(crash_log)) => {
            match store.insert_crash_log(&record.run_id, CrashLogKind::Original, &crash_log) {
                Ok(()) => summary.crash_log = true,
                Err(e) => {
                    warn!("Failed to store crash log of {}: {}", record.run_id, e);
                    summary.failures += 1;
                }
            }
        }
        Ok(None) => info!("No {} in {}", CRASH_LOG_FILE, record.workspace),
        Err(e) => {
            warn!("Failed to read {}: {}", CRASH_LOG_FILE, e);
            summary.failures += 1;
        }
    }

    for path in &record.modified_files {
        let content = match target.read_file(&workspace.join(path)).await {
            Ok(Some(content)) => content,
            Ok(None) => {
                summary.failures += 1;
                continue;
            }
            Err(e) => {
                warn!("Failed to read modified file {}: {}", path, e);
                summary.failures += 1;
                continue;
            }
        };

        let name = patch_artifact_name(path, record.resume_flag);
        match store.save_patch_file(&record.run_id, &name, &content) {
            Ok(stored) => {
                info!("Archived {} to {}", path, stored.display());
                summary.patch_files.push(name);
            }
            Err(e) => {
                warn!("Failed to archive {}: {}", path, e);
                summary.failures += 1;
            }
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use caro_core::run::{RunSink, SessionOutcome, TokenUsage};
    use caro_target::LocalWorkspaceTarget;
    use chrono::Utc;
    use tempfile::TempDir;

    fn record(workspace: &Path, modified: &[&str]) -> RunRecord {
        RunRecord {
            run_id: "arvo-1-vul1".to_string(),
            vuln_id: "1".to_string(),
            agent: Default::default(),
            agent_model: None,
            workspace: workspace.to_string_lossy().into_owned(),
            patch_url: None,
            prompt: "fix it".to_string(),
            resume_flag: false,
            resume_id: Some("abc".to_string()),
            started_at: Utc::now(),
            duration_secs: 1.5,
            return_code: Some(0),
            outcome: SessionOutcome::Completed,
            usage: TokenUsage::new(10, 0, 5),
            agent_message: None,
            modified_files: modified.iter().map(|p| p.to_string()).collect(),
            stderr_tail: None,
            execution_error: None,
            log_path: workspace.join("agent.log"),
            agent_log: String::new(),
        }
    }

    #[test]
    fn test_patch_artifact_name() {
        assert_eq!(flatten_path("src/ssl.c"), "src__ssl.c");
        assert_eq!(patch_artifact_name("wolfcrypt/src/dh.c", false), "wolfcrypt__src__dh.c-patch1");
        assert_eq!(patch_artifact_name("a\\b.c", true), "a__b.c-patch2");
    }

    #[tokio::test]
    async fn test_archive_artifacts() {
        let temp = TempDir::new().unwrap();
        let workspace = temp.path().join("ws");
        std::fs::create_dir_all(workspace.join("src")).unwrap();
        std::fs::write(workspace.join("crash.log"), "ERROR: heap-buffer-overflow").unwrap();
        std::fs::write(workspace.join("src/ssl.c"), "int x;").unwrap();

        let store = RunStore::new(temp.path().join("data"));
        let record = record(&workspace, &["src/ssl.c", "src/gone.c"]);
        store.record_run(&record).unwrap();

        let target = LocalWorkspaceTarget::new(&workspace);
        let summary = archive_artifacts(&target, &store, &record).await;

        assert!(summary.crash_log);
        assert_eq!(summary.patch_files, vec!["src__ssl.c-patch1".to_string()]);
        assert_eq!(summary.failures, 1);
        assert_eq!(
            store
                .load_crash_log(&record.run_id, CrashLogKind::Original)
                .unwrap()
                .as_deref(),
            Some("ERROR: heap-buffer-overflow")
        );
        assert_eq!(
            store.list_patch_files(&record.run_id).unwrap(),
            vec!["src__ssl.c-patch1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_archive_unrecorded_run_counts_failures() {
        let temp = TempDir::new().unwrap();
        let workspace = temp.path().join("ws");
        std::fs::create_dir_all(&workspace).unwrap();
        std::fs::write(workspace.join("crash.log"), "crash").unwrap();

        let store = RunStore::new(temp.path().join("data"));
        let target = LocalWorkspaceTarget::new(&workspace);
        let summary = archive_artifacts(&target, &store, &record(&workspace, &[])).await;

        assert!(!summary.crash_log);
        assert_eq!(summary.failures, 1);
    }
}
