//! Modified-file detection

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use caro_core::run::ModifiedFileRecord;
use caro_target::{is_vcs_path, ModifiedFile, WorkspaceTarget};

/// Scan the workspace for files changed since `since`
///
/// A failed scan is logged and reported as no changes.
pub async fn detect_modified_files(
    target: &dyn WorkspaceTarget,
    workspace: &Path,
    since: DateTime<Utc>,
    cap: usize,
) -> Vec<ModifiedFileRecord> {
    match target.modified_since(workspace, since).await {
        Ok(candidates) => {
            let found = candidates.len();
            let files = reconcile(candidates, workspace, since, cap);
            info!(
                "Detected {} modified files in {} ({} candidates)",
                files.len(),
                target.describe(),
                found
            );
            files
        }
        Err(e) => {
            error!("Failed to scan {} for modified files: {}", target.describe(), e);
            Vec::new()
        }
    }
}

/// Filter, deduplicate and cap scan results
///
/// Keeps files modified at or after `since` (whole seconds), outside VCS
/// metadata. When more than `cap` remain, only the most recently modified are
/// kept. The result is ordered oldest first with paths relative to `workspace`.
pub fn reconcile(
    candidates: Vec<ModifiedFile>,
    workspace: &Path,
    since: DateTime<Utc>,
    cap: usize,
) -> Vec<ModifiedFileRecord> {
    let threshold = since.timestamp();
    let mut latest: HashMap<PathBuf, DateTime<Utc>> = HashMap::new();

    for file in candidates {
        if is_vcs_path(&file.path) || file.modified_at.timestamp() < threshold {
            continue;
        }
        let entry = latest.entry(file.path).or_insert(file.modified_at);
        if file.modified_at > *entry {
            *entry = file.modified_at;
        }
    }

    let mut files: Vec<(PathBuf, DateTime<Utc>)> = latest.into_iter().collect();
    files.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

    if files.len() > cap {
        debug!("Keeping the {} most recent of {} modified files", cap, files.len());
        files.drain(..files.len() - cap);
    }

    files
        .into_iter()
        .map(|(path, modified_at)| ModifiedFileRecord {
            path: relative_to(&path, workspace),
            modified_at,
        })
        .collect()
}

fn relative_to(path: &Path, workspace: &Path) -> String {
    path.strip_prefix(workspace)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}
