//! Host directory workspace

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::process::Command;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Result, TargetError};
use crate::target::{is_vcs_path, ModifiedFile, WorkspaceTarget};

/// A workspace that is a plain directory on the host
#[derive(Debug, Clone)]
pub struct LocalWorkspaceTarget {
    root: PathBuf,
}

impl LocalWorkspaceTarget {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

#[async_trait]
impl WorkspaceTarget for LocalWorkspaceTarget {
    fn describe(&self) -> String {
        format!("local workspace {}", self.root.display())
    }

    async fn working_dir(&self) -> Result<PathBuf> {
        match tokio::fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => Ok(self.root.clone()),
            Ok(_) => Err(TargetError::WorkspaceNotFound {
                path: self.root.clone(),
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(TargetError::WorkspaceNotFound {
                path: self.root.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_file(&self, path: &Path) -> Result<Option<String>> {
        let path = self.resolve(path);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("File not found in workspace: {}", path.display());
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn modified_since(&self, root: &Path, since: DateTime<Utc>) -> Result<Vec<ModifiedFile>> {
        let root = self.resolve(root);
        if !root.is_dir() {
            return Err(TargetError::WorkspaceNotFound { path: root });
        }

        let threshold = since.timestamp();
        tokio::task::spawn_blocking(move || scan(&root, threshold))
            .await
            .map_err(|e| TargetError::command_failed(format!("Workspace scan task failed: {}", e)))?
    }

    fn agent_command(&self, program: &str, args: &[String], _interactive: bool) -> Command {
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&self.root);
        cmd
    }

    fn host_workdir(&self) -> Option<&Path> {
        Some(&self.root)
    }
}

/// Walk `root` and keep files whose mtime, in whole seconds, is at least `threshold`
fn scan(root: &Path, threshold: i64) -> Result<Vec<ModifiedFile>> {
    let mut found = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !(entry.file_type().is_dir() && entry.file_name() == ".git"));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                if e.depth() == 0 {
                    return Err(TargetError::Io(e.into()));
                }
                warn!("Skipping unreadable workspace entry: {}", e);
                continue;
            }
        };

        if !entry.file_type().is_file() || is_vcs_path(entry.path()) {
            continue;
        }

        let modified = match entry.metadata().map(|meta| meta.modified()) {
            Ok(Ok(modified)) => DateTime::<Utc>::from(modified),
            Ok(Err(e)) => {
                warn!("No modification time for {}: {}", entry.path().display(), e);
                continue;
            }
            Err(e) => {
                warn!("Failed to stat {}: {}", entry.path().display(), e);
                continue;
            }
        };

        if modified.timestamp() >= threshold {
            found.push(ModifiedFile {
                path: entry.path().to_path_buf(),
                modified_at: modified,
            });
        }
    }

    debug!("Found {} modified files under {}", found.len(), root.display());
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn set_mtime(path: &Path, time: SystemTime) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(time).unwrap();
    }

    #[tokio::test]
    async fn test_working_dir() {
        let temp = TempDir::new().unwrap();
        let target = LocalWorkspaceTarget::new(temp.path());
        assert_eq!(target.working_dir().await.unwrap(), temp.path());

        let missing = LocalWorkspaceTarget::new(temp.path().join("missing"));
        assert!(matches!(
            missing.working_dir().await,
            Err(TargetError::WorkspaceNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_read_file() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("crash.log"), "ERROR: AddressSanitizer").unwrap();
        let target = LocalWorkspaceTarget::new(temp.path());

        let content = target.read_file(Path::new("crash.log")).await.unwrap();
        assert_eq!(content.as_deref(), Some("ERROR: AddressSanitizer"));

        let absolute = target
            .read_file(&temp.path().join("crash.log"))
            .await
            .unwrap();
        assert!(absolute.is_some());

        assert!(target.read_file(Path::new("nope.c")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_modified_since_is_inclusive_and_skips_git() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let since = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);

        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        for name in ["old.c", "src/same_second.c", "src/newer.c", ".git/index"] {
            fs::write(root.join(name), "x").unwrap();
        }
        set_mtime(&root.join("old.c"), since - Duration::from_secs(5));
        set_mtime(&root.join("src/same_second.c"), since);
        set_mtime(&root.join("src/newer.c"), since + Duration::from_secs(3));
        set_mtime(&root.join(".git/index"), since + Duration::from_secs(3));

        let target = LocalWorkspaceTarget::new(root);
        let mut found = target
            .modified_since(root, DateTime::<Utc>::from(since))
            .await
            .unwrap()
            .into_iter()
            .map(|file| file.path.strip_prefix(root).unwrap().to_path_buf())
            .collect::<Vec<_>>();
        found.sort();

        assert_eq!(
            found,
            vec![PathBuf::from("src/newer.c"), PathBuf::from("src/same_second.c")]
        );
    }

    #[tokio::test]
    async fn test_modified_since_missing_root() {
        let temp = TempDir::new().unwrap();
        let target = LocalWorkspaceTarget::new(temp.path());
        let result = target
            .modified_since(&temp.path().join("gone"), Utc::now())
            .await;
        assert!(result.is_err());
    }
}
