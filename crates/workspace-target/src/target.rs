//! The workspace target interface

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use caro_core::run::TargetDescriptor;
use chrono::{DateTime, Utc};
use tokio::process::Command;

use crate::container::ContainerTarget;
use crate::error::Result;
use crate::local::LocalWorkspaceTarget;

/// A file found by a modification scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifiedFile {
    /// Path as reported by the target (absolute within the target)
    pub path: PathBuf,
    pub modified_at: DateTime<Utc>,
}

/// Environment an agent session runs against
#[async_trait]
pub trait WorkspaceTarget: Send + Sync {
    /// Human-readable description for logs
    fn describe(&self) -> String;

    /// Resolve the working directory the agent starts in
    async fn working_dir(&self) -> Result<PathBuf>;

    /// Read a file from the target; `Ok(None)` when it does not exist
    async fn read_file(&self, path: &Path) -> Result<Option<String>>;

    /// Enumerate regular files under `root` modified at or after `since`
    ///
    /// Version-control internals are skipped. The order of the result is
    /// unspecified.
    async fn modified_since(&self, root: &Path, since: DateTime<Utc>) -> Result<Vec<ModifiedFile>>;

    /// Build the command that runs `program args..` inside the target
    fn agent_command(&self, program: &str, args: &[String], interactive: bool) -> Command;

    /// Host directory the agent should be pointed at, when it runs on the host
    fn host_workdir(&self) -> Option<&Path> {
        None
    }
}

/// Create a target from its descriptor
pub fn from_descriptor(descriptor: &TargetDescriptor) -> Arc<dyn WorkspaceTarget> {
    match descriptor {
        TargetDescriptor::Local { path } => Arc::new(LocalWorkspaceTarget::new(path.clone())),
        TargetDescriptor::Container { name } => Arc::new(ContainerTarget::new(name.clone())),
    }
}

/// Whether a path lies inside version-control metadata
pub fn is_vcs_path(path: &Path) -> bool {
    path.components().any(|component| match component {
        Component::Normal(name) => name == ".git",
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_vcs_path() {
        assert!(is_vcs_path(Path::new("/src/wolfssl/.git/index")));
        assert!(is_vcs_path(Path::new(".git/HEAD")));
        assert!(!is_vcs_path(Path::new("/src/wolfssl/src/ssl.c")));
        assert!(!is_vcs_path(Path::new("/src/.gitignore")));
    }

    #[test]
    fn test_from_descriptor() {
        let target = from_descriptor(&TargetDescriptor::container("arvo-42488087-vul-1"));
        assert!(target.describe().contains("arvo-42488087-vul-1"));
        assert!(target.host_workdir().is_none());

        let target = from_descriptor(&TargetDescriptor::local("/tmp/ws"));
        assert_eq!(target.host_workdir(), Some(Path::new("/tmp/ws")));
    }
}
