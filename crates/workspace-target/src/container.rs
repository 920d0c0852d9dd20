//! Container-backed workspace, reached through `docker exec`

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::process::Command;
use tracing::{debug, error, warn};

use crate::commands::{run_command, run_command_checked};
use crate::error::{Result, TargetError};
use crate::target::{is_vcs_path, ModifiedFile, WorkspaceTarget};

/// A workspace inside a running container
#[derive(Debug, Clone)]
pub struct ContainerTarget {
    name: String,
    docker: String,
}

impl ContainerTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            docker: "docker".to_string(),
        }
    }

    /// Use a different container CLI (e.g. `podman`)
    pub fn with_docker_binary(mut self, docker: impl Into<String>) -> Self {
        self.docker = docker.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn exec_args<'a>(&'a self, args: &[&'a str]) -> Vec<&'a str> {
        let mut full = vec!["exec", self.name.as_str()];
        full.extend_from_slice(args);
        full
    }
}

#[async_trait]
impl WorkspaceTarget for ContainerTarget {
    fn describe(&self) -> String {
        format!("container {}", self.name)
    }

    async fn working_dir(&self) -> Result<PathBuf> {
        let stdout = run_command_checked(&self.docker, &self.exec_args(&["pwd"])).await?;
        let pwd = stdout.trim();
        if pwd.is_empty() {
            return Err(TargetError::ParseError {
                message: format!("empty working directory from container {}", self.name),
            });
        }
        debug!("Container {} working directory is {}", self.name, pwd);
        Ok(PathBuf::from(pwd))
    }

    async fn read_file(&self, path: &Path) -> Result<Option<String>> {
        let path_str = path.to_string_lossy();
        let output = run_command(&self.docker, &self.exec_args(&["cat", &path_str])).await?;
        if output.success {
            Ok(Some(output.stdout))
        } else {
            warn!("File not found in container {}: {}", self.name, path_str);
            Ok(None)
        }
    }

    async fn modified_since(&self, root: &Path, since: DateTime<Utc>) -> Result<Vec<ModifiedFile>> {
        let root_str = root.to_string_lossy();
        // find -newermt is strictly-newer; start one second early and filter
        // at whole-second resolution below so the boundary is inclusive.
        let newer_than = format!("@{}", since.timestamp() - 1);
        let args = self.exec_args(&[
            "find",
            &root_str,
            "-type",
            "f",
            "-not",
            "-path",
            "*/.git/*",
            "-newermt",
            &newer_than,
            "-printf",
            "%T@ %p\\n",
        ]);

        let output = run_command(&self.docker, &args).await?;
        if !output.success {
            error!(
                "find in container {} failed (exit {:?}): {}",
                self.name,
                output.code,
                output.stderr.trim()
            );
            return Err(TargetError::command_failed(format!(
                "find in container {} failed: {}",
                self.name,
                output.stderr.trim()
            )));
        }

        let threshold = since.timestamp();
        let files = parse_find_output(&output.stdout)?
            .into_iter()
            .filter(|file| file.modified_at.timestamp() >= threshold && !is_vcs_path(&file.path))
            .collect::<Vec<_>>();

        debug!("Found {} modified files in container {}", files.len(), self.name);
        Ok(files)
    }

    fn agent_command(&self, program: &str, args: &[String], interactive: bool) -> Command {
        let mut cmd = Command::new(&self.docker);
        cmd.arg("exec");
        if interactive {
            cmd.arg("-i");
        }
        cmd.arg(&self.name).arg(program).args(args);
        cmd
    }
}

/// Parse `find -printf '%T@ %p\n'` lines into modified files
fn parse_find_output(stdout: &str) -> Result<Vec<ModifiedFile>> {
    let mut files = Vec::new();

    for line in stdout.lines().filter(|line| !line.trim().is_empty()) {
        let (stamp, path) = line.split_once(' ').ok_or_else(|| TargetError::ParseError {
            message: format!("unexpected find output line: {}", line),
        })?;

        let modified_at = parse_epoch(stamp).ok_or_else(|| TargetError::ParseError {
            message: format!("invalid modification time {:?} for {}", stamp, path),
        })?;

        files.push(ModifiedFile {
            path: PathBuf::from(path),
            modified_at,
        });
    }

    Ok(files)
}

/// Parse `seconds[.fraction]` since the epoch
fn parse_epoch(stamp: &str) -> Option<DateTime<Utc>> {
    let (secs, frac) = match stamp.split_once('.') {
        Some((secs, frac)) => (secs, frac),
        None => (stamp, ""),
    };
    let secs: i64 = secs.parse().ok()?;

    let nanos = if frac.is_empty() {
        0
    } else {
        let digits: String = frac.chars().take(9).collect();
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        format!("{:0<9}", digits).parse::<u32>().ok()?
    };

    DateTime::from_timestamp(secs, nanos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_find_output() {
        let stdout = "1768028264.1234567890 /src/wolfssl/src/ssl.c\n\
                      1768028265.5 /src/wolfssl/my file.c\n\n";
        let files = parse_find_output(stdout).unwrap();

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, PathBuf::from("/src/wolfssl/src/ssl.c"));
        assert_eq!(files[0].modified_at.timestamp(), 1768028264);
        assert_eq!(files[0].modified_at.timestamp_subsec_nanos(), 123456789);
        assert_eq!(files[1].path, PathBuf::from("/src/wolfssl/my file.c"));
        assert_eq!(files[1].modified_at.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn test_parse_find_output_rejects_garbage() {
        assert!(parse_find_output("not-a-time /src/x.c").is_err());
        assert!(parse_find_output("nospace").is_err());
    }

    #[test]
    fn test_parse_epoch_without_fraction() {
        let time = parse_epoch("1700000000").unwrap();
        assert_eq!(time.timestamp(), 1700000000);
        assert_eq!(time.timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn test_agent_command_wraps_docker_exec() {
        let target = ContainerTarget::new("arvo-42488087-vul-1");
        let args = vec!["exec".to_string(), "--json".to_string()];

        let cmd = target.agent_command("codex", &args, false);
        let std_cmd = cmd.as_std();
        assert_eq!(std_cmd.get_program(), "docker");
        let argv: Vec<_> = std_cmd.get_args().map(|a| a.to_string_lossy().to_string()).collect();
        assert_eq!(argv, vec!["exec", "arvo-42488087-vul-1", "codex", "exec", "--json"]);

        let cmd = target.agent_command("codex", &args, true);
        let argv: Vec<_> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(argv[..3], ["exec", "-i", "arvo-42488087-vul-1"]);
    }
}
