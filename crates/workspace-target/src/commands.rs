//! Command execution utilities

use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::error::{Result, TargetError};

/// Output from a finished command
#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub code: Option<i32>,
}

/// Run a command to completion and capture its output
pub async fn run_command(program: &str, args: &[&str]) -> Result<CommandOutput> {
    debug!("Running {} {:?}", program, args);

    let mut cmd = Command::new(program);
    cmd.args(args);
    output_of(cmd, program).await
}

/// Run a prepared command to completion and capture its output
pub(crate) async fn output_of(mut cmd: Command, label: &str) -> Result<CommandOutput> {
    let output = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| {
            TargetError::command_failed_with_source(format!("Failed to execute {}", label), e)
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    trace!("{} stdout: {}", label, stdout);
    if !stderr.is_empty() {
        trace!("{} stderr: {}", label, stderr);
    }

    Ok(CommandOutput {
        stdout,
        stderr,
        success: output.status.success(),
        code: output.status.code(),
    })
}

/// Run a command and return its stdout, or an error if it fails
pub(crate) async fn run_command_checked(program: &str, args: &[&str]) -> Result<String> {
    let output = run_command(program, args).await?;

    if !output.success {
        return Err(TargetError::command_failed(format!(
            "{} {} failed (exit {:?}): {}",
            program,
            args.join(" "),
            output.code,
            output.stderr.trim()
        )));
    }

    Ok(output.stdout)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_command_captures_output() {
        let output = run_command("sh", &["-c", "echo out; echo err 1>&2; exit 3"])
            .await
            .unwrap();
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
        assert!(!output.success);
        assert_eq!(output.code, Some(3));
    }

    #[tokio::test]
    async fn test_run_command_checked_fails() {
        let err = run_command_checked("sh", &["-c", "echo nope 1>&2; exit 1"])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let err = run_command("definitely-not-a-real-program-caro", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, TargetError::CommandFailed { source: Some(_), .. }));
    }
}
