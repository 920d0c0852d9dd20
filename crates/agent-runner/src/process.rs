//! Agent process management

use std::collections::VecDeque;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use caro_target::WorkspaceTarget;

use crate::command::AgentInvocation;
use crate::error::{Result, RunnerError};

/// How long model detection may take before it is abandoned
const MODEL_DETECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Starts agent processes
pub struct AgentProcess;

impl AgentProcess {
    /// Spawn the agent for `invocation` inside `target`.
    ///
    /// Stdin is only captured for interactive sessions.
    pub fn spawn(
        target: &dyn WorkspaceTarget,
        invocation: &AgentInvocation,
        interactive: bool,
        stderr_tail_lines: usize,
    ) -> Result<ProcessHandle> {
        info!(
            "Spawning {} in {} (attempt {:?})",
            invocation.program,
            target.describe(),
            invocation.attempt
        );

        let mut cmd = target.agent_command(&invocation.program, &invocation.args, interactive);
        cmd.stdin(if interactive { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            RunnerError::spawn_failed_with_source(
                format!("Failed to spawn {}: {}", invocation.program, e),
                e,
            )
        })?;

        let pid = child.id();
        let stdout = child.stdout.take();
        let stdin = child.stdin.take();
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RunnerError::spawn_failed("Failed to capture stderr"))?;
        if stdout.is_none() {
            return Err(RunnerError::spawn_failed("Failed to capture stdout"));
        }

        let kill = CancellationToken::new();
        let (exit_tx, exit_rx) = oneshot::channel();

        let reaper_kill = kill.clone();
        tokio::spawn(async move {
            let exited = tokio::select! {
                status = child.wait() => Some(status),
                _ = reaper_kill.cancelled() => None,
            };

            let status = match exited {
                Some(status) => status,
                None => {
                    info!("Terminating agent process {:?}", pid);
                    if let Err(e) = child.start_kill() {
                        warn!("Failed to signal agent process {:?}: {}", pid, e);
                    }
                    child.wait().await
                }
            };

            let code = match status {
                Ok(status) => {
                    debug!("Agent process {:?} exited with {}", pid, status);
                    status.code()
                }
                Err(e) => {
                    warn!("Failed to reap agent process {:?}: {}", pid, e);
                    None
                }
            };
            let _ = exit_tx.send(code);
        });

        let stderr_task = tokio::spawn(collect_stderr(stderr, stderr_tail_lines));

        Ok(ProcessHandle {
            pid,
            stdout,
            stdin,
            kill,
            exit_rx: Some(exit_rx),
            exit_code: None,
            stderr_task: Some(stderr_task),
        })
    }
}

/// Keep the last `keep` stderr lines
async fn collect_stderr(stderr: ChildStderr, keep: usize) -> VecDeque<String> {
    let mut reader = BufReader::new(stderr);
    let mut tail = VecDeque::with_capacity(keep.min(256));
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                debug!("stderr: {}", line);
                if keep == 0 {
                    continue;
                }
                if tail.len() == keep {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Err(e) => {
                warn!("Stopped reading agent stderr: {}", e);
                break;
            }
        }
    }

    tail
}

/// Handle to a running agent process
///
/// Dropping the handle terminates the process if it is still running.
pub struct ProcessHandle {
    pid: Option<u32>,
    stdout: Option<ChildStdout>,
    stdin: Option<ChildStdin>,
    kill: CancellationToken,
    exit_rx: Option<oneshot::Receiver<Option<i32>>>,
    exit_code: Option<i32>,
    stderr_task: Option<JoinHandle<VecDeque<String>>>,
}

impl ProcessHandle {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.stdin.take()
    }

    /// Signal the process to stop; safe to call more than once
    pub fn terminate(&self) {
        self.kill.cancel();
    }

    /// Token that terminates the process when cancelled
    pub fn kill_token(&self) -> CancellationToken {
        self.kill.clone()
    }

    /// Wait for the process to exit and return its exit code
    ///
    /// `None` means the process was killed by a signal or could not be reaped.
    /// Cancel-safe; once the exit code is known it is returned again.
    pub async fn wait(&mut self) -> Option<i32> {
        let Some(rx) = self.exit_rx.as_mut() else {
            return self.exit_code;
        };
        let code = rx.await.unwrap_or(None);
        self.exit_rx = None;
        self.exit_code = code;
        code
    }

    /// Collected stderr tail, waiting at most `grace` for the stream to close
    pub async fn stderr_tail(&mut self, grace: Duration) -> Option<String> {
        let mut task = self.stderr_task.take()?;
        let lines = match tokio::time::timeout(grace, &mut task).await {
            Ok(Ok(lines)) => lines,
            Ok(Err(e)) => {
                warn!("stderr reader failed: {}", e);
                return None;
            }
            Err(_) => {
                warn!("stderr still open {:?} after agent exit; abandoning", grace);
                task.abort();
                return None;
            }
        };

        if lines.is_empty() {
            None
        } else {
            Some(lines.into_iter().collect::<Vec<_>>().join("\n"))
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.kill.cancel();
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

/// Ask the agent which model it will use
///
/// Runs `<program> exec /status` in the target and reads the `model:` line
/// from stderr. Any failure yields `None`.
pub async fn detect_agent_model(target: &dyn WorkspaceTarget, program: &str) -> Option<String> {
    let args = vec!["exec".to_string(), "/status".to_string()];
    let mut cmd = target.agent_command(program, &args, false);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(MODEL_DETECTION_TIMEOUT, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            warn!("Model detection failed to run {}: {}", program, e);
            return None;
        }
        Err(_) => {
            warn!("Model detection timed out after {:?}", MODEL_DETECTION_TIMEOUT);
            return None;
        }
    };

    let model = parse_model_line(&String::from_utf8_lossy(&output.stderr));
    match &model {
        Some(model) => info!("Agent model detected: {}", model),
        None => debug!("No model line in agent status output"),
    }
    model
}

/// Extract the value of the last `model:` line
pub fn parse_model_line(stderr: &str) -> Option<String> {
    stderr
        .lines()
        .filter_map(|line| line.trim().strip_prefix("model:"))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .last()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_model_line() {
        let stderr = "OpenAI Codex v0.46.0\n--------\nworkdir: /src/wolfssl\nmodel: gpt-5-codex\nprovider: openai\n";
        assert_eq!(parse_model_line(stderr).as_deref(), Some("gpt-5-codex"));
        assert!(parse_model_line("no model here\nmodel:   \n").is_none());
        assert!(parse_model_line("").is_none());
    }

    #[cfg(unix)]
    mod unix {
        use super::super::*;
        use crate::command::Attempt;
        use caro_target::LocalWorkspaceTarget;
        use std::path::PathBuf;
        use tempfile::TempDir;
        use tokio::io::AsyncReadExt;

        fn sh(script: &str) -> AgentInvocation {
            AgentInvocation {
                program: "sh".to_string(),
                args: vec!["-c".to_string(), script.to_string()],
                log_path: PathBuf::from("unused.log"),
                attempt: Attempt::First,
            }
        }

        #[tokio::test]
        async fn test_spawn_and_wait() {
            let temp = TempDir::new().unwrap();
            let target = LocalWorkspaceTarget::new(temp.path());
            let mut handle = AgentProcess::spawn(
                &target,
                &sh("echo out; echo err1 >&2; echo err2 >&2; exit 3"),
                false,
                1,
            )
            .unwrap();

            let mut stdout = String::new();
            handle
                .take_stdout()
                .unwrap()
                .read_to_string(&mut stdout)
                .await
                .unwrap();

            assert!(handle.take_stdin().is_none());
            assert_eq!(stdout, "out\n");
            assert_eq!(handle.wait().await, Some(3));
            assert_eq!(
                handle.stderr_tail(Duration::from_secs(5)).await.as_deref(),
                Some("err2")
            );
        }

        #[tokio::test]
        async fn test_terminate_kills_process() {
            let temp = TempDir::new().unwrap();
            let target = LocalWorkspaceTarget::new(temp.path());
            let mut handle = AgentProcess::spawn(&target, &sh("sleep 30"), true, 10).unwrap();

            assert!(handle.take_stdin().is_some());
            handle.terminate();
            let code = tokio::time::timeout(Duration::from_secs(10), handle.wait())
                .await
                .unwrap();
            assert_eq!(code, None);
        }

        #[tokio::test]
        async fn test_spawn_missing_program() {
            let temp = TempDir::new().unwrap();
            let target = LocalWorkspaceTarget::new(temp.path());
            let invocation = AgentInvocation {
                program: "/nonexistent/agent-binary".to_string(),
                args: vec!["prompt".to_string()],
                log_path: PathBuf::from("unused.log"),
                attempt: Attempt::First,
            };

            let err = AgentProcess::spawn(&target, &invocation, false, 10).err().unwrap();
            assert!(err.is_launch_failure());
        }

        #[tokio::test]
        async fn test_detect_agent_model() {
            let temp = TempDir::new().unwrap();
            let script = temp.path().join("fake-agent");
            std::fs::write(&script, "#!/bin/sh\necho 'model: gpt-5-codex' >&2\n").unwrap();
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

            let target = LocalWorkspaceTarget::new(temp.path());
            let model = detect_agent_model(&target, script.to_str().unwrap()).await;
            assert_eq!(model.as_deref(), Some("gpt-5-codex"));

            assert!(detect_agent_model(&target, "/nonexistent/agent").await.is_none());
        }
    }
}
