//! Agent command construction

use std::path::{Path, PathBuf};

use caro_core::run::SessionRequest;

/// Whether a session starts fresh or continues an earlier one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    First,
    Resume,
}

/// A fully built agent invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentInvocation {
    /// Executable to run inside the target
    pub program: String,
    /// Arguments; the prompt is always last
    pub args: Vec<String>,
    /// Transcript location for this run
    pub log_path: PathBuf,
    pub attempt: Attempt,
}

impl AgentInvocation {
    /// Program and arguments with the prompt removed, safe to persist
    pub fn redacted_command(&self) -> Vec<String> {
        let keep = self.args.len().saturating_sub(1);
        std::iter::once(self.program.clone())
            .chain(self.args[..keep].iter().cloned())
            .collect()
    }

    pub fn prompt(&self) -> &str {
        self.args.last().map(String::as_str).unwrap_or_default()
    }
}

/// Builds agent invocations for fresh and resumed sessions
#[derive(Debug, Clone)]
pub struct CommandBuilder<'a> {
    program: &'a str,
    runs_dir: &'a Path,
    full_auto: bool,
    workdir: Option<&'a Path>,
}

impl<'a> CommandBuilder<'a> {
    pub fn new(program: &'a str, runs_dir: &'a Path) -> Self {
        Self {
            program,
            runs_dir,
            full_auto: true,
            workdir: None,
        }
    }

    pub fn full_auto(mut self, full_auto: bool) -> Self {
        self.full_auto = full_auto;
        self
    }

    /// Point the agent at a host directory (`--cd`)
    pub fn workdir(mut self, workdir: Option<&'a Path>) -> Self {
        self.workdir = workdir;
        self
    }

    /// Build the invocation for `request`, logging under `run_id`
    pub fn build(&self, request: &SessionRequest, run_id: &str) -> AgentInvocation {
        let mut args = vec!["exec".to_string(), "--json".to_string()];
        if self.full_auto {
            args.push("--full-auto".to_string());
        }
        if let Some(dir) = self.workdir {
            args.push("--cd".to_string());
            args.push(dir.to_string_lossy().into_owned());
        }

        let attempt = if request.resume {
            args.push("resume".to_string());
            match request.resume_session_id.as_deref() {
                Some(id) => args.push(id.to_string()),
                None => args.push("--last".to_string()),
            }
            Attempt::Resume
        } else {
            Attempt::First
        };

        args.push(request.prompt.clone());

        AgentInvocation {
            program: self.program.to_string(),
            args,
            log_path: log_path(self.runs_dir, run_id, attempt),
            attempt,
        }
    }
}

/// Transcript path for a run; resumed sessions never overwrite the first attempt's log
pub fn log_path(runs_dir: &Path, run_id: &str, attempt: Attempt) -> PathBuf {
    let file_name = match attempt {
        Attempt::First => format!("agent_{}.log", run_id),
        Attempt::Resume => format!("agent_{}_patch2.log", run_id),
    };
    runs_dir.join(run_id).join(file_name)
}
