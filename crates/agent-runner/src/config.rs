//! Runner configuration

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

/// Files beyond this many matches are assumed to be incidental
pub const MODIFIED_FILES_MAX: usize = 10;

/// Configuration for the session runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Base data directory; transcripts go under `<data_dir>/runs/<run_id>/`
    pub data_dir: PathBuf,
    /// Agent executable, overriding the agent type's default
    pub agent_program: Option<String>,
    /// Pass `--full-auto` to the agent
    pub full_auto: bool,
    /// Keep at most this many modified files (most recent)
    pub modified_files_max: usize,
    /// Number of trailing stderr lines kept for the record
    pub stderr_tail_lines: usize,
    /// Terminate the agent after this long; `None` waits indefinitely
    pub session_timeout: Option<Duration>,
    /// How long to wait for the output stream to close after terminating
    pub termination_grace: Duration,
    /// Query the agent for its model before launching
    pub detect_model: bool,
    /// Narrate agent events on stdout
    pub console: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".caro-data"),
            agent_program: None,
            full_auto: true,
            modified_files_max: MODIFIED_FILES_MAX,
            stderr_tail_lines: 50,
            session_timeout: None,
            termination_grace: Duration::from_secs(5),
            detect_model: true,
            console: true,
        }
    }
}

impl RunnerConfig {
    /// Build a configuration from `CARO_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(dir) = lookup("CARO_DATA_DIR").filter(|v| !v.trim().is_empty()) {
            config.data_dir = PathBuf::from(dir);
        }

        if let Some(program) = lookup("CARO_AGENT_PROGRAM").filter(|v| !v.trim().is_empty()) {
            config.agent_program = Some(program);
        }

        if let Some(raw) = lookup("CARO_SESSION_TIMEOUT_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(0) => config.session_timeout = None,
                Ok(secs) => config.session_timeout = Some(Duration::from_secs(secs)),
                Err(_) => warn!("Ignoring invalid CARO_SESSION_TIMEOUT_SECS: {}", raw),
            }
        }

        config
    }

    /// Directory holding per-run directories
    pub fn runs_dir(&self) -> PathBuf {
        self.data_dir.join("runs")
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn with_agent_program(mut self, program: impl Into<String>) -> Self {
        self.agent_program = Some(program.into());
        self
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_runner_config_default() {
        let config = RunnerConfig::default();
        assert_eq!(config.modified_files_max, 10);
        assert!(config.session_timeout.is_none());
        assert!(config.full_auto);
        assert_eq!(config.runs_dir(), PathBuf::from(".caro-data/runs"));
    }

    #[test]
    fn test_from_env_overrides() {
        let config = RunnerConfig::from_lookup(lookup_from(&[
            ("CARO_DATA_DIR", "/var/caro"),
            ("CARO_AGENT_PROGRAM", "/opt/bin/codex"),
            ("CARO_SESSION_TIMEOUT_SECS", "900"),
        ]));

        assert_eq!(config.data_dir, PathBuf::from("/var/caro"));
        assert_eq!(config.agent_program.as_deref(), Some("/opt/bin/codex"));
        assert_eq!(config.session_timeout, Some(Duration::from_secs(900)));
    }

    #[test]
    fn test_from_env_ignores_bad_timeout() {
        let config = RunnerConfig::from_lookup(lookup_from(&[("CARO_SESSION_TIMEOUT_SECS", "soon")]));
        assert!(config.session_timeout.is_none());

        let config = RunnerConfig::from_lookup(lookup_from(&[("CARO_SESSION_TIMEOUT_SECS", "0")]));
        assert!(config.session_timeout.is_none());
    }
}
