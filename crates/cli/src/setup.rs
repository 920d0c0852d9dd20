//! Experiment setup file

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use tracing::{debug, info, warn};

use caro_core::run::{AgentType, CrashLogKind, RunStore, SessionRequest, TargetDescriptor};

use crate::prompts::{first_attempt_prompt, retry_prompt};

/// Parameters of one experiment run, read from `experiment_setup.json`
#[derive(Debug, Clone, Deserialize)]
pub struct ExperimentSetup {
    /// Vulnerability ID; accepts a number or a string
    #[serde(deserialize_with = "string_or_number")]
    pub arvo_id: String,

    /// Run inside this container
    #[serde(default)]
    pub container_name: Option<String>,

    /// Run against this host directory
    #[serde(default)]
    pub workspace: Option<PathBuf>,

    /// First attempt (`true`) or a retry of an earlier run
    #[serde(default = "default_true")]
    pub initial_prompt: bool,

    #[serde(default = "default_agent")]
    pub agent: String,

    #[serde(default)]
    pub project: Option<String>,

    #[serde(default)]
    pub crash_type: Option<String>,

    #[serde(default)]
    pub patch_url: Option<String>,

    /// Session to resume on a retry; the most recent session when absent
    #[serde(default)]
    pub resume_id: Option<String>,

    /// Earlier run this retry follows
    #[serde(default)]
    pub run_id: Option<String>,

    /// Look up the resume ID of `run_id` in the run store
    #[serde(default)]
    pub source_resume_db: bool,

    /// Use the stored post-patch crash log of `run_id`
    #[serde(default)]
    pub source_crash_db: bool,

    /// File holding the crash log produced by the earlier patch
    #[serde(default)]
    pub crash_log_patch: Option<PathBuf>,

    /// Extra guidance appended to the retry prompt
    #[serde(default)]
    pub additional_context: String,
}

fn default_true() -> bool {
    true
}

fn default_agent() -> String {
    AgentType::default().as_str().to_string()
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(text) => text,
        Id::Number(number) => number.to_string(),
    })
}

impl ExperimentSetup {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Config file not found at {}", path.display()))?;
        let setup: Self = serde_json::from_str(&content)
            .with_context(|| format!("Setup file {} is invalid", path.display()))?;
        info!("Loaded experiment setup for {} from {}", setup.arvo_id, path.display());
        Ok(setup)
    }

    /// Workspace the agent runs against; exactly one must be configured
    pub fn target(&self) -> Result<TargetDescriptor> {
        match (&self.container_name, &self.workspace) {
            (Some(name), None) => Ok(TargetDescriptor::container(name.clone())),
            (None, Some(path)) => Ok(TargetDescriptor::local(path.clone())),
            (Some(_), Some(_)) => bail!("Set either container_name or workspace, not both"),
            (None, None) => bail!("Setup needs a container_name or a workspace"),
        }
    }

    pub fn agent_type(&self) -> Result<AgentType> {
        AgentType::from_str(&self.agent).map_err(|e| anyhow!("{}", e))
    }

    /// Build the session request, consulting `store` for retries
    pub fn session_request(&self, store: &RunStore) -> Result<SessionRequest> {
        let target = self.target()?;

        let request = if self.initial_prompt {
            let (project, crash_type) = match (&self.project, &self.crash_type) {
                (Some(project), Some(crash_type)) => (project, crash_type),
                _ => bail!(
                    "Missing context for {}: project is {:?} and crash_type is {:?}",
                    self.arvo_id,
                    self.project,
                    self.crash_type
                ),
            };
            SessionRequest::new(&self.arvo_id, target, first_attempt_prompt(project, crash_type))
        } else {
            let crash_log = self.previous_crash_log(store)?;
            let prompt = retry_prompt(crash_log.as_deref(), &self.additional_context);
            SessionRequest::new(&self.arvo_id, target, prompt).resuming(self.resume_session(store)?)
        };

        let request = request.with_agent(self.agent_type()?);
        Ok(match &self.patch_url {
            Some(url) => request.with_patch_url(url.clone()),
            None => request,
        })
    }

    fn previous_crash_log(&self, store: &RunStore) -> Result<Option<String>> {
        if self.source_crash_db {
            if let Some(previous) = &self.run_id {
                let crash_log = store
                    .load_crash_log(previous, CrashLogKind::Patch)
                    .with_context(|| format!("Failed to load crash log of run {}", previous))?;
                if crash_log.is_none() {
                    warn!("Run {} has no stored patch crash log", previous);
                }
                return Ok(crash_log);
            }
        }

        let Some(path) = &self.crash_log_patch else {
            return Ok(None);
        };
        match fs::read(path) {
            Ok(bytes) => {
                debug!("Read previous crash log from {}", path.display());
                Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
            }
            Err(e) => {
                warn!("Could not read crash log {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    fn resume_session(&self, store: &RunStore) -> Result<Option<String>> {
        if self.source_resume_db {
            if let Some(previous) = &self.run_id {
                let resume_id = store
                    .resume_id(previous)
                    .with_context(|| format!("Failed to look up resume id of run {}", previous))?;
                info!("Run {} resumes session {:?}", previous, resume_id);
                return Ok(resume_id);
            }
        }
        Ok(self.resume_id.clone())
    }
}

/// Run ID for a new run: `arvo-<vuln>-vul<unix seconds>`
pub fn new_run_id(vuln_id: &str, now: DateTime<Utc>) -> String {
    format!("arvo-{}-vul{}", vuln_id, now.timestamp())
}
