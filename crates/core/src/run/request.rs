//! Session requests

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::agent_type::AgentType;

/// Where the agent runs and which file tree it may modify
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetDescriptor {
    /// A directory on the host
    Local { path: PathBuf },
    /// A running container, addressed by name
    Container { name: String },
}

impl TargetDescriptor {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::Local { path: path.into() }
    }

    pub fn container(name: impl Into<String>) -> Self {
        Self::Container { name: name.into() }
    }
}

/// A request to run one agent session
///
/// Owned by the caller; the runner only borrows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRequest {
    /// Vulnerability being repaired
    pub vuln_id: String,

    /// Workspace the agent runs against
    pub target: TargetDescriptor,

    /// Prompt text handed to the agent
    pub prompt: String,

    /// Agent to launch
    #[serde(default)]
    pub agent: AgentType,

    /// Continue an earlier session instead of starting a fresh one
    #[serde(default)]
    pub resume: bool,

    /// Session to resume; `None` resumes the most recent session
    #[serde(default)]
    pub resume_session_id: Option<String>,

    /// Reference to the known-good upstream fix
    #[serde(default)]
    pub patch_url: Option<String>,
}

impl SessionRequest {
    /// Create a first-attempt request
    pub fn new(vuln_id: impl Into<String>, target: TargetDescriptor, prompt: impl Into<String>) -> Self {
        Self {
            vuln_id: vuln_id.into(),
            target,
            prompt: prompt.into(),
            agent: AgentType::default(),
            resume: false,
            resume_session_id: None,
            patch_url: None,
        }
    }

    /// Turn this into a resume request
    pub fn resuming(mut self, session_id: Option<String>) -> Self {
        self.resume = true;
        self.resume_session_id = session_id.filter(|id| !id.trim().is_empty());
        self
    }

    pub fn with_patch_url(mut self, patch_url: impl Into<String>) -> Self {
        self.patch_url = Some(patch_url.into());
        self
    }

    pub fn with_agent(mut self, agent: AgentType) -> Self {
        self.agent = agent;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_request_is_first_attempt() {
        let request = SessionRequest::new("42488087", TargetDescriptor::container("arvo-1"), "fix it");
        assert!(!request.resume);
        assert!(request.resume_session_id.is_none());
        assert_eq!(request.agent, AgentType::Codex);
    }

    #[test]
    fn test_resuming_drops_blank_session_id() {
        let request = SessionRequest::new("1", TargetDescriptor::local("/tmp/ws"), "again")
            .resuming(Some("  ".to_string()));
        assert!(request.resume);
        assert!(request.resume_session_id.is_none());

        let request = SessionRequest::new("1", TargetDescriptor::local("/tmp/ws"), "again")
            .resuming(Some("019b3597".to_string()));
        assert_eq!(request.resume_session_id.as_deref(), Some("019b3597"));
    }

    #[test]
    fn test_target_descriptor_serde() {
        let json = serde_json::to_value(TargetDescriptor::container("arvo-1")).unwrap();
        assert_eq!(json["kind"], "container");
        assert_eq!(json["name"], "arvo-1");
    }
}
