use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Supported agent types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    #[default]
    Codex,
}

impl AgentType {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "codex" | "codex-cli" => Ok(Self::Codex),
            _ => Err(Error::InvalidInput(format!("Invalid agent type: {}", s))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Codex => "codex",
        }
    }

    /// Executable launched for this agent unless overridden by configuration
    pub fn program(&self) -> &'static str {
        match self {
            Self::Codex => "codex",
        }
    }
}
