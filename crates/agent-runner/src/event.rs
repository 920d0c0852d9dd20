//! Event types for the agent output stream

use serde_json::{json, Value};

/// Token counts reported at the end of a turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnUsage {
    pub input_tokens: u64,
    pub cached_input_tokens: u64,
    pub output_tokens: u64,
}

impl TurnUsage {
    /// Read usage counters, treating missing or non-numeric fields as zero
    pub fn from_value(usage: Option<&Value>) -> Self {
        let field = |name: &str| {
            usage
                .and_then(|u| u.get(name))
                .and_then(Value::as_u64)
                .unwrap_or(0)
        };

        Self {
            input_tokens: field("input_tokens"),
            cached_input_tokens: field("cached_input_tokens"),
            output_tokens: field("output_tokens"),
        }
    }
}

/// Classified agent event
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// Agent issued a session identifier
    ThreadStarted { thread_id: String },

    /// Agent started a shell command
    CommandStarted { command: String },

    /// Agent shell command finished
    CommandCompleted {
        command: Option<String>,
        output: String,
        exit_code: Option<i32>,
    },

    /// Agent reasoning text
    Reasoning { text: String },

    /// User-facing message from the agent
    Message { text: String },

    /// Token accounting for the turn that just ended
    TurnCompleted { usage: TurnUsage },

    /// Well-formed event outside the recognized vocabulary
    Unrecognized {
        event_type: Option<String>,
        item_type: Option<String>,
    },
}

/// One line of agent stdout
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A JSON object, kept verbatim alongside its classification
    Structured { payload: Value, event: AgentEvent },
    /// A line that is not a JSON object
    Raw { text: String },
}

impl StreamEvent {
    /// Payload written to the session log
    pub fn log_payload(&self) -> Value {
        match self {
            Self::Structured { payload, .. } => payload.clone(),
            Self::Raw { text } => json!({ "raw_text": text }),
        }
    }

    pub fn agent_event(&self) -> Option<&AgentEvent> {
        match self {
            Self::Structured { event, .. } => Some(event),
            Self::Raw { .. } => None,
        }
    }
}
