use serde_json::Value;

use super::EventParser;
use crate::event::{AgentEvent, StreamEvent, TurnUsage};

/// Parser for `codex exec --json` output
#[derive(Debug, Default)]
pub struct CodexParser;

impl CodexParser {
    pub fn new() -> Self {
        Self
    }
}

impl EventParser for CodexParser {
    fn parse(&mut self, line: &str) -> StreamEvent {
        match serde_json::from_str::<Value>(line.trim()) {
            Ok(payload) if payload.is_object() => {
                let event = classify(&payload);
                StreamEvent::Structured { payload, event }
            }
            _ => StreamEvent::Raw {
                text: line.to_string(),
            },
        }
    }
}

fn str_field(value: &Value, name: &str) -> Option<String> {
    value.get(name).and_then(Value::as_str).map(str::to_string)
}

/// Classify a JSON event by `type` and, for item events, `item.type`
pub fn classify(payload: &Value) -> AgentEvent {
    let event_type = payload.get("type").and_then(Value::as_str);
    let item = payload.get("item");
    let item_type = item.and_then(|i| i.get("type")).and_then(Value::as_str);

    let unrecognized = || AgentEvent::Unrecognized {
        event_type: event_type.map(str::to_string),
        item_type: item_type.map(str::to_string),
    };

    match (event_type, item_type) {
        (Some("thread.started"), _) => match str_field(payload, "thread_id") {
            Some(thread_id) => AgentEvent::ThreadStarted { thread_id },
            None => unrecognized(),
        },
        (Some("item.started"), Some("command_execution")) => {
            let command = item.and_then(|i| str_field(i, "command")).unwrap_or_default();
            AgentEvent::CommandStarted { command }
        }
        (Some("item.completed"), Some("command_execution")) => {
            let item = item.unwrap_or(&Value::Null);
            AgentEvent::CommandCompleted {
                command: str_field(item, "command"),
                output: str_field(item, "aggregated_output").unwrap_or_default(),
                exit_code: item
                    .get("exit_code")
                    .and_then(Value::as_i64)
                    .and_then(|code| i32::try_from(code).ok()),
            }
        }
        (Some("item.completed"), Some("reasoning")) => AgentEvent::Reasoning {
            text: item.and_then(|i| str_field(i, "text")).unwrap_or_default(),
        },
        (Some("item.completed"), Some("agent_message")) => AgentEvent::Message {
            text: item.and_then(|i| str_field(i, "text")).unwrap_or_default(),
        },
        (Some("turn.completed"), _) => AgentEvent::TurnCompleted {
            usage: TurnUsage::from_value(payload.get("usage")),
        },
        _ => unrecognized(),
    }
}
