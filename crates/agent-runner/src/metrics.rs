//! Running session metrics

use caro_core::run::TokenUsage;

use crate::event::AgentEvent;

/// Metrics accumulated while interpreting one session's stream
///
/// Usage reflects the most recent turn only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionMetrics {
    pub usage: TokenUsage,
    /// Last session identifier the agent issued
    pub thread_id: Option<String>,
    pub last_agent_message: Option<String>,
    pub turns: u32,
    pub commands_completed: u32,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one classified event into the metrics
    pub fn apply(&mut self, event: &AgentEvent) {
        match event {
            AgentEvent::ThreadStarted { thread_id } => {
                self.thread_id = Some(thread_id.clone());
            }
            AgentEvent::TurnCompleted { usage } => {
                self.usage = TokenUsage::new(
                    usage.input_tokens,
                    usage.cached_input_tokens,
                    usage.output_tokens,
                );
                self.turns += 1;
            }
            AgentEvent::Message { text } => {
                self.last_agent_message = Some(text.clone());
            }
            AgentEvent::CommandCompleted { .. } => {
                self.commands_completed += 1;
            }
            AgentEvent::CommandStarted { .. }
            | AgentEvent::Reasoning { .. }
            | AgentEvent::Unrecognized { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::TurnUsage;

    fn turn(input: u64, cached: u64, output: u64) -> AgentEvent {
        AgentEvent::TurnCompleted {
            usage: TurnUsage {
                input_tokens: input,
                cached_input_tokens: cached,
                output_tokens: output,
            },
        }
    }

    #[test]
    fn test_total_excludes_cached_tokens() {
        let mut metrics = SessionMetrics::new();
        metrics.apply(&turn(100, 20, 50));

        assert_eq!(metrics.usage.total_tokens, 150);
        assert_eq!(metrics.usage.cached_input_tokens, 20);

        metrics.apply(&turn(100, 100, 0));
        assert_eq!(metrics.usage.total_tokens, 100);
    }

    #[test]
    fn test_latest_turn_replaces_previous() {
        let mut metrics = SessionMetrics::new();
        metrics.apply(&turn(100, 20, 50));
        metrics.apply(&turn(7, 0, 3));

        assert_eq!(metrics.usage, TokenUsage::new(7, 0, 3));
        assert_eq!(metrics.turns, 2);
    }

    #[test]
    fn test_thread_id_and_message_overwrite() {
        let mut metrics = SessionMetrics::new();
        assert!(metrics.thread_id.is_none());

        metrics.apply(&AgentEvent::ThreadStarted {
            thread_id: "first".to_string(),
        });
        metrics.apply(&AgentEvent::ThreadStarted {
            thread_id: "second".to_string(),
        });
        metrics.apply(&AgentEvent::Message {
            text: "Looking at crash.log".to_string(),
        });
        metrics.apply(&AgentEvent::Message {
            text: "Done".to_string(),
        });

        assert_eq!(metrics.thread_id.as_deref(), Some("second"));
        assert_eq!(metrics.last_agent_message.as_deref(), Some("Done"));
    }

    #[test]
    fn test_other_events_leave_usage_untouched() {
        let mut metrics = SessionMetrics::new();
        metrics.apply(&AgentEvent::Reasoning {
            text: "thinking".to_string(),
        });
        metrics.apply(&AgentEvent::Unrecognized {
            event_type: Some("turn.started".to_string()),
            item_type: None,
        });

        assert_eq!(metrics.usage, TokenUsage::default());
        assert_eq!(metrics.turns, 0);
    }
}
