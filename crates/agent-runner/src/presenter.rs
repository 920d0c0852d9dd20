//! Console narration of agent activity

use crate::event::AgentEvent;

/// Command output longer than this is cut in narration
pub const OUTPUT_PREVIEW_CHARS: usize = 500;

/// Receives classified events for display
pub trait Presenter: Send + Sync {
    fn narrate(&self, event: &AgentEvent);

    /// Called for lines that could not be parsed
    fn warn_raw(&self, line: &str);
}

/// Prints agent activity to stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsolePresenter;

impl Presenter for ConsolePresenter {
    fn narrate(&self, event: &AgentEvent) {
        if let Some(text) = render(event) {
            println!("{}", text);
        }
    }

    fn warn_raw(&self, line: &str) {
        println!("[warning] unparsed agent output: {}", line);
    }
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct QuietPresenter;

impl Presenter for QuietPresenter {
    fn narrate(&self, _event: &AgentEvent) {}

    fn warn_raw(&self, _line: &str) {}
}

/// Console text for an event, if it is narrated at all
pub fn render(event: &AgentEvent) -> Option<String> {
    match event {
        AgentEvent::ThreadStarted { thread_id } => Some(format!("[session] {}", thread_id)),
        AgentEvent::CommandStarted { command } => Some(format!("[agent_executing] {}", command)),
        AgentEvent::CommandCompleted {
            output, exit_code, ..
        } => {
            let code = exit_code.map_or_else(|| "?".to_string(), |c| c.to_string());
            Some(format!(
                "[agent_output] (exit {})\n{}",
                code,
                truncate_chars(output, OUTPUT_PREVIEW_CHARS)
            ))
        }
        AgentEvent::Reasoning { text } => Some(format!("[agent_reasoning] {}", strip_markup(text))),
        AgentEvent::Message { text } => Some(format!("[agent_message] {}", text)),
        AgentEvent::TurnCompleted { usage } => Some(format!(
            "[turn_completed] input={} cached={} output={}",
            usage.input_tokens, usage.cached_input_tokens, usage.output_tokens
        )),
        AgentEvent::Unrecognized { .. } => None,
    }
}

/// Cut `text` to at most `max` characters, marking the cut
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn strip_markup(text: &str) -> String {
    text.replace("**", "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::TurnUsage;

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 500), "short");

        let long = "x".repeat(600);
        let cut = truncate_chars(&long, 500);
        assert_eq!(cut.len(), 503);
        assert!(cut.ends_with("..."));

        // Multi-byte characters are never split
        let wide = "é".repeat(10);
        assert_eq!(truncate_chars(&wide, 4), "éééé...");
    }

    #[test]
    fn test_render_reasoning_strips_bold() {
        let text = render(&AgentEvent::Reasoning {
            text: "**Reading** the crash log".to_string(),
        })
        .unwrap();
        assert_eq!(text, "[agent_reasoning] Reading the crash log");
    }

    #[test]
    fn test_render_command_output() {
        let text = render(&AgentEvent::CommandCompleted {
            command: Some("ls".to_string()),
            output: "a".repeat(501),
            exit_code: Some(2),
        })
        .unwrap();
        assert!(text.starts_with("[agent_output] (exit 2)\n"));
        assert!(text.ends_with("..."));
    }

    #[test]
    fn test_render_skips_unrecognized() {
        assert!(render(&AgentEvent::Unrecognized {
            event_type: Some("turn.started".to_string()),
            item_type: None,
        })
        .is_none());
        assert!(render(&AgentEvent::TurnCompleted {
            usage: TurnUsage::default()
        })
        .is_some());
    }
}
