//! Output parsers for different agent types

use caro_core::run::AgentType;

use crate::event::StreamEvent;

pub mod codex;

/// Trait for parsing agent output
pub trait EventParser: Send + Sync {
    /// Parse one stdout line.
    ///
    /// Lines that are not JSON objects come back as `StreamEvent::Raw`.
    fn parse(&mut self, line: &str) -> StreamEvent;
}

/// Create a parser for the given agent type
pub fn create_parser(agent_type: AgentType) -> Box<dyn EventParser> {
    match agent_type {
        AgentType::Codex => Box::new(codex::CodexParser::new()),
    }
}
