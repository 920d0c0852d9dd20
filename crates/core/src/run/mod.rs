pub mod agent_type;
mod persistence;
mod request;
mod run_model;

pub use agent_type::AgentType;
pub use persistence::{validate_run_id, CrashLogKind, RunSink, RunStore};
pub use request::{SessionRequest, TargetDescriptor};
pub use run_model::{ModifiedFileRecord, RunRecord, RunSummary, SessionOutcome, TokenUsage};
