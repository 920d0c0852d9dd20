//! Session lifecycle

use std::time::Instant;

use serde_json::json;
use tracing::{debug, error};

use crate::error::{Result, RunnerError};
use crate::transcript::{LogType, TranscriptLog};

/// Phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Invocation built, process not started
    Built,
    /// Process spawned
    Launched,
    /// Reading the output stream
    Streaming,
    /// Output stream closed
    Completed,
    /// Output stream could not be interpreted to the end
    Faulted,
    /// Record assembled
    Finalized,
}

impl SessionPhase {
    /// Whether `to` may follow `self`
    pub fn can_advance_to(self, to: SessionPhase) -> bool {
        use SessionPhase::*;
        matches!(
            (self, to),
            (Built, Launched)
                | (Launched, Streaming)
                | (Streaming, Completed)
                | (Streaming, Faulted)
                | (Completed, Finalized)
                | (Faulted, Finalized)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == SessionPhase::Finalized
    }
}

/// Tracks a session through its phases
#[derive(Debug)]
pub struct SessionLifecycle {
    run_id: String,
    phase: SessionPhase,
}

impl SessionLifecycle {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            phase: SessionPhase::Built,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn advance(&mut self, to: SessionPhase) -> Result<()> {
        if !self.phase.can_advance_to(to) {
            return Err(RunnerError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        debug!("Session {}: {:?} -> {:?}", self.run_id, self.phase, to);
        self.phase = to;
        Ok(())
    }
}

/// Closes the transcript if the session is abandoned before finalization
///
/// Normal finalization writes `session_end` itself; the guard only acts when
/// the session future is dropped or unwinds first.
pub struct FinalizeGuard {
    log: TranscriptLog,
    started: Instant,
}

impl FinalizeGuard {
    pub fn new(log: TranscriptLog, started: Instant) -> Self {
        Self { log, started }
    }
}

impl Drop for FinalizeGuard {
    fn drop(&mut self) {
        if self.log.is_closed() {
            return;
        }

        let message = "session abandoned before finalization";
        error!("{} ({})", message, self.log.path().display());
        let _ = self
            .log
            .append(LogType::ExecutionError, json!({ "error": message }));
        let _ = self.log.finish(json!({
            "duration_seconds": self.started.elapsed().as_secs_f64(),
            "return_code": null,
            "modified_files": [],
        }));
    }
}
