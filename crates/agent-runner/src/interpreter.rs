//! Event stream interpretation

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::Result;
use crate::event::StreamEvent;
use crate::metrics::SessionMetrics;
use crate::parser::EventParser;
use crate::presenter::Presenter;
use crate::transcript::{LogType, TranscriptLog};

/// Interprets agent stdout one line at a time
pub struct Interpreter {
    parser: Box<dyn EventParser>,
    log: TranscriptLog,
    presenter: Arc<dyn Presenter>,
    metrics: SessionMetrics,
    lines: u64,
}

impl Interpreter {
    pub fn new(parser: Box<dyn EventParser>, log: TranscriptLog, presenter: Arc<dyn Presenter>) -> Self {
        Self {
            parser,
            log,
            presenter,
            metrics: SessionMetrics::new(),
            lines: 0,
        }
    }

    /// Log one line, then update metrics and narrate it
    pub fn handle_line(&mut self, line: &str) -> Result<()> {
        if line.trim().is_empty() {
            return Ok(());
        }

        let event = self.parser.parse(line);
        self.log.append(LogType::StreamOutput, event.log_payload())?;
        self.lines += 1;

        match &event {
            StreamEvent::Structured { event, .. } => {
                self.metrics.apply(event);
                self.presenter.narrate(event);
            }
            StreamEvent::Raw { text } => {
                warn!("Unparsed agent output: {}", text);
                self.presenter.warn_raw(text);
            }
        }
        Ok(())
    }

    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    pub fn into_metrics(self) -> SessionMetrics {
        self.metrics
    }

    /// Non-blank lines handled so far
    pub fn lines_handled(&self) -> u64 {
        self.lines
    }
}

/// Why the read loop stopped
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    /// The agent closed its output
    Closed,
    /// Terminated on request
    Cancelled,
    /// Terminated after the session timeout elapsed
    TimedOut(Duration),
    /// The stream could not be interpreted
    Faulted(String),
}

/// Signals that bound a read loop
#[derive(Debug, Clone)]
pub struct DriveControl {
    /// Cancelled by the caller to stop the session
    pub cancel: CancellationToken,
    /// Cancelled by the loop to terminate the agent process
    pub kill: CancellationToken,
    pub timeout: Option<Duration>,
    /// How long to keep draining output after terminating
    pub grace: Duration,
}

/// Read and interpret lines until the stream closes
///
/// Each line is fully handled before the next read. Bytes that are not valid
/// UTF-8 are decoded lossily, so such a line still reaches the transcript. After
/// the process is terminated, remaining output is drained for at most
/// `control.grace`.
pub async fn drive<R>(interp: &mut Interpreter, reader: &mut R, control: &DriveControl) -> StopReason
where
    R: AsyncBufRead + Unpin,
{
    let deadline = control.timeout.map(|timeout| Instant::now() + timeout);
    let mut stop: Option<StopReason> = None;
    let mut grace_deadline: Option<Instant> = None;
    // Partial lines survive a cancelled read in this buffer
    let mut buf = Vec::new();

    loop {
        tokio::select! {
            biased;

            _ = control.cancel.cancelled(), if stop.is_none() => {
                warn!("Session cancelled; terminating agent");
                stop = Some(StopReason::Cancelled);
                control.kill.cancel();
                grace_deadline = Some(Instant::now() + control.grace);
            }

            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if stop.is_none() && deadline.is_some() => {
                let timeout = control.timeout.unwrap_or_default();
                warn!("Session exceeded {:?}; terminating agent", timeout);
                stop = Some(StopReason::TimedOut(timeout));
                control.kill.cancel();
                grace_deadline = Some(Instant::now() + control.grace);
            }

            _ = sleep_until(grace_deadline.unwrap_or_else(Instant::now)), if grace_deadline.is_some() => {
                warn!("Agent output still open {:?} after termination", control.grace);
                break;
            }

            read = reader.read_until(b'\n', &mut buf) => match read {
                Ok(0) => {
                    debug!("Agent output closed after {} lines", interp.lines_handled());
                    break;
                }
                Ok(_) => {
                    let line = decode_line(&buf);
                    let handled = interp.handle_line(&line);
                    buf.clear();
                    if let Err(e) = handled {
                        error!("Failed to interpret agent output: {}", e);
                        control.kill.cancel();
                        return StopReason::Faulted(e.to_string());
                    }
                }
                Err(e) => {
                    error!("Failed to read agent output: {}", e);
                    control.kill.cancel();
                    return StopReason::Faulted(format!("failed to read agent output: {}", e));
                }
            }
        }
    }

    stop.unwrap_or(StopReason::Closed)
}

/// One output line without its terminator
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}
