//! Session runner - drives one agent session from launch to run record

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::ChildStdin;
use tokio::time::sleep_until;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use caro_core::run::{validate_run_id, RunRecord, RunSink, SessionOutcome, SessionRequest};
use caro_target::WorkspaceTarget;

use crate::assembler::{assemble, RecordParts};
use crate::command::{AgentInvocation, CommandBuilder};
use crate::config::RunnerConfig;
use crate::detector::detect_modified_files;
use crate::error::{Result, RunnerError};
use crate::interpreter::{drive, DriveControl, Interpreter, StopReason};
use crate::metrics::SessionMetrics;
use crate::parser::create_parser;
use crate::presenter::{ConsolePresenter, Presenter, QuietPresenter};
use crate::process::{detect_agent_model, AgentProcess, ProcessHandle};
use crate::session::{FinalizeGuard, SessionLifecycle, SessionPhase};
use crate::transcript::{LogType, TranscriptLog};

/// Interactive command that ends the session
pub const QUIT_COMMAND: &str = "/quit";

/// A launched session waiting to be streamed and finalized
struct ActiveSession<'a> {
    run_id: &'a str,
    request: &'a SessionRequest,
    invocation: AgentInvocation,
    agent_model: Option<String>,
    workspace: PathBuf,
    log: TranscriptLog,
    lifecycle: SessionLifecycle,
    process: ProcessHandle,
    started_at: DateTime<Utc>,
    started: Instant,
    _guard: FinalizeGuard,
}

/// Runs agent sessions against one workspace target
pub struct SessionRunner {
    config: RunnerConfig,
    target: Arc<dyn WorkspaceTarget>,
    sink: Option<Arc<dyn RunSink>>,
    presenter: Arc<dyn Presenter>,
}

impl SessionRunner {
    pub fn new(config: RunnerConfig, target: Arc<dyn WorkspaceTarget>) -> Self {
        let presenter: Arc<dyn Presenter> = if config.console {
            Arc::new(ConsolePresenter)
        } else {
            Arc::new(QuietPresenter)
        };

        Self {
            config,
            target,
            sink: None,
            presenter,
        }
    }

    /// Persist every finished record to `sink`
    pub fn with_sink(mut self, sink: Arc<dyn RunSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_presenter(mut self, presenter: Arc<dyn Presenter>) -> Self {
        self.presenter = presenter;
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn target(&self) -> &Arc<dyn WorkspaceTarget> {
        &self.target
    }

    /// Run a batch session to completion
    pub async fn run(&self, run_id: &str, request: &SessionRequest) -> Result<RunRecord> {
        self.run_with_cancel(run_id, request, CancellationToken::new())
            .await
    }

    /// Run a batch session; cancelling `cancel` terminates the agent
    pub async fn run_with_cancel(
        &self,
        run_id: &str,
        request: &SessionRequest,
        cancel: CancellationToken,
    ) -> Result<RunRecord> {
        let mut session = self.launch(run_id, request, false).await?;
        let stdout = session
            .process
            .take_stdout()
            .ok_or_else(|| RunnerError::spawn_failed("Agent stdout was not captured"))?;

        let control = self.drive_control(cancel.clone(), &session.process);
        let mut interp = self.interpreter(request, &session.log);
        let mut reader = BufReader::new(stdout);

        let stop = drive(&mut interp, &mut reader, &control).await;
        drop(reader);

        self.finalize(session, interp.into_metrics(), stop, &cancel)
            .await
    }

    /// Run a session that forwards `input` lines to the agent
    ///
    /// A background task reads and interprets agent output while this task
    /// forwards input. `/quit` ends the session; blank lines are ignored. If
    /// the agent stops accepting input the session continues read-only.
    pub async fn run_interactive<I>(
        &self,
        run_id: &str,
        request: &SessionRequest,
        input: I,
        cancel: CancellationToken,
    ) -> Result<RunRecord>
    where
        I: AsyncBufRead + Unpin,
    {
        let mut session = self.launch(run_id, request, true).await?;
        let stdout = session
            .process
            .take_stdout()
            .ok_or_else(|| RunnerError::spawn_failed("Agent stdout was not captured"))?;
        let mut stdin = session.process.take_stdin();

        // `/quit` cancels only this session's child token
        let control = self.drive_control(cancel.child_token(), &session.process);
        let mut interp = self.interpreter(request, &session.log);
        let reader_control = control.clone();
        let mut reader = tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let stop = drive(&mut interp, &mut reader, &reader_control).await;
            (interp.into_metrics(), stop)
        });

        let mut input_lines = input.lines();
        let mut input_open = true;
        let mut quit = false;

        let joined = loop {
            tokio::select! {
                joined = &mut reader => break joined,

                line = input_lines.next_line(), if input_open => match line {
                    Ok(Some(line)) => {
                        let text = line.trim();
                        if text.is_empty() {
                            continue;
                        }
                        if text == QUIT_COMMAND {
                            info!("Quit requested; ending session {}", run_id);
                            quit = true;
                            input_open = false;
                            control.cancel.cancel();
                            continue;
                        }

                        if let Err(e) = session.log.append(LogType::UserInput, json!({ "input": text })) {
                            warn!("Failed to log user input: {}", e);
                        }
                        match stdin.as_mut() {
                            Some(pipe) => {
                                if let Err(e) = send_input(pipe, text).await {
                                    warn!("{}; continuing read-only", e);
                                    stdin = None;
                                }
                            }
                            None => warn!("Agent is not accepting input; dropped: {}", text),
                        }
                    }
                    Ok(None) => {
                        debug!("Input closed; closing agent stdin");
                        input_open = false;
                        stdin = None;
                    }
                    Err(e) => {
                        warn!("Failed to read input: {}", e);
                        input_open = false;
                        stdin = None;
                    }
                },
            }
        };
        drop(stdin);

        let (metrics, stop) = match joined {
            Ok((metrics, stop)) => (metrics, stop),
            Err(e) => {
                error!("Output reader task failed: {}", e);
                session.process.terminate();
                (
                    SessionMetrics::default(),
                    StopReason::Faulted(format!("output reader task failed: {}", e)),
                )
            }
        };

        // A user quit ends the session normally
        let stop = match stop {
            StopReason::Cancelled if quit && !cancel.is_cancelled() => StopReason::Closed,
            other => other,
        };

        self.finalize(session, metrics, stop, &cancel).await
    }

    fn drive_control(&self, cancel: CancellationToken, process: &ProcessHandle) -> DriveControl {
        DriveControl {
            cancel,
            kill: process.kill_token(),
            timeout: self.config.session_timeout,
            grace: self.config.termination_grace,
        }
    }

    fn interpreter(&self, request: &SessionRequest, log: &TranscriptLog) -> Interpreter {
        Interpreter::new(create_parser(request.agent), log.clone(), self.presenter.clone())
    }

    fn program(&self, request: &SessionRequest) -> String {
        self.config
            .agent_program
            .clone()
            .unwrap_or_else(|| request.agent.program().to_string())
    }

    /// Build the invocation, open the transcript and spawn the agent
    async fn launch<'a>(
        &self,
        run_id: &'a str,
        request: &'a SessionRequest,
        interactive: bool,
    ) -> Result<ActiveSession<'a>> {
        validate_run_id(run_id).map_err(|_| RunnerError::InvalidRunId(run_id.to_string()))?;
        if let Some(sink) = &self.sink {
            if sink.contains(run_id)? {
                return Err(RunnerError::DuplicateRun(run_id.to_string()));
            }
        }

        let mut lifecycle = SessionLifecycle::new(run_id);
        let program = self.program(request);
        let runs_dir = self.config.runs_dir();

        let workspace = self.target.working_dir().await?;
        let invocation = CommandBuilder::new(&program, &runs_dir)
            .full_auto(self.config.full_auto)
            .workdir(self.target.host_workdir())
            .build(request, run_id);

        let agent_model = if self.config.detect_model {
            detect_agent_model(self.target.as_ref(), &program).await
        } else {
            None
        };

        let log = TranscriptLog::create(&invocation.log_path)?;
        let started_at = Utc::now();
        let started = Instant::now();

        log.append(
            LogType::SessionStart,
            json!({
                "run_id": run_id,
                "command": invocation.redacted_command(),
                "workspace": workspace.to_string_lossy(),
                "prompt": request.prompt,
                "vuln_id": request.vuln_id,
                "patch_url": request.patch_url,
                "resume_flag": request.resume,
                "resume_session_id": request.resume_session_id,
                "agent": request.agent.as_str(),
                "agent_model": agent_model,
                "interactive": interactive,
            }),
        )?;
        let guard = FinalizeGuard::new(log.clone(), started);

        let process = match AgentProcess::spawn(
            self.target.as_ref(),
            &invocation,
            interactive,
            self.config.stderr_tail_lines,
        ) {
            Ok(process) => process,
            Err(e) => {
                error!("Run {} failed to launch: {}", run_id, e);
                write_or_warn(&log, LogType::ExecutionError, json!({ "error": e.to_string() }));
                if let Err(e) = log.finish(end_data(started.elapsed(), None, &[], None)) {
                    warn!("Failed to close session log: {}", e);
                }
                return Err(e);
            }
        };

        lifecycle.advance(SessionPhase::Launched)?;
        lifecycle.advance(SessionPhase::Streaming)?;
        info!(
            "Run {} started (pid {:?}, log {})",
            run_id,
            process.pid(),
            invocation.log_path.display()
        );

        Ok(ActiveSession {
            run_id,
            request,
            invocation,
            agent_model,
            workspace,
            log,
            lifecycle,
            process,
            started_at,
            started,
            _guard: guard,
        })
    }

    /// Reap the agent, detect changes, close the transcript and build the record
    async fn finalize(
        &self,
        mut session: ActiveSession<'_>,
        metrics: SessionMetrics,
        mut stop: StopReason,
        cancel: &CancellationToken,
    ) -> Result<RunRecord> {
        let next = match stop {
            StopReason::Faulted(_) => SessionPhase::Faulted,
            _ => SessionPhase::Completed,
        };
        advance_or_warn(&mut session.lifecycle, next);

        // The session timeout also bounds an agent that closed its output early
        let timeout_at = self
            .config
            .session_timeout
            .map(|timeout| (timeout, tokio::time::Instant::from_std(session.started + timeout)));
        let exited = tokio::select! {
            code = session.process.wait() => Ok(code),
            _ = cancel.cancelled() => Err(StopReason::Cancelled),
            _ = sleep_until(timeout_at.map(|(_, at)| at).unwrap_or_else(tokio::time::Instant::now)), if timeout_at.is_some() => {
                Err(StopReason::TimedOut(timeout_at.map(|(timeout, _)| timeout).unwrap_or_default()))
            }
        };
        let return_code = match exited {
            Ok(code) => code,
            Err(reason) => {
                if stop == StopReason::Closed {
                    warn!("Agent still running after its output closed; terminating ({:?})", reason);
                    stop = reason;
                }
                session.process.terminate();
                session.process.wait().await
            }
        };
        let duration = session.started.elapsed();
        let stderr_tail = session
            .process
            .stderr_tail(self.config.termination_grace)
            .await;

        let (outcome, execution_error) = match &stop {
            StopReason::Closed => (SessionOutcome::Completed, None),
            StopReason::Cancelled => (SessionOutcome::Cancelled, Some("session cancelled".to_string())),
            StopReason::TimedOut(timeout) => (
                SessionOutcome::TimedOut,
                Some(format!("session timed out after {} seconds", timeout.as_secs())),
            ),
            StopReason::Faulted(message) => (SessionOutcome::Faulted, Some(message.clone())),
        };

        let modified_files = detect_modified_files(
            self.target.as_ref(),
            &session.workspace,
            session.started_at,
            self.config.modified_files_max,
        )
        .await;
        let paths: Vec<&str> = modified_files.iter().map(|f| f.path.as_str()).collect();

        if let Some(tail) = &stderr_tail {
            write_or_warn(&session.log, LogType::StderrOutput, json!({ "stderr": tail }));
        }
        if let Some(message) = &execution_error {
            write_or_warn(&session.log, LogType::ExecutionError, json!({ "error": message }));
        }
        if let Err(e) = session
            .log
            .finish(end_data(duration, return_code, &paths, Some(outcome)))
        {
            warn!("Failed to write session end for {}: {}", session.run_id, e);
        }
        advance_or_warn(&mut session.lifecycle, SessionPhase::Finalized);

        let agent_log = session.log.read_back().unwrap_or_else(|e| {
            warn!("Failed to read back session log: {}", e);
            String::new()
        });

        let record = assemble(RecordParts {
            run_id: session.run_id,
            request: session.request,
            agent_model: session.agent_model.clone(),
            workspace: &session.workspace,
            started_at: session.started_at,
            duration,
            return_code,
            outcome,
            metrics,
            modified_files,
            stderr_tail,
            execution_error,
            log_path: session.invocation.log_path.clone(),
            agent_log,
        });

        info!(
            "Run {} {} (exit {:?}, {} tokens, {} modified files, {:.1}s)",
            record.run_id,
            record.outcome.as_str(),
            record.return_code,
            record.usage.total_tokens,
            record.modified_files.len(),
            record.duration_secs
        );

        if let Some(sink) = &self.sink {
            if let Err(source) = sink.record_run(&record) {
                error!("Failed to persist run {}: {}", record.run_id, source);
                return Err(RunnerError::Persist {
                    record: Box::new(record),
                    source,
                });
            }
        }

        Ok(record)
    }
}

fn end_data(
    duration: Duration,
    return_code: Option<i32>,
    modified_files: &[&str],
    outcome: Option<SessionOutcome>,
) -> Value {
    json!({
        "duration_seconds": duration.as_secs_f64(),
        "return_code": return_code,
        "modified_files": modified_files,
        "outcome": outcome.map(|o| o.as_str()),
    })
}

fn write_or_warn(log: &TranscriptLog, log_type: LogType, data: Value) {
    if let Err(e) = log.append(log_type, data) {
        warn!("Failed to write {:?} record: {}", log_type, e);
    }
}

fn advance_or_warn(lifecycle: &mut SessionLifecycle, to: SessionPhase) {
    if let Err(e) = lifecycle.advance(to) {
        warn!("{}", e);
    }
}

/// Write one line to the agent's stdin
async fn send_input(stdin: &mut ChildStdin, text: &str) -> Result<()> {
    let written = async {
        stdin.write_all(text.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await
    };

    written.await.map_err(|e| match e.kind() {
        ErrorKind::BrokenPipe => RunnerError::PipeClosed,
        _ => RunnerError::Io(e),
    })
}
