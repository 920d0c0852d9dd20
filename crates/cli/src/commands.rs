//! Subcommand implementations

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use agent_runner::{load_records, RunnerConfig, RunnerError, SessionRunner};
use caro_core::run::{RunRecord, RunStore, RunSummary};

use crate::artifacts::{archive_artifacts, ArchiveSummary};
use crate::cli::SessionArgs;
use crate::setup::{new_run_id, ExperimentSetup};

/// Run one session described by `args.setup`, then archive its artifacts
pub async fn run_session(
    mut config: RunnerConfig,
    args: &SessionArgs,
    interactive: bool,
) -> Result<RunRecord> {
    let setup = ExperimentSetup::load(&args.setup)?;
    let store = Arc::new(RunStore::new(&config.data_dir));
    let request = setup.session_request(&store)?;

    let run_id = match &args.run_id {
        Some(run_id) => run_id.clone(),
        None => new_run_id(&setup.arvo_id, Utc::now()),
    };
    if args.no_model_detection {
        config.detect_model = false;
    }

    let target = caro_target::from_descriptor(&request.target);
    info!("Starting run {} against {}", run_id, target.describe());
    let runner = SessionRunner::new(config, target.clone()).with_sink(store.clone());

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let result = if interactive {
        let input = BufReader::new(tokio::io::stdin());
        runner
            .run_interactive(&run_id, &request, input, cancel)
            .await
    } else {
        runner.run_with_cancel(&run_id, &request, cancel).await
    };
    interrupt.abort();

    let record = match result {
        Ok(record) => record,
        Err(e) => {
            if let RunnerError::Persist { record, .. } = &e {
                error!(
                    "Run {} finished ({}) but was not recorded; transcript kept at {}",
                    record.run_id,
                    record.outcome.as_str(),
                    record.log_path.display()
                );
            }
            return Err(e).with_context(|| format!("Run {} failed", run_id));
        }
    };

    let archived = archive_artifacts(target.as_ref(), &store, &record).await;
    println!("{}", render_record_summary(&record, &archived));
    Ok(record)
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            warn!("Interrupted; terminating the agent");
            cancel.cancel();
        }
        Err(e) => warn!("Failed to listen for ctrl-c: {}", e),
    }
}

/// Human-readable report printed after a run
pub fn render_record_summary(record: &RunRecord, archived: &ArchiveSummary) -> String {
    let mut lines = vec![
        format!("Run:            {}", record.run_id),
        format!("Outcome:        {}", record.outcome.as_str()),
        format!(
            "Return code:    {}",
            record
                .return_code
                .map(|code| code.to_string())
                .unwrap_or_else(|| "none".to_string())
        ),
        format!("Duration:       {:.1}s", record.duration_secs),
        format!(
            "Tokens:         {} ({} input, {} cached, {} output)",
            record.usage.total_tokens,
            record.usage.input_tokens,
            record.usage.cached_input_tokens,
            record.usage.output_tokens
        ),
        format!("Resume ID:      {}", record.resume_id.as_deref().unwrap_or("none")),
        format!("Modified files: {}", record.modified_files.join(", ")),
        format!("Transcript:     {}", record.log_path.display()),
    ];

    if let Some(error) = &record.execution_error {
        lines.push(format!("Error:          {}", error));
    }
    if archived.failures > 0 {
        lines.push(format!("Archive:        {} artifact(s) not saved", archived.failures));
    }

    lines.join("\n")
}

/// A recorded run as pretty JSON, or its transcript
pub fn show_run(data_dir: &Path, run_id: &str, transcript: bool) -> Result<String> {
    let store = RunStore::new(data_dir);
    let record = store
        .load_run(run_id)
        .with_context(|| format!("Failed to load run {}", run_id))?;

    if !transcript {
        return Ok(serde_json::to_string_pretty(&record)?);
    }

    let records = load_records(&record.log_path)
        .with_context(|| format!("Failed to read transcript {}", record.log_path.display()))?;
    let lines = records
        .iter()
        .map(serde_json::to_string)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(lines.join("\n"))
}

/// Table of recorded runs, newest first
pub fn list_runs(data_dir: &Path, limit: usize) -> Result<String> {
    let store = RunStore::new(data_dir);
    let runs = store.list_runs().context("Failed to list runs")?;
    if runs.is_empty() {
        return Ok(format!("No runs under {}", store.runs_dir().display()));
    }

    Ok(runs
        .iter()
        .take(limit)
        .map(render_summary_line)
        .collect::<Vec<_>>()
        .join("\n"))
}

fn render_summary_line(run: &RunSummary) -> String {
    format!(
        "{}  {}  {:<9}  rc={:<4}  {:>7} tokens  {} file(s)  {}",
        run.started_at.format("%Y-%m-%d %H:%M:%S"),
        run.run_id,
        run.outcome.as_str(),
        run.return_code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "-".to_string()),
        run.total_tokens,
        run.modified_file_count,
        run.prompt_preview
    )
}
