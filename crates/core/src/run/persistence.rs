//! Run persistence - Store run records and their artifacts on disk
//!
//! Directory structure:
//! ```text
//! <data_dir>/
//!   runs/
//!     {run_id}/
//!       run.json                  # RunRecord, written once
//!       agent_{run_id}.log        # Session transcript (written by the runner)
//!       crash_original.log        # Crash output before patching
//!       crash_patch.log           # Crash output after re-running the PoC
//!       patches/
//!         {flattened_path}-patch1 # Patched file contents
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::run_model::{RunRecord, RunSummary};
use crate::{Error, Result};

/// Destination for finished run records
///
/// Implementations must reject a record whose run ID was already written.
pub trait RunSink: Send + Sync {
    fn record_run(&self, record: &RunRecord) -> Result<()>;

    /// Whether a record for `run_id` was already written
    fn contains(&self, run_id: &str) -> Result<bool>;
}

/// Which crash log of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrashLogKind {
    /// Crash output of the unpatched workspace
    Original,
    /// Crash output after the agent's patch was applied
    Patch,
}

impl CrashLogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Patch => "patch",
        }
    }
}

/// Run store for persisting runs and artifacts
#[derive(Debug, Clone)]
pub struct RunStore {
    /// Base directory for run storage
    base_dir: PathBuf,
}

impl RunStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: data_dir.as_ref().join("runs"),
        }
    }

    /// Directory holding every run
    pub fn runs_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Directory of a single run
    pub fn run_dir(&self, run_id: &str) -> Result<PathBuf> {
        validate_run_id(run_id)?;
        Ok(self.base_dir.join(run_id))
    }

    fn run_metadata_path(&self, run_id: &str) -> Result<PathBuf> {
        Ok(self.run_dir(run_id)?.join("run.json"))
    }

    fn crash_log_path(&self, run_id: &str, kind: CrashLogKind) -> Result<PathBuf> {
        Ok(self
            .run_dir(run_id)?
            .join(format!("crash_{}.log", kind.as_str())))
    }

    fn ensure_run_dir(&self, run_id: &str) -> Result<PathBuf> {
        let dir = self.run_dir(run_id)?;
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        Ok(dir)
    }

    fn ensure_recorded(&self, run_id: &str) -> Result<()> {
        if self.run_metadata_path(run_id)?.exists() {
            Ok(())
        } else {
            Err(Error::RunNotFound(run_id.to_string()))
        }
    }

    /// Load a run record
    pub fn load_run(&self, run_id: &str) -> Result<RunRecord> {
        let path = self.run_metadata_path(run_id)?;

        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::RunNotFound(run_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let reader = BufReader::new(file);
        let run: RunRecord = serde_json::from_reader(reader)?;

        Ok(run)
    }

    /// List all recorded runs, newest first
    pub fn list_runs(&self) -> Result<Vec<RunSummary>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();

        for entry in fs::read_dir(&self.base_dir)? {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Failed to read directory entry: {}", e);
                    continue;
                }
            };

            let path = entry.path();
            if !path.is_dir() || !path.join("run.json").exists() {
                continue;
            }

            let run_id = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };

            match self.load_run(&run_id) {
                Ok(run) => runs.push(RunSummary::from(&run)),
                Err(e) => {
                    warn!("Failed to load run {}: {}", run_id, e);
                    continue;
                }
            }
        }

        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));

        Ok(runs)
    }

    /// Session identifier recorded for a run, used to resume it
    pub fn resume_id(&self, run_id: &str) -> Result<Option<String>> {
        Ok(self.load_run(run_id)?.resume_id)
    }

    /// Store a crash log for a recorded run, replacing any earlier one of the same kind
    pub fn insert_crash_log(&self, run_id: &str, kind: CrashLogKind, crash_log: &str) -> Result<()> {
        self.ensure_recorded(run_id)?;
        let path = self.crash_log_path(run_id, kind)?;
        fs::write(&path, crash_log)?;
        debug!("Saved {} crash log for run {}", kind.as_str(), run_id);
        Ok(())
    }

    /// Load a crash log, if one was stored
    pub fn load_crash_log(&self, run_id: &str, kind: CrashLogKind) -> Result<Option<String>> {
        let path = self.crash_log_path(run_id, kind)?;
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Store the contents of a file the agent patched
    pub fn save_patch_file(&self, run_id: &str, name: &str, content: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains('/') || name.contains('\\') || name == ".." {
            return Err(Error::InvalidInput(format!("Invalid patch file name: {}", name)));
        }
        self.ensure_recorded(run_id)?;

        let dir = self.run_dir(run_id)?.join("patches");
        fs::create_dir_all(&dir)?;
        let path = dir.join(name);
        fs::write(&path, content)?;

        debug!("Saved patch file {}", path.display());
        Ok(path)
    }

    /// List patch files stored for a run
    pub fn list_patch_files(&self, run_id: &str) -> Result<Vec<String>> {
        let dir = self.run_dir(run_id)?.join("patches");
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .collect::<Vec<_>>();
        names.sort();
        Ok(names)
    }
}

impl RunSink for RunStore {
    fn record_run(&self, record: &RunRecord) -> Result<()> {
        self.ensure_run_dir(&record.run_id)?;
        let path = self.run_metadata_path(&record.run_id)?;

        let file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::DuplicateRun(record.run_id.clone()))
            }
            Err(e) => return Err(e.into()),
        };

        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, record)?;
        writer.flush()?;

        info!("Recorded run {} at {}", record.run_id, path.display());
        Ok(())
    }

    fn contains(&self, run_id: &str) -> Result<bool> {
        Ok(self.run_metadata_path(run_id)?.exists())
    }
}

/// Reject run IDs that are empty or would escape the runs directory
pub fn validate_run_id(run_id: &str) -> Result<()> {
    let valid = !run_id.is_empty()
        && run_id != "."
        && run_id != ".."
        && !run_id.contains(['/', '\\']);
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("Invalid run id: {:?}", run_id)))
    }
}
