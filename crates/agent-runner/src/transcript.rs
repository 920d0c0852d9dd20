//! Session transcript
//!
//! The transcript is an NDJSON file with one record per line. Every record is
//! flushed as soon as it is written, and `session_end` is always the last one.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Result, RunnerError};

/// Kind of transcript record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogType {
    SessionStart,
    StreamOutput,
    StderrOutput,
    UserInput,
    ExecutionError,
    SessionEnd,
}

/// One transcript line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub log_type: LogType,
    pub timestamp_iso: String,
    pub timestamp_unix: f64,
    pub data: Value,
}

impl LogRecord {
    pub fn new(log_type: LogType, data: Value) -> Self {
        Self::at(Utc::now(), log_type, data)
    }

    pub fn at(time: DateTime<Utc>, log_type: LogType, data: Value) -> Self {
        Self {
            log_type,
            timestamp_iso: time.to_rfc3339_opts(SecondsFormat::Micros, true),
            timestamp_unix: time.timestamp_micros() as f64 / 1_000_000.0,
            data,
        }
    }
}

struct Inner {
    writer: BufWriter<File>,
    closed: bool,
}

/// Shared handle to a session transcript
///
/// Clones write to the same file; each record is written under the lock.
#[derive(Clone)]
pub struct TranscriptLog {
    path: PathBuf,
    inner: Arc<Mutex<Inner>>,
}

impl std::fmt::Debug for TranscriptLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscriptLog").field("path", &self.path).finish()
    }
}

impl TranscriptLog {
    /// Create a new transcript, making parent directories as needed
    ///
    /// Fails if the file already exists; an earlier run's transcript is never replaced.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let wrap = |source| RunnerError::Transcript {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(wrap)?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(wrap)?;
        debug!("Opened session log {}", path.display());

        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                writer: BufWriter::new(file),
                closed: false,
            })),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_record(&self, inner: &mut Inner, record: &LogRecord) -> Result<()> {
        let line = serde_json::to_string(record).map_err(|e| RunnerError::Transcript {
            path: self.path.clone(),
            source: e.into(),
        })?;
        writeln!(inner.writer, "{}", line)
            .and_then(|_| inner.writer.flush())
            .map_err(|source| RunnerError::Transcript {
                path: self.path.clone(),
                source,
            })
    }

    /// Append a record; records after `session_end` are dropped
    pub fn append(&self, log_type: LogType, data: Value) -> Result<()> {
        let mut inner = self.lock();
        if inner.closed {
            warn!(
                "Dropping {:?} record written after session end to {}",
                log_type,
                self.path.display()
            );
            return Ok(());
        }
        self.write_record(&mut inner, &LogRecord::new(log_type, data))
    }

    /// Write `session_end` and close the transcript.
    ///
    /// Returns `false` if the transcript was already closed.
    pub fn finish(&self, data: Value) -> Result<bool> {
        let mut inner = self.lock();
        if inner.closed {
            return Ok(false);
        }
        inner.closed = true;
        self.write_record(&mut inner, &LogRecord::new(LogType::SessionEnd, data))?;
        Ok(true)
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Read the transcript back as written
    pub fn read_back(&self) -> Result<String> {
        fs::read_to_string(&self.path).map_err(|source| RunnerError::Transcript {
            path: self.path.clone(),
            source,
        })
    }
}

/// Parse a transcript file into records, skipping lines that do not parse
pub fn load_records(path: &Path) -> Result<Vec<LogRecord>> {
    let content = fs::read_to_string(path).map_err(|source| RunnerError::Transcript {
        path: path.to_path_buf(),
        source,
    })?;

    let records = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<LogRecord>(line) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Skipping unreadable transcript line in {}: {}", path.display(), e);
                None
            }
        })
        .collect();

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_create_makes_parent_dirs() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("runs/arvo-1-vul2/agent_arvo-1-vul2.log");
        let log = TranscriptLog::create(&path).unwrap();

        assert!(path.exists());
        assert_eq!(log.path(), path);
        assert_eq!(log.read_back().unwrap(), "");
    }

    #[test]
    fn test_create_refuses_existing_transcript() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("agent.log");
        fs::write(&path, "earlier run\n").unwrap();

        let err = TranscriptLog::create(&path).unwrap_err();
        assert!(matches!(
            err,
            RunnerError::Transcript { ref source, .. } if source.kind() == std::io::ErrorKind::AlreadyExists
        ));
        assert_eq!(fs::read_to_string(&path).unwrap(), "earlier run\n");
    }

    #[test]
    fn test_append_flushes_each_record() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("agent.log");
        let log = TranscriptLog::create(&path).unwrap();

        log.append(LogType::SessionStart, json!({"prompt": "fix it"}))
            .unwrap();
        // Visible on disk before anything else happens
        let records = load_records(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].log_type, LogType::SessionStart);
        assert_eq!(records[0].data, json!({"prompt": "fix it"}));

        log.append(LogType::StreamOutput, json!({"raw_text": "hello"}))
            .unwrap();
        assert_eq!(load_records(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_finish_writes_session_end_once() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("agent.log");
        let log = TranscriptLog::create(&path).unwrap();
        let clone = log.clone();

        log.append(LogType::StreamOutput, json!({"type": "turn.started"}))
            .unwrap();
        assert!(clone.finish(json!({"return_code": 0})).unwrap());
        assert!(!log.finish(json!({"return_code": 1})).unwrap());
        log.append(LogType::UserInput, json!({"input": "late"})).unwrap();

        let records = load_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].log_type, LogType::SessionEnd);
        assert_eq!(records[1].data["return_code"], 0);
        assert!(log.is_closed());
    }

    #[test]
    fn test_record_format() {
        let time = DateTime::from_timestamp(1_700_000_000, 250_000_000).unwrap();
        let record = LogRecord::at(time, LogType::StderrOutput, json!({"stderr": "x"}));
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["log_type"], "stderr_output");
        assert_eq!(value["timestamp_iso"], "2023-11-14T22:13:20.250000Z");
        assert_eq!(value["timestamp_unix"], 1_700_000_000.25);
    }
}
