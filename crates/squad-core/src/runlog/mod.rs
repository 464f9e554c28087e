//! Append-only, tab-separated record of log events.
//!
//! One line per event:
//!
//! ```text
//! 2026-01-31 09:14:02\tbe\tRUNNING\tnormal\tCLI> {"type":"turn.started"}
//! ```
//!
//! Writing is best-effort: failures are logged and swallowed so a broken log
//! file never affects a dispatch.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};

use crate::agent::{AgentStatus, LogEvent};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Severity of a run log entry: `error` for Failed events, else `normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Normal,
    Error,
}

impl LogLevel {
    pub fn for_status(status: AgentStatus) -> Self {
        if status == AgentStatus::Failed {
            LogLevel::Error
        } else {
            LogLevel::Normal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Normal => "normal",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(LogLevel::Normal),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

/// One parsed run log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: NaiveDateTime,
    pub agent_id: String,
    pub status: AgentStatus,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    fn parse(line: &str) -> Option<Self> {
        let mut fields = line.splitn(5, '\t');
        let timestamp = NaiveDateTime::parse_from_str(fields.next()?, TIMESTAMP_FORMAT).ok()?;
        let agent_id = fields.next()?.to_string();
        let status = fields.next()?.parse().ok()?;
        let level = fields.next()?.parse().ok()?;
        let message = fields.next()?.to_string();
        Some(Self {
            timestamp,
            agent_id,
            status,
            level,
            message,
        })
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.agent_id,
            self.status,
            self.message
        )
    }
}

/// Handle to a run log file.
#[derive(Debug, Clone)]
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event, creating the file and its parent directory on
    /// demand. Never fails.
    pub fn append(&self, event: &LogEvent) {
        if let Err(e) = self.try_append(event) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to append to run log");
        }
    }

    fn try_append(&self, event: &LogEvent) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        let line = format!(
            "{}\t{}\t{}\t{}\t{}\n",
            Local::now().format(TIMESTAMP_FORMAT),
            flatten(&event.agent_id),
            event.status,
            LogLevel::for_status(event.status),
            flatten(&event.message),
        );
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Read every well-formed entry, optionally keeping only one level.
    ///
    /// A missing file reads as empty. Malformed lines are skipped.
    pub fn read_entries(&self, level: Option<LogLevel>) -> Result<Vec<LogEntry>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", self.path.display()));
            }
        };
        Ok(contents
            .lines()
            .filter_map(LogEntry::parse)
            .filter(|entry| level.is_none_or(|l| entry.level == l))
            .collect())
    }
}

fn flatten(s: &str) -> String {
    s.replace(['\r', '\n', '\t'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentIdentity;

    fn agent() -> AgentIdentity {
        AgentIdentity::new("fe", "Frontend Agent")
    }

    #[test]
    fn append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let log = RunLog::new(dir.path().join("nested/run.log"));

        log.append(&LogEvent::running(&agent(), "CLI> hello"));
        log.append(&LogEvent::new(&agent(), AgentStatus::Failed, "boom"));

        let entries = log.read_entries(None).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].agent_id, "fe");
        assert_eq!(entries[0].status, AgentStatus::Running);
        assert_eq!(entries[0].level, LogLevel::Normal);
        assert_eq!(entries[0].message, "CLI> hello");
        assert_eq!(entries[1].level, LogLevel::Error);
    }

    #[test]
    fn level_filter() {
        let dir = tempfile::tempdir().unwrap();
        let log = RunLog::new(dir.path().join("run.log"));
        log.append(&LogEvent::running(&agent(), "a"));
        log.append(&LogEvent::new(&agent(), AgentStatus::Failed, "b"));
        log.append(&LogEvent::new(&agent(), AgentStatus::Done, "c"));

        let errors = log.read_entries(Some(LogLevel::Error)).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "b");

        let normal = log.read_entries(Some(LogLevel::Normal)).unwrap();
        assert_eq!(normal.len(), 2);
    }

    #[test]
    fn multiline_messages_stay_on_one_line() {
        let dir = tempfile::tempdir().unwrap();
        let log = RunLog::new(dir.path().join("run.log"));
        log.append(&LogEvent::running(&agent(), "reply>\nsecond\tline"));

        let raw = fs::read_to_string(log.path()).unwrap();
        assert_eq!(raw.lines().count(), 1);
        let entries = log.read_entries(None).unwrap();
        assert_eq!(entries[0].message, "reply> second line");
    }

    #[test]
    fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = RunLog::new(dir.path().join("absent.log"));
        assert!(log.read_entries(None).unwrap().is_empty());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        fs::write(
            &path,
            "garbage\n2026-01-02 03:04:05\tqa\tDONE\tnormal\tok\nnot\ta\tvalid\tline\n",
        )
        .unwrap();
        let entries = RunLog::new(&path).read_entries(None).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].agent_id, "qa");
        assert_eq!(entries[0].to_string(), "[2026-01-02 03:04:05] qa DONE ok");
    }

    #[test]
    fn append_to_unwritable_location_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        // Parent is a regular file, so the directory cannot be created.
        RunLog::new(blocker.join("run.log")).append(&LogEvent::running(&agent(), "x"));
    }
}
