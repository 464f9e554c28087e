//! `squad logs` command: show the persisted run log.

use std::path::Path;

use anyhow::Result;
use clap::ValueEnum;

use squad_core::{LogLevel, RunLog};

/// Which run log entries to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LevelFilter {
    All,
    Normal,
    Error,
}

impl LevelFilter {
    fn level(self) -> Option<LogLevel> {
        match self {
            LevelFilter::All => None,
            LevelFilter::Normal => Some(LogLevel::Normal),
            LevelFilter::Error => Some(LogLevel::Error),
        }
    }
}

/// Run the logs command.
pub fn run_logs(path: &Path, level: LevelFilter, tail: Option<usize>) -> Result<()> {
    let entries = RunLog::new(path).read_entries(level.level())?;

    if entries.is_empty() {
        println!("No log entries recorded.");
        return Ok(());
    }

    let skip = tail.map_or(0, |n| entries.len().saturating_sub(n));
    for entry in &entries[skip..] {
        println!("{entry}");
    }
    Ok(())
}
