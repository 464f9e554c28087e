//! Codex CLI adapter.
//!
//! Builds `codex exec --skip-git-repo-check --json <prompt>` for a fresh
//! session and `codex exec resume --skip-git-repo-check --json <id> <prompt>`
//! to continue one. The CLI writes JSONL events on stdout.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Result, bail};
use tokio::process::Command;

/// Program used when none is configured; resolved via `$PATH`.
pub const DEFAULT_PROGRAM: &str = "codex";

/// How to launch the agent CLI.
///
/// `entry` is an optional script passed as the first argument, for CLIs
/// distributed as a script run by an interpreter (`node codex.js ...`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodexCli {
    program: String,
    entry: Option<PathBuf>,
}

impl Default for CodexCli {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

impl CodexCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            entry: None,
        }
    }

    pub fn with_entry(program: impl Into<String>, entry: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            entry: Some(entry.into()),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn entry(&self) -> Option<&Path> {
        self.entry.as_deref()
    }

    /// Check the launch configuration before any agent runs.
    pub fn validate(&self) -> Result<()> {
        if self.program.trim().is_empty() {
            bail!("agent CLI program is empty");
        }
        if let Some(entry) = &self.entry {
            if !entry.is_file() {
                bail!("agent CLI entry script not found: {}", entry.display());
            }
        }
        Ok(())
    }

    /// The argument vector after the program name.
    pub fn args(&self, session_id: Option<&str>, prompt: &str) -> Vec<String> {
        let mut args = Vec::with_capacity(7);
        if let Some(entry) = &self.entry {
            args.push(entry.display().to_string());
        }
        args.push("exec".to_string());
        match session_id {
            Some(id) => {
                args.push("resume".to_string());
                args.push("--skip-git-repo-check".to_string());
                args.push("--json".to_string());
                args.push(id.to_string());
            }
            None => {
                args.push("--skip-git-repo-check".to_string());
                args.push("--json".to_string());
            }
        }
        args.push(prompt.to_string());
        args
    }

    /// Short human-readable form of a launch: the program plus the first
    /// three arguments. The prompt is never included in full.
    pub fn describe(&self, args: &[String]) -> String {
        let mut parts = vec![self.program.as_str()];
        parts.extend(args.iter().take(3).map(String::as_str));
        format!("{} ...", parts.join(" "))
    }

    /// A ready-to-spawn command rooted at `working_dir`.
    ///
    /// stdin is closed, stdout and stderr are piped, and the child is
    /// killed if the handle is dropped.
    pub fn command(&self, args: &[String], working_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}
