//! Shared test utilities for squad integration tests.
//!
//! The agent CLI is replaced by a shell script written into a temporary
//! directory. The script sees the same argv the real CLI would:
//!
//! ```text
//! fresh:  $1=exec $2=--skip-git-repo-check $3=--json $4=<prompt>
//! resume: $1=exec $2=resume $3=--skip-git-repo-check $4=--json $5=<id> $6=<prompt>
//! ```

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use squad_core::{AgentIdentity, CodexCli, LogEvent, LogSink, TimeoutPolicy};
use tempfile::TempDir;

/// A fake agent CLI: an executable `/bin/sh` script in its own temp dir.
pub struct FakeCli {
    dir: TempDir,
    script: PathBuf,
}

impl FakeCli {
    /// Write `body` (shell commands, no shebang) as an executable script.
    pub fn new(body: &str) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let script = dir.path().join("fake_codex.sh");
        std::fs::write(&script, format!("#!/bin/sh\n{body}\n")).expect("failed to write script");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
                .expect("failed to chmod script");
        }

        Self { dir, script }
    }

    /// A script that announces `thread_id` and replies with `text`.
    pub fn replying(thread_id: &str, text: &str) -> Self {
        Self::new(&format!(
            "{}\n{}",
            echo_json(&thread_started(thread_id)),
            echo_json(&agent_message(text)),
        ))
    }

    pub fn cli(&self) -> CodexCli {
        CodexCli::new(self.script.display().to_string())
    }

    pub fn script_path(&self) -> &Path {
        &self.script
    }

    /// Scratch directory owned by this fake; removed on drop.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

/// `{"type":"thread.started","thread_id":...}`
pub fn thread_started(thread_id: &str) -> String {
    serde_json::json!({ "type": "thread.started", "thread_id": thread_id }).to_string()
}

/// `{"type":"item.completed","item":{"type":"agent_message","text":...}}`
pub fn agent_message(text: &str) -> String {
    serde_json::json!({
        "type": "item.completed",
        "item": { "type": "agent_message", "text": text }
    })
    .to_string()
}

/// `{"type":"item.completed","item":{"type":"error","message":...}}`
pub fn error_item(message: &str) -> String {
    serde_json::json!({
        "type": "item.completed",
        "item": { "type": "error", "message": message }
    })
    .to_string()
}

/// A shell statement printing `line` verbatim. `line` must not contain `'`.
pub fn echo_json(line: &str) -> String {
    assert!(!line.contains('\''), "single quotes are not supported: {line}");
    format!("printf '%s\\n' '{line}'")
}

/// Policy with no floors, so millisecond timeouts take effect as given.
pub fn fast_policy() -> TimeoutPolicy {
    TimeoutPolicy {
        idle_floor: Duration::ZERO,
        total_floor: Duration::ZERO,
        total_multiplier: 4,
        retry_floor: Duration::ZERO,
        retry_multiplier: 2,
    }
}

pub fn identity(id: &str) -> AgentIdentity {
    AgentIdentity::new(id, format!("{} Agent", id.to_uppercase()))
}

/// Whether `pid` is gone or a zombie, according to `ps`.
pub fn pid_exited(pid: u32) -> bool {
    let out = std::process::Command::new("ps")
        .args(["-o", "stat=", "-p", &pid.to_string()])
        .output()
        .expect("failed to run ps");
    let stat = String::from_utf8_lossy(&out.stdout);
    let stat = stat.trim();
    stat.is_empty() || stat.starts_with('Z')
}

/// Poll [`pid_exited`] for up to `within`.
pub async fn wait_for_pid_exit(pid: u32, within: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if pid_exited(pid) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// A sink that keeps every event for later inspection.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<LogEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().expect("sink lock poisoned").clone()
    }

    /// Messages emitted for `agent_id`, in emission order.
    pub fn messages_for(&self, agent_id: &str) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| e.agent_id == agent_id)
            .map(|e| e.message)
            .collect()
    }
}

impl LogSink for CollectingSink {
    fn emit(&self, event: LogEvent) {
        self.events.lock().expect("sink lock poisoned").push(event);
    }
}
