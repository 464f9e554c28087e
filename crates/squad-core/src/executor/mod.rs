//! Single-agent execution: one prompt, one CLI process, one result.
//!
//! # Lifecycle
//!
//! ```text
//! session lookup -> build prompt -> spawn CLI -> register pid
//!     -> supervise (reduce lines, enforce deadlines) -> release pid
//!     -> record new session -> classify exit into ExecutionResult
//! ```
//!
//! Expected failures (spawn errors, timeouts, bad exits, empty replies) are
//! returned as Failed results. `Err` is reserved for internal errors, which
//! the dispatcher converts into Failed results itself.

pub mod reader;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::agent::{AgentIdentity, ExecutionResult, FailureCause, LogEvent, LogSink};
use crate::deadline::{Deadlines, SupervisionOutcome, TimeoutPolicy, supervise};
use crate::harness::CodexCli;
use crate::process::{ProcessHandle, ProcessRegistry};
use crate::prompt::{build_prompt, enforce_path_answer};
use crate::session::SessionStore;
use crate::stream::StreamReducer;

use self::reader::{QUEUE_CAPACITY, spawn_line_reader};

/// `requested` if it exists on disk, otherwise `project_root`.
pub fn resolve_working_dir(requested: &Path, project_root: &Path) -> PathBuf {
    if requested.exists() {
        requested.to_path_buf()
    } else {
        debug!(
            requested = %requested.display(),
            fallback = %project_root.display(),
            "working directory missing, using project root"
        );
        project_root.to_path_buf()
    }
}

/// Runs one agent against one prompt.
///
/// Cloning is cheap; the registry and session store are shared.
#[derive(Debug, Clone)]
pub struct Executor {
    cli: CodexCli,
    registry: Arc<ProcessRegistry>,
    sessions: Arc<SessionStore>,
    policy: TimeoutPolicy,
    project_root: PathBuf,
}

impl Executor {
    pub fn new(cli: CodexCli, project_root: impl Into<PathBuf>) -> Self {
        Self {
            cli,
            registry: Arc::new(ProcessRegistry::new()),
            sessions: Arc::new(SessionStore::new()),
            policy: TimeoutPolicy::default(),
            project_root: project_root.into(),
        }
    }

    pub fn with_sessions(mut self, sessions: Arc<SessionStore>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn with_registry(mut self, registry: Arc<ProcessRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn cli(&self) -> &CodexCli {
        &self.cli
    }

    pub fn registry(&self) -> &Arc<ProcessRegistry> {
        &self.registry
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn policy(&self) -> &TimeoutPolicy {
        &self.policy
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Execute `user_text` against `agent` with nominal timeout `timeout`.
    pub async fn run(
        &self,
        agent: &AgentIdentity,
        user_text: &str,
        working_dir: &Path,
        timeout: Duration,
        sink: &dyn LogSink,
    ) -> Result<ExecutionResult> {
        let working_dir = resolve_working_dir(working_dir, &self.project_root);
        let prior_session = self.sessions.get(&agent.id);

        let prompt = build_prompt(agent, user_text, &working_dir);
        let args = self.cli.args(prior_session.as_deref(), &prompt);

        sink.emit(LogEvent::running(
            agent,
            format!("launching CLI: {}", self.cli.describe(&args)),
        ));
        sink.emit(LogEvent::running(
            agent,
            format!("starting (temperature={})", agent.temperature),
        ));

        let mut child = match self.cli.command(&args, &working_dir).spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(agent_id = %agent.id, program = %self.cli.program(), error = %e, "failed to spawn agent CLI");
                return Ok(ExecutionResult::failed(
                    agent,
                    FailureCause::SpawnFailure {
                        message: e.to_string(),
                    },
                ));
            }
        };

        let stdout = child.stdout.take().context("agent CLI stdout was not piped")?;
        let stderr = child.stderr.take().context("agent CLI stderr was not piped")?;
        let handle = ProcessHandle::new(child)?;
        let pid = handle.pid();
        info!(agent_id = %agent.id, pid, resume = prior_session.is_some(), "agent CLI spawned");

        // Kills the process if this future unwinds or is dropped early.
        let registration = self.registry.register_scoped(&agent.id, handle.clone());

        let (tx, mut rx) = mpsc::channel(QUEUE_CAPACITY);
        spawn_line_reader(stdout, tx.clone());
        spawn_line_reader(stderr, tx);

        let mut deadlines = Deadlines::start(&self.policy, timeout, Instant::now());
        let mut reducer = StreamReducer::new(agent);

        let outcome = supervise(&mut deadlines, &mut rx, &handle, 2, |line| {
            for event in reducer.on_line(line) {
                sink.emit(event);
            }
        })
        .await;

        registration.release();
        let outcome = outcome?;

        let code = match outcome {
            SupervisionOutcome::Breached(breach) => {
                let cause = deadlines.cause(breach);
                warn!(agent_id = %agent.id, pid, %cause, "agent CLI timed out");
                return Ok(ExecutionResult::failed(agent, cause));
            }
            SupervisionOutcome::Exited { code } => code,
        };

        if prior_session.is_none() {
            if let Some(session_id) = reducer.session_id() {
                if self.sessions.record_if_absent(&agent.id, session_id) {
                    info!(agent_id = %agent.id, session_id, "session recorded");
                }
            }
        }

        if code != Some(0) {
            debug!(agent_id = %agent.id, pid, ?code, "agent CLI exited unsuccessfully");
            return Ok(ExecutionResult::failed(
                agent,
                FailureCause::NonZeroExit { code },
            ));
        }

        let Some(reply) = reducer.latest_message() else {
            return Ok(ExecutionResult::failed(agent, FailureCause::EmptyReply));
        };

        let content = enforce_path_answer(user_text, reply.to_string(), &working_dir);
        debug!(agent_id = %agent.id, pid, "agent CLI completed");
        Ok(ExecutionResult::done(agent, content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn existing_directory_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let root = Path::new("/fallback/root");
        assert_eq!(resolve_working_dir(dir.path(), root), dir.path());
    }

    #[test]
    fn missing_directory_falls_back_to_root() {
        let root = tempfile::tempdir().unwrap();
        let resolved = resolve_working_dir(Path::new("/no/such/dir/anywhere"), root.path());
        assert_eq!(resolved, root.path());
    }
}
