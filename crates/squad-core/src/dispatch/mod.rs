//! Fan-out / fan-in of one task over a set of agents.
//!
//! Each target runs on its own tokio task. Results are collected as they
//! complete, tagged with the target's request index, and returned in request
//! order. A timed-out target is re-run exactly once with a longer timeout.
//!
//! [`Dispatcher::dispatch`] never fails: every error, including a panicking
//! executor task, becomes a Failed [`ExecutionResult`] for that target.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::agent::{AgentIdentity, ExecutionResult, FailureCause, LogEvent, LogSink};
use crate::executor::{Executor, resolve_working_dir};
use crate::process::ProcessRegistry;
use crate::session::SessionStore;

/// Runs dispatches against a shared executor, registry and session store.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    executor: Executor,
}

impl Dispatcher {
    pub fn new(executor: Executor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn registry(&self) -> &Arc<ProcessRegistry> {
        self.executor.registry()
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        self.executor.sessions()
    }

    /// Stop the live process of one agent. See [`ProcessRegistry::terminate`].
    pub async fn terminate(&self, agent_id: &str) -> bool {
        self.registry().terminate(agent_id).await
    }

    /// Stop every live process. Returns how many were still running.
    pub async fn shutdown(&self) -> usize {
        let stopped = self.registry().terminate_all().await;
        if stopped > 0 {
            info!(stopped, "terminated running agent processes");
        }
        stopped
    }

    /// Send `text` to every agent in `targets` concurrently.
    ///
    /// The returned vector has one result per target, in `targets` order.
    /// Every [`LogEvent`] produced along the way is passed to `sink` as it
    /// happens.
    pub async fn dispatch(
        &self,
        targets: &[AgentIdentity],
        text: &str,
        working_dir: &Path,
        timeout: Duration,
        sink: Arc<dyn LogSink>,
    ) -> Vec<ExecutionResult> {
        let dispatch_id = Uuid::new_v4();
        let span = info_span!("dispatch", %dispatch_id);
        let working_dir = resolve_working_dir(working_dir, self.executor.project_root());

        span.in_scope(|| {
            info!(
                targets = targets.len(),
                timeout_secs = timeout.as_secs(),
                working_dir = %working_dir.display(),
                "dispatch started"
            );
        });

        let mut pending = FuturesUnordered::new();
        for (index, agent) in targets.iter().cloned().enumerate() {
            let executor = self.executor.clone();
            let sink = Arc::clone(&sink);
            let text = text.to_string();
            let working_dir = working_dir.clone();

            let task = tokio::spawn(
                async move {
                    run_with_retry(&executor, &agent, &text, &working_dir, timeout, sink.as_ref())
                        .await
                }
                .instrument(span.clone()),
            );
            pending.push(async move { (index, task.await) });
        }

        let mut results = Vec::with_capacity(targets.len());
        while let Some((index, joined)) = pending.next().await {
            let result = match joined {
                Ok(result) => result,
                Err(e) => {
                    let agent = &targets[index];
                    span.in_scope(|| {
                        error!(agent_id = %agent.id, error = %e, "executor task did not complete");
                    });
                    ExecutionResult::failed(
                        agent,
                        FailureCause::Dispatch {
                            message: format!("executor task failed: {e}"),
                        },
                    )
                }
            };
            results.push((index, result));
        }

        results.sort_by_key(|(index, _)| *index);
        let results: Vec<ExecutionResult> = results.into_iter().map(|(_, r)| r).collect();

        span.in_scope(|| {
            let failed = results.iter().filter(|r| r.is_failed()).count();
            info!(completed = results.len(), failed, "dispatch finished");
        });
        results
    }
}

/// One execution with internal errors folded into a Failed result.
async fn run_once(
    executor: &Executor,
    agent: &AgentIdentity,
    text: &str,
    working_dir: &Path,
    timeout: Duration,
    sink: &dyn LogSink,
) -> ExecutionResult {
    match executor.run(agent, text, working_dir, timeout, sink).await {
        Ok(result) => result,
        Err(e) => {
            warn!(agent_id = %agent.id, error = %e, "executor error");
            ExecutionResult::failed(
                agent,
                FailureCause::Dispatch {
                    message: format!("{e:#}"),
                },
            )
        }
    }
}

/// One execution, re-run once with the retry timeout if it timed out.
async fn run_with_retry(
    executor: &Executor,
    agent: &AgentIdentity,
    text: &str,
    working_dir: &Path,
    timeout: Duration,
    sink: &dyn LogSink,
) -> ExecutionResult {
    let first = run_once(executor, agent, text, working_dir, timeout, sink).await;
    if !first.timed_out() {
        return first;
    }

    let retry_timeout = executor.policy().retry_timeout(timeout);
    info!(
        agent_id = %agent.id,
        retry_timeout_secs = retry_timeout.as_secs(),
        "timeout detected, retrying once"
    );
    sink.emit(LogEvent::running(
        agent,
        format!(
            "timeout detected, retrying once (timeout={}s)",
            retry_timeout.as_secs()
        ),
    ));

    run_once(executor, agent, text, working_dir, retry_timeout, sink).await
}
