//! `squad dispatch` command: send one task to the enabled agents.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use tokio_util::sync::CancellationToken;

use squad_core::{
    AgentIdentity, Dispatcher, ExecutionResult, Executor, LogEvent, LogSink, ProcessRegistry, RunLog,
    SessionStore,
};

use crate::config::{self, SquadConfig};

/// Arguments of `squad dispatch` after clap parsing.
#[derive(Debug)]
pub struct DispatchArgs {
    pub text: String,
    pub to: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub json: bool,
}

/// Pick the agents a dispatch goes to.
///
/// With no explicit ids every enabled agent is targeted. Explicit ids must
/// name roster agents; disabled ones are skipped. An empty result is an
/// error.
pub fn select_targets(roster: &[AgentIdentity], requested: &[String]) -> Result<Vec<AgentIdentity>> {
    let mut targets: Vec<AgentIdentity> = Vec::new();

    if requested.is_empty() {
        targets.extend(roster.iter().filter(|a| a.enabled).cloned());
    } else {
        for id in requested {
            let id = id.trim();
            let Some(agent) = roster.iter().find(|a| a.id == id) else {
                bail!("unknown agent id: {id}");
            };
            if !agent.enabled {
                eprintln!("Skipping {}: agent is stopped.", agent.id);
                continue;
            }
            if !targets.iter().any(|t| t.id == agent.id) {
                targets.push(agent.clone());
            }
        }
    }

    if targets.is_empty() {
        bail!("no agent to dispatch to: target is stopped (enable one with `squad enable <id>`)");
    }
    Ok(targets)
}

/// Sink that prints each event and appends it to the run log.
struct ConsoleSink {
    run_log: RunLog,
    quiet: bool,
}

impl LogSink for ConsoleSink {
    fn emit(&self, event: LogEvent) {
        if !self.quiet {
            println!(
                "[{}] {:<7} {}",
                event.agent_id.to_uppercase(),
                event.status.as_str(),
                event.message
            );
        }
        self.run_log.append(&event);
    }
}

/// Run the dispatch command. Returns `true` iff every agent succeeded.
pub async fn run_dispatch(config: SquadConfig, args: DispatchArgs) -> Result<bool> {
    let text = args.text.trim();
    if text.is_empty() {
        bail!("task text is empty");
    }

    let targets = select_targets(&config.agents, &args.to)?;
    config.cli.validate().context("agent CLI is not usable")?;

    let working_dir = match args.cwd {
        Some(dir) => dir,
        None => config.project_root.clone(),
    };

    let sessions = Arc::new(SessionStore::from_pairs(config.sessions.iter().cloned()));
    let known_sessions = sessions.snapshot();
    let executor = Executor::new(config.cli.clone(), &config.project_root)
        .with_sessions(Arc::clone(&sessions));
    let dispatcher = Dispatcher::new(executor);

    let run_log = RunLog::new(config.run_log_path());
    let sink: Arc<dyn LogSink> = Arc::new(ConsoleSink {
        run_log: run_log.clone(),
        quiet: args.json,
    });

    if !args.json {
        let ids: Vec<&str> = targets.iter().map(|a| a.id.as_str()).collect();
        println!("Dispatching to: {}", ids.join(", "));
        println!("  Working directory: {}", working_dir.display());
        println!("  Timeout: {}s", config.timeout.as_secs());
        println!();
    }

    // First Ctrl+C stops the running agents; the second force-exits.
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    let got_first_signal = Arc::new(AtomicBool::new(false));
    let got_first_clone = Arc::clone(&got_first_signal);

    let signal_task = tokio::spawn(async move {
        loop {
            tokio::signal::ctrl_c().await.ok();
            if got_first_clone.swap(true, Ordering::SeqCst) {
                eprintln!("\nForce exit.");
                std::process::exit(130);
            }
            eprintln!("\nStopping agents (Ctrl+C again to force)...");
            cancel_clone.cancel();
        }
    });

    let dispatch = dispatcher.dispatch(&targets, text, &working_dir, config.timeout, sink);
    tokio::pin!(dispatch);

    let results = tokio::select! {
        results = &mut dispatch => results,
        _ = cancel.cancelled() => {
            let stopped = dispatcher.shutdown().await;
            eprintln!("Stopped {stopped} running agent(s).");
            dispatch.await
        }
    };
    signal_task.abort();

    for result in &results {
        run_log.append(&LogEvent {
            agent_id: result.agent_id.clone(),
            role: result.role.clone(),
            status: result.status,
            message: result.content.clone(),
        });
    }

    let discovered: HashMap<String, String> = sessions
        .snapshot()
        .into_iter()
        .filter(|(id, _)| !known_sessions.contains_key(id))
        .collect();
    match config::persist_sessions(&config.config_path, &discovered) {
        Ok(0) => {}
        Ok(n) => tracing::info!(count = n, "saved new session ids"),
        Err(e) => tracing::warn!(error = %e, "failed to save session ids"),
    }

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&results).context("failed to serialize results")?
        );
    } else {
        print_results(&results, dispatcher.registry());
    }

    Ok(results.iter().all(|r| !r.is_failed()))
}

/// Header line for one result, naming the pid of its last process.
fn result_header(result: &ExecutionResult, pid: Option<u32>) -> String {
    let pid = match pid {
        Some(pid) => format!("pid {pid}"),
        None => "not started".to_string(),
    };
    format!(
        "== {} ({}) {} [{pid}] ==",
        result.agent_id.to_uppercase(),
        result.role,
        result.status
    )
}

fn print_results(results: &[ExecutionResult], registry: &ProcessRegistry) {
    println!();
    for result in results {
        println!("{}", result_header(result, registry.last_pid(&result.agent_id)));
        println!("{}", result.content);
        println!();
    }
    let failed = results.iter().filter(|r| r.is_failed()).count();
    println!("{} agent(s): {} done, {failed} failed", results.len(), results.len() - failed);
}
