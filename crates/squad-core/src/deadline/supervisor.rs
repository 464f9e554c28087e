//! The supervising loop for one agent CLI process.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::{Breach, Deadlines};
use crate::executor::reader::ReaderMessage;
use crate::process::ProcessHandle;

/// How often the loop wakes up when no output arrives.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on collecting lines still queued after the process exited.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// How supervision ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisionOutcome {
    /// The process exited on its own (or was terminated externally).
    Exited { code: Option<i32> },
    /// A deadline was crossed; the process has been killed.
    Breached(Breach),
}

/// Consume `rx` until the process exits or a deadline is crossed.
///
/// `open_streams` is the number of readers feeding `rx`; each sends one
/// [`ReaderMessage::Closed`] at end of stream. Every received line is handed
/// to `on_line` and resets the idle deadline.
pub async fn supervise<F>(
    deadlines: &mut Deadlines,
    rx: &mut mpsc::Receiver<ReaderMessage>,
    handle: &ProcessHandle,
    open_streams: usize,
    mut on_line: F,
) -> Result<SupervisionOutcome>
where
    F: FnMut(&str),
{
    let mut open = open_streams;

    loop {
        if let Some(breach) = deadlines.check(Instant::now()) {
            tracing::debug!(pid = handle.pid(), ?breach, "deadline crossed, killing process");
            handle.kill().await;
            return Ok(SupervisionOutcome::Breached(breach));
        }

        match tokio::time::timeout(POLL_INTERVAL, rx.recv()).await {
            Ok(Some(ReaderMessage::Line(line))) => {
                on_line(&line);
                deadlines.touch(Instant::now());
            }
            Ok(Some(ReaderMessage::Closed)) => {
                open = open.saturating_sub(1);
                if open == 0 {
                    if let Some(code) = exit_code(handle).await? {
                        return Ok(SupervisionOutcome::Exited { code });
                    }
                }
            }
            Ok(None) => {
                // Every reader is gone; only the exit remains to observe.
                if let Some(code) = exit_code(handle).await? {
                    return Ok(SupervisionOutcome::Exited { code });
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
            Err(_) => {
                if let Some(code) = exit_code(handle).await? {
                    drain(rx, open, &mut on_line).await;
                    return Ok(SupervisionOutcome::Exited { code });
                }
            }
        }
    }
}

async fn exit_code(handle: &ProcessHandle) -> Result<Option<Option<i32>>> {
    let status = handle
        .try_wait()
        .await
        .with_context(|| format!("failed to poll agent CLI process {}", handle.pid()))?;
    Ok(status.map(|s| s.code()))
}

/// Hand over lines the readers had not yet queued when the exit was seen.
async fn drain<F>(rx: &mut mpsc::Receiver<ReaderMessage>, mut open: usize, on_line: &mut F)
where
    F: FnMut(&str),
{
    let deadline = Instant::now() + DRAIN_TIMEOUT;
    while open > 0 {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Some(ReaderMessage::Line(line))) => on_line(&line),
            Ok(Some(ReaderMessage::Closed)) => open -= 1,
            Ok(None) | Err(_) => break,
        }
    }
}
