//! Registry of live agent CLI processes.
//!
//! At most one live process is registered per agent id. The registry is the
//! cancellation path: [`ProcessRegistry::terminate`] may be called from any
//! task while an executor is still streaming that process's output; the
//! executor then simply observes the exit.

use std::collections::HashMap;
use std::process::ExitStatus;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::process::Child;
use tracing::{debug, warn};

/// How long `terminate` waits after the graceful signal before killing.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(3);

/// Interval at which `terminate` re-checks whether the process exited.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Upper bound on waiting for the OS to reap a force-killed process.
const REAP_TIMEOUT: Duration = Duration::from_secs(2);

/// Shared reference to one running agent CLI process.
///
/// Cloning is cheap; all clones refer to the same child.
#[derive(Clone)]
pub struct ProcessHandle {
    pid: u32,
    child: Arc<tokio::sync::Mutex<Child>>,
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle").field("pid", &self.pid).finish()
    }
}

impl ProcessHandle {
    /// Wrap a freshly spawned child. Fails if the child has already been
    /// reaped and has no pid.
    pub fn new(child: Child) -> Result<Self> {
        let pid = child.id().context("child process has no pid")?;
        Ok(Self {
            pid,
            child: Arc::new(tokio::sync::Mutex::new(child)),
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Non-blocking exit check.
    pub async fn try_wait(&self) -> std::io::Result<Option<ExitStatus>> {
        self.child.lock().await.try_wait()
    }

    /// Whether the process has exited. Errors while checking count as
    /// exited, since the process can no longer be observed.
    pub async fn has_exited(&self) -> bool {
        match self.try_wait().await {
            Ok(Some(_)) => true,
            Ok(None) => false,
            Err(e) => {
                warn!(pid = self.pid, error = %e, "error checking process status");
                true
            }
        }
    }

    /// Ask the process to shut down (SIGTERM on unix).
    pub async fn signal_terminate(&self) {
        #[cfg(unix)]
        {
            let Ok(pid) = i32::try_from(self.pid) else {
                warn!(pid = self.pid, "pid out of range for SIGTERM, killing instead");
                self.start_kill().await;
                return;
            };
            // SAFETY: pid belongs to a child we spawned and have not reaped
            // (the handle keeps the child alive until it is waited on).
            let ret = unsafe { libc::kill(pid, libc::SIGTERM) };
            if ret != 0 {
                warn!(pid = self.pid, "SIGTERM failed, proceeding to kill");
                self.start_kill().await;
            }
        }
        #[cfg(not(unix))]
        {
            self.start_kill().await;
        }
    }

    async fn start_kill(&self) {
        if let Err(e) = self.child.lock().await.start_kill() {
            debug!(pid = self.pid, error = %e, "start_kill failed (already exited?)");
        }
    }

    /// Force-kill the process and wait (bounded) for it to be reaped.
    pub async fn kill(&self) {
        let mut child = self.child.lock().await;
        if let Err(e) = child.start_kill() {
            debug!(pid = self.pid, error = %e, "kill failed (already exited?)");
        }
        if tokio::time::timeout(REAP_TIMEOUT, child.wait()).await.is_err() {
            warn!(pid = self.pid, "process not reaped after kill");
        }
    }

    /// Start a kill without awaiting; usable from `Drop`.
    ///
    /// Falls back to SIGKILL by pid when the child is locked elsewhere.
    pub fn start_kill_now(&self) {
        match self.child.try_lock() {
            Ok(mut child) => {
                if let Err(e) = child.start_kill() {
                    debug!(pid = self.pid, error = %e, "kill failed (already exited?)");
                }
            }
            Err(_) => {
                #[cfg(unix)]
                {
                    if let Ok(pid) = i32::try_from(self.pid) {
                        // SAFETY: see `signal_terminate`.
                        unsafe { libc::kill(pid, libc::SIGKILL) };
                    }
                }
            }
        }
    }
}

/// One execution's hold on its registry entry.
///
/// Must be ended with [`Registration::release`]. If it is dropped instead
/// (a panic or a cancelled future), the process is killed and the entry
/// removed, so no process outlives its supervisor.
#[must_use = "dropping a Registration kills the process"]
#[derive(Debug)]
pub struct Registration {
    registry: Arc<ProcessRegistry>,
    agent_id: String,
    handle: ProcessHandle,
    released: bool,
}

impl Registration {
    /// Remove the entry, leaving the process alone.
    pub fn release(mut self) {
        self.registry.release(&self.agent_id, self.handle.pid());
        self.released = true;
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        warn!(
            agent_id = %self.agent_id,
            pid = self.handle.pid(),
            "supervision ended abnormally, killing process"
        );
        self.handle.start_kill_now();
        self.registry.release(&self.agent_id, self.handle.pid());
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    active: HashMap<String, ProcessHandle>,
    last_pids: HashMap<String, u32>,
}

/// Thread-safe map from agent id to its live process.
#[derive(Debug)]
pub struct ProcessRegistry {
    state: Mutex<RegistryState>,
    grace_period: Duration,
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::with_grace_period(DEFAULT_GRACE_PERIOD)
    }

    pub fn with_grace_period(grace_period: Duration) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            grace_period,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register the live process for `agent_id`.
    ///
    /// Returns the previously registered handle, if any; callers dispatching
    /// the same agent twice at once are the only way that can happen.
    pub fn register(&self, agent_id: &str, handle: ProcessHandle) -> Option<ProcessHandle> {
        let mut state = self.lock();
        state.last_pids.insert(agent_id.to_string(), handle.pid());
        let previous = state.active.insert(agent_id.to_string(), handle);
        if let Some(prev) = &previous {
            warn!(agent_id, pid = prev.pid(), "replacing live process registration");
        }
        previous
    }

    /// Register `handle` and tie its lifetime to the returned guard.
    pub fn register_scoped(
        self: &Arc<Self>,
        agent_id: &str,
        handle: ProcessHandle,
    ) -> Registration {
        self.register(agent_id, handle.clone());
        Registration {
            registry: Arc::clone(self),
            agent_id: agent_id.to_string(),
            handle,
            released: false,
        }
    }

    pub fn unregister(&self, agent_id: &str) -> Option<ProcessHandle> {
        self.lock().active.remove(agent_id)
    }

    /// Remove the registration for `agent_id` only if it still refers to
    /// `pid`. Returns `true` if an entry was removed.
    pub fn release(&self, agent_id: &str, pid: u32) -> bool {
        let mut state = self.lock();
        if state.active.get(agent_id).is_some_and(|h| h.pid() == pid) {
            state.active.remove(agent_id);
            true
        } else {
            false
        }
    }

    pub fn get(&self, agent_id: &str) -> Option<ProcessHandle> {
        self.lock().active.get(agent_id).cloned()
    }

    /// Ids of agents with a registered process, sorted.
    pub fn active_agents(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().active.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Pid of the most recent process started for `agent_id`, live or not.
    pub fn last_pid(&self, agent_id: &str) -> Option<u32> {
        self.lock().last_pids.get(agent_id).copied()
    }

    /// Stop the live process for `agent_id`.
    ///
    /// Sends the graceful signal, waits up to the grace period, then kills.
    /// Returns `true` iff a live process was registered and signalled.
    pub async fn terminate(&self, agent_id: &str) -> bool {
        let Some(handle) = self.get(agent_id) else {
            return false;
        };

        if handle.has_exited().await {
            self.release(agent_id, handle.pid());
            return false;
        }

        handle.signal_terminate().await;

        let deadline = tokio::time::Instant::now() + self.grace_period;
        let mut exited = false;
        while tokio::time::Instant::now() < deadline {
            if handle.has_exited().await {
                exited = true;
                break;
            }
            tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        }

        if exited {
            debug!(agent_id, pid = handle.pid(), "process exited after SIGTERM");
        } else {
            debug!(agent_id, pid = handle.pid(), "process ignored SIGTERM, killing");
            handle.kill().await;
        }

        self.release(agent_id, handle.pid());
        true
    }

    /// Shutdown path: terminate every registered process.
    ///
    /// Returns the number of processes that were still live.
    pub async fn terminate_all(&self) -> usize {
        let mut stopped = 0;
        for agent_id in self.active_agents() {
            if self.terminate(&agent_id).await {
                stopped += 1;
            }
        }
        stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::process::Command;

    fn spawn_sleeper() -> ProcessHandle {
        let child = Command::new("sleep")
            .arg("30")
            .kill_on_drop(true)
            .spawn()
            .expect("failed to spawn sleep");
        ProcessHandle::new(child).unwrap()
    }

    #[tokio::test]
    async fn terminate_unknown_agent_returns_false() {
        let registry = ProcessRegistry::new();
        assert!(!registry.terminate("ghost").await);
    }

    #[tokio::test]
    async fn terminate_twice_returns_true_then_false() {
        let registry = ProcessRegistry::new();
        let handle = spawn_sleeper();
        registry.register("pm", handle.clone());

        assert!(registry.terminate("pm").await);
        assert!(handle.has_exited().await);
        assert!(registry.get("pm").is_none());

        assert!(!registry.terminate("pm").await);
    }

    #[tokio::test]
    async fn register_tracks_last_pid() {
        let registry = ProcessRegistry::new();
        let handle = spawn_sleeper();
        let pid = handle.pid();
        assert!(registry.register("fe", handle).is_none());

        assert_eq!(registry.last_pid("fe"), Some(pid));
        assert_eq!(registry.active_agents(), vec!["fe".to_string()]);

        registry.unregister("fe").unwrap().kill().await;
        assert!(registry.active_agents().is_empty());
        // The last pid survives unregistration.
        assert_eq!(registry.last_pid("fe"), Some(pid));
    }

    #[tokio::test]
    async fn release_only_removes_matching_pid() {
        let registry = ProcessRegistry::new();
        let first = spawn_sleeper();
        let second = spawn_sleeper();

        registry.register("be", first.clone());
        let replaced = registry.register("be", second.clone());
        assert_eq!(replaced.map(|h| h.pid()), Some(first.pid()));

        assert!(!registry.release("be", first.pid()));
        assert_eq!(registry.get("be").map(|h| h.pid()), Some(second.pid()));
        assert!(registry.release("be", second.pid()));
        assert!(registry.get("be").is_none());

        first.kill().await;
        second.kill().await;
    }

    async fn wait_for_exit(handle: &ProcessHandle) -> bool {
        for _ in 0..100 {
            if handle.has_exited().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[tokio::test]
    async fn released_registration_leaves_process_running() {
        let registry = Arc::new(ProcessRegistry::new());
        let handle = spawn_sleeper();

        let registration = registry.register_scoped("qa", handle.clone());
        assert_eq!(registry.active_agents(), vec!["qa".to_string()]);
        registration.release();

        assert!(registry.active_agents().is_empty());
        assert!(!handle.has_exited().await);
        handle.kill().await;
    }

    #[tokio::test]
    async fn dropped_registration_kills_and_unregisters() {
        let registry = Arc::new(ProcessRegistry::new());
        let handle = spawn_sleeper();

        let registration = registry.register_scoped("qa", handle.clone());
        drop(registration);

        assert!(registry.active_agents().is_empty());
        assert!(wait_for_exit(&handle).await, "process still running");
    }

    #[tokio::test]
    async fn registration_dropped_by_panic_kills_process() {
        let registry = Arc::new(ProcessRegistry::new());
        let handle = spawn_sleeper();

        let task: tokio::task::JoinHandle<()> = {
            let registry = Arc::clone(&registry);
            let handle = handle.clone();
            tokio::spawn(async move {
                let _registration = registry.register_scoped("pm", handle);
                panic!("supervisor blew up");
            })
        };
        assert!(task.await.unwrap_err().is_panic());

        assert!(registry.active_agents().is_empty());
        assert!(wait_for_exit(&handle).await, "process still running");
    }

    #[tokio::test]
    async fn terminate_already_exited_process_returns_false() {
        let registry = ProcessRegistry::new();
        let child = Command::new("true").spawn().unwrap();
        let handle = ProcessHandle::new(child).unwrap();
        registry.register("qa", handle.clone());

        for _ in 0..50 {
            if handle.has_exited().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert!(!registry.terminate("qa").await);
        assert!(registry.get("qa").is_none());
    }

    #[tokio::test]
    async fn terminate_all_stops_every_process() {
        let registry = ProcessRegistry::new();
        let handles: Vec<_> = ["pm", "fe", "be"]
            .iter()
            .map(|id| {
                let h = spawn_sleeper();
                registry.register(id, h.clone());
                h
            })
            .collect();

        assert_eq!(registry.terminate_all().await, 3);
        assert!(registry.active_agents().is_empty());
        for h in &handles {
            assert!(h.has_exited().await);
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn terminate_escalates_when_sigterm_is_ignored() {
        let registry = ProcessRegistry::with_grace_period(Duration::from_millis(300));
        let child = Command::new("sh")
            .arg("-c")
            .arg("trap '' TERM; sleep 30")
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let handle = ProcessHandle::new(child).unwrap();
        registry.register("pm", handle.clone());

        // Give the shell time to install the trap.
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(registry.terminate("pm").await);
        assert!(handle.has_exited().await);
    }
}
