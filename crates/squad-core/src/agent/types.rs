use std::fmt;

use serde::{Deserialize, Serialize};

use super::failure::FailureCause;

/// Lifecycle status shown for an agent and carried on results and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    Idle,
    Stopped,
    Running,
    Done,
    Failed,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Idle => "IDLE",
            AgentStatus::Stopped => "STOPPED",
            AgentStatus::Running => "RUNNING",
            AgentStatus::Done => "DONE",
            AgentStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IDLE" => Ok(AgentStatus::Idle),
            "STOPPED" => Ok(AgentStatus::Stopped),
            "RUNNING" => Ok(AgentStatus::Running),
            "DONE" => Ok(AgentStatus::Done),
            "FAILED" => Ok(AgentStatus::Failed),
            other => Err(format!("unknown agent status: {other}")),
        }
    }
}

/// One configured agent: who it is and how it should behave.
///
/// The runtime only reads these fields. `cli_params` and `extra_params` are
/// carried verbatim for the configuration layer and are not interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub id: String,
    pub role: String,
    /// Role instruction text; the bare role label is used when empty.
    #[serde(default)]
    pub role_prompt: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default)]
    pub cli_params: String,
    #[serde(default)]
    pub extra_params: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_temperature() -> f64 {
    0.7
}

fn default_enabled() -> bool {
    true
}

impl AgentIdentity {
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            role_prompt: String::new(),
            temperature: default_temperature(),
            cli_params: String::new(),
            extra_params: String::new(),
            enabled: true,
        }
    }

    pub fn with_role_prompt(mut self, role_prompt: impl Into<String>) -> Self {
        self.role_prompt = role_prompt.into();
        self
    }

    /// The instruction text used in prompts: the role prompt, or the role
    /// label when no prompt is configured.
    pub fn instructions(&self) -> &str {
        let trimmed = self.role_prompt.trim();
        if trimmed.is_empty() {
            &self.role
        } else {
            trimmed
        }
    }
}

/// Terminal value of one execution against one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub agent_id: String,
    pub role: String,
    pub status: AgentStatus,
    pub content: String,
    /// Why the execution failed; `None` unless `status` is `Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<FailureCause>,
}

impl ExecutionResult {
    pub fn done(agent: &AgentIdentity, content: impl Into<String>) -> Self {
        Self {
            agent_id: agent.id.clone(),
            role: agent.role.clone(),
            status: AgentStatus::Done,
            content: content.into(),
            cause: None,
        }
    }

    /// A failed result whose content is the cause's human-readable text.
    pub fn failed(agent: &AgentIdentity, cause: FailureCause) -> Self {
        Self {
            agent_id: agent.id.clone(),
            role: agent.role.clone(),
            status: AgentStatus::Failed,
            content: cause.to_string(),
            cause: Some(cause),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == AgentStatus::Failed
    }

    /// Whether this result is eligible for the one-shot timeout retry.
    pub fn timed_out(&self) -> bool {
        self.is_failed() && self.cause.as_ref().is_some_and(FailureCause::is_timeout)
    }
}

/// Ephemeral progress event emitted while an agent runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEvent {
    pub agent_id: String,
    pub role: String,
    pub status: AgentStatus,
    pub message: String,
}

impl LogEvent {
    pub fn new(agent: &AgentIdentity, status: AgentStatus, message: impl Into<String>) -> Self {
        Self {
            agent_id: agent.id.clone(),
            role: agent.role.clone(),
            status,
            message: message.into(),
        }
    }

    pub fn running(agent: &AgentIdentity, message: impl Into<String>) -> Self {
        Self::new(agent, AgentStatus::Running, message)
    }
}
