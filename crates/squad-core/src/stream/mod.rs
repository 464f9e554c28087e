//! Line-by-line reduction of the agent CLI's JSONL output.
//!
//! Each output line is first passed through verbatim as a log event, then,
//! if it looks like a JSON object, parsed into a [`StreamEvent`] and folded
//! into the per-execution [`StreamReducer`] state.

pub mod event;

pub use event::{StreamEvent, parse_stream_event};

use crate::agent::{AgentIdentity, AgentStatus, LogEvent};

/// Per-execution reduction state. Never shared between executions.
#[derive(Debug)]
pub struct StreamReducer {
    agent: AgentIdentity,
    latest_message: Option<String>,
    session_id: Option<String>,
}

impl StreamReducer {
    pub fn new(agent: &AgentIdentity) -> Self {
        Self {
            agent: agent.clone(),
            latest_message: None,
            session_id: None,
        }
    }

    /// The most recent completed agent message, if any.
    pub fn latest_message(&self) -> Option<&str> {
        self.latest_message.as_deref()
    }

    /// The first session id announced by the CLI, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Fold one raw output line into the state.
    ///
    /// Returns the log events the line produced, in emission order: the raw
    /// passthrough first, then at most one structured event.
    pub fn on_line(&mut self, raw: &str) -> Vec<LogEvent> {
        let line = raw.trim();
        if line.is_empty() {
            return Vec::new();
        }

        let mut events = vec![LogEvent::running(&self.agent, format!("CLI> {line}"))];

        if !line.starts_with('{') {
            return events;
        }

        let event = match parse_stream_event(line) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(agent_id = %self.agent.id, error = %e, "dropping malformed JSONL line");
                return events;
            }
        };

        match event {
            StreamEvent::Started { thread_id } => {
                if self.session_id.is_none() && !thread_id.is_empty() {
                    tracing::debug!(agent_id = %self.agent.id, thread_id = %thread_id, "session discovered");
                    self.session_id = Some(thread_id);
                }
            }
            StreamEvent::MessageCompleted { text } => {
                let preview = text.lines().next().unwrap_or_default().to_string();
                self.latest_message = Some(text);
                events.push(LogEvent::running(&self.agent, format!("reply> {preview}")));
            }
            StreamEvent::ErrorCompleted { message } => {
                events.push(LogEvent::new(
                    &self.agent,
                    AgentStatus::Failed,
                    format!("CLI error> {message}"),
                ));
            }
            StreamEvent::Unknown => {}
        }

        events
    }
}
