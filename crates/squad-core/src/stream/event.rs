//! Typed parsing of agent CLI JSONL events.

use serde::Deserialize;

/// The structured events the reducer acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// The CLI opened (or resumed) a session.
    Started { thread_id: String },
    /// A completed agent message with non-empty text.
    MessageCompleted { text: String },
    /// A completed error item with a non-empty message.
    ErrorCompleted { message: String },
    /// Anything else: valid JSON the runtime does not act on.
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum WireEvent {
    #[serde(rename = "thread.started")]
    ThreadStarted {
        #[serde(default)]
        thread_id: Option<String>,
    },
    #[serde(rename = "item.completed")]
    ItemCompleted {
        #[serde(default)]
        item: Option<WireItem>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum WireItem {
    #[serde(rename = "agent_message")]
    AgentMessage {
        #[serde(default)]
        text: Option<String>,
    },
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        message: Option<String>,
    },
    #[serde(other)]
    Other,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Parse one JSONL line.
///
/// Returns `Err` if the line is not a JSON object with a string `type`
/// field; callers treat that as a dropped line, not a failure.
pub fn parse_stream_event(line: &str) -> Result<StreamEvent, serde_json::Error> {
    let event = match serde_json::from_str::<WireEvent>(line)? {
        WireEvent::ThreadStarted { thread_id } => StreamEvent::Started {
            thread_id: thread_id.unwrap_or_default().trim().to_string(),
        },
        WireEvent::ItemCompleted {
            item: Some(WireItem::AgentMessage { text }),
        } => match non_empty(text) {
            Some(text) => StreamEvent::MessageCompleted { text },
            None => StreamEvent::Unknown,
        },
        WireEvent::ItemCompleted {
            item: Some(WireItem::Error { message }),
        } => match non_empty(message) {
            Some(message) => StreamEvent::ErrorCompleted { message },
            None => StreamEvent::Unknown,
        },
        WireEvent::ItemCompleted { .. } | WireEvent::Other => StreamEvent::Unknown,
    };
    Ok(event)
}
