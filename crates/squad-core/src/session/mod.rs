//! Per-agent resumable session ids.
//!
//! The store is the only place session ids live at runtime. Every access
//! goes through the internal lock, so parallel executions can read and
//! record sessions for different agents without racing.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Synchronized map from agent id to the last known session id.
///
/// An empty string means "no prior session" and is never stored.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, String>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store from `(agent_id, session_id)` pairs, skipping blanks.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let sessions = pairs
            .into_iter()
            .filter_map(|(k, v)| {
                let v = v.as_ref().trim();
                (!v.is_empty()).then(|| (k.into(), v.to_string()))
            })
            .collect();
        Self {
            sessions: Mutex::new(sessions),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        // The map holds plain strings; a panic mid-insert cannot leave it
        // half-updated, so a poisoned lock is still safe to use.
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The session id for `agent_id`, if one is known.
    pub fn get(&self, agent_id: &str) -> Option<String> {
        self.lock().get(agent_id).cloned()
    }

    /// Record `session_id` for `agent_id` unless the agent already has one.
    ///
    /// Returns `true` if the id was stored. Blank ids are never stored.
    pub fn record_if_absent(&self, agent_id: &str, session_id: &str) -> bool {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return false;
        }
        let mut sessions = self.lock();
        if sessions.contains_key(agent_id) {
            return false;
        }
        sessions.insert(agent_id.to_string(), session_id.to_string());
        true
    }

    /// Display form: the session id, or `<agent_id>-pending` when none.
    pub fn session_for(&self, agent_id: &str) -> String {
        self.get(agent_id)
            .unwrap_or_else(|| format!("{agent_id}-pending"))
    }

    /// A copy of all known sessions.
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn seeding_skips_blank_sessions() {
        let store = SessionStore::from_pairs([("pm", "thread-1"), ("fe", ""), ("be", "   ")]);
        assert_eq!(store.get("pm").as_deref(), Some("thread-1"));
        assert_eq!(store.get("fe"), None);
        assert_eq!(store.get("be"), None);
        assert_eq!(store.snapshot().len(), 1);
    }

    #[test]
    fn record_is_first_write_wins() {
        let store = SessionStore::new();
        assert!(store.record_if_absent("qa", "first"));
        assert!(!store.record_if_absent("qa", "second"));
        assert_eq!(store.get("qa").as_deref(), Some("first"));
    }

    #[test]
    fn record_ignores_blank_ids() {
        let store = SessionStore::new();
        assert!(!store.record_if_absent("qa", "  "));
        assert_eq!(store.get("qa"), None);
    }

    #[test]
    fn session_for_shows_pending_placeholder() {
        let store = SessionStore::from_pairs([("pm", "abc")]);
        assert_eq!(store.session_for("pm"), "abc");
        assert_eq!(store.session_for("fe"), "fe-pending");
    }

    #[test]
    fn concurrent_recorders_store_exactly_one_value() {
        let store = Arc::new(SessionStore::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.record_if_absent("be", &format!("s{i}")))
            })
            .collect();

        let stored: usize = handles
            .into_iter()
            .map(|h| usize::from(h.join().unwrap()))
            .sum();
        assert_eq!(stored, 1);
        assert!(store.get("be").unwrap().starts_with('s'));
    }
}
