use std::time::Duration;

use serde::Serialize;

/// Why a single execution ended in `Failed`.
///
/// The `Display` text is what callers see as the result content, so each
/// variant reads distinctly: spawn failure, timeout, exit code, empty reply
/// and dispatch errors are never confused with one another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureCause {
    #[error("failed to launch agent CLI: {message}")]
    SpawnFailure { message: String },

    #[error("agent CLI idle timeout: no output for {}s", secs(.after))]
    IdleTimeout { after: Duration },

    #[error("agent CLI total timeout after {}s", secs(.after))]
    TotalTimeout { after: Duration },

    #[error("agent CLI exited with non-zero exit code: {}", exit_code(.code))]
    NonZeroExit { code: Option<i32> },

    #[error("no reply received from agent CLI")]
    EmptyReply,

    #[error("dispatch error: {message}")]
    Dispatch { message: String },
}

impl FailureCause {
    /// Idle and total timeouts are the only causes eligible for retry.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            FailureCause::IdleTimeout { .. } | FailureCause::TotalTimeout { .. }
        )
    }
}

fn secs(d: &Duration) -> f64 {
    d.as_secs_f64()
}

fn exit_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "none (terminated by signal)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_timeouts_are_retryable() {
        let retryable = [
            FailureCause::IdleTimeout {
                after: Duration::from_secs(20),
            },
            FailureCause::TotalTimeout {
                after: Duration::from_secs(60),
            },
        ];
        for cause in &retryable {
            assert!(cause.is_timeout(), "{cause:?} should be retryable");
        }

        let terminal = [
            FailureCause::SpawnFailure {
                message: "timeout while resolving binary".into(),
            },
            FailureCause::NonZeroExit { code: Some(1) },
            FailureCause::EmptyReply,
            FailureCause::Dispatch {
                message: "task timed out".into(),
            },
        ];
        for cause in &terminal {
            assert!(!cause.is_timeout(), "{cause:?} must not be retried");
        }
    }

    #[test]
    fn display_names_the_cause() {
        let idle = FailureCause::IdleTimeout {
            after: Duration::from_secs(20),
        };
        assert_eq!(idle.to_string(), "agent CLI idle timeout: no output for 20s");

        let total = FailureCause::TotalTimeout {
            after: Duration::from_millis(1500),
        };
        assert_eq!(total.to_string(), "agent CLI total timeout after 1.5s");

        let exit = FailureCause::NonZeroExit { code: Some(2) };
        assert_eq!(
            exit.to_string(),
            "agent CLI exited with non-zero exit code: 2"
        );

        let signalled = FailureCause::NonZeroExit { code: None };
        assert!(signalled.to_string().contains("terminated by signal"));
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_value(FailureCause::EmptyReply).unwrap();
        assert_eq!(json["kind"], "empty_reply");
    }
}
