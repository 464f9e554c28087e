//! Agent data model shared by every part of the dispatch runtime.
//!
//! An [`AgentIdentity`] describes one configured, role-bound execution
//! target. Running it once yields an [`ExecutionResult`]; while it runs, the
//! runtime emits zero or more [`LogEvent`]s into an injected [`LogSink`].

pub mod failure;
pub mod sink;
pub mod types;

pub use failure::FailureCause;
pub use sink::{LogSink, NullSink};
pub use types::{AgentIdentity, AgentStatus, ExecutionResult, LogEvent};
