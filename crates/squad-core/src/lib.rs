//! Runtime for dispatching one task to several CLI-backed agents at once.
//!
//! ```text
//! Dispatcher --spawn per target--> Executor --spawn--> agent CLI process
//!     |                               |                    |
//!     |                     ProcessRegistry (pid)      JSONL lines
//!     |                     SessionStore (resume)          |
//!     |                               '<-- StreamReducer <-'
//!     '<-- ordered Vec<ExecutionResult>
//! ```

pub mod agent;
pub mod deadline;
pub mod dispatch;
pub mod executor;
pub mod harness;
pub mod process;
pub mod prompt;
pub mod roster;
pub mod runlog;
pub mod session;
pub mod stream;

pub use agent::{
    AgentIdentity, AgentStatus, ExecutionResult, FailureCause, LogEvent, LogSink, NullSink,
};
pub use deadline::TimeoutPolicy;
pub use dispatch::Dispatcher;
pub use executor::Executor;
pub use harness::CodexCli;
pub use process::ProcessRegistry;
pub use runlog::{LogEntry, LogLevel, RunLog};
pub use session::SessionStore;
