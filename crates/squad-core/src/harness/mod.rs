//! Adapter for the external agent CLI.
//!
//! ```text
//! Executor --args(session, prompt)--> CodexCli --command(dir)--> tokio::process::Command
//!                                                                    |
//!                                        stdout / stderr JSONL <-----+
//! ```

pub mod codex;

pub use codex::{CodexCli, DEFAULT_PROGRAM};
