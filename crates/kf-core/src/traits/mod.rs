//! Capability traits the orchestrator is written against
//!
//! The SSH transport, SFTP and terminal prompts live behind these traits so
//! that traversal, reconciliation and commit logic can run against
//! in-memory fakes in tests.

mod connector;
mod prompt;
mod remote;

pub use connector::Connector;
pub use prompt::{HostDecision, Prompter};
pub use remote::{CommandOutput, RemoteSession};
