//! kf-orchestrator: Runs an action across a tree of hosts and gateways
//!
//! The walker visits the topology depth first, opening each gateway
//! through the one above it and closing it again once its subtree is
//! done. For every host the orchestrator obtains a session (asking for a
//! password when key authentication is rejected), dispatches the action
//! and reports what happened through an [`EventSink`].

pub mod action;
pub mod events;
pub mod orchestrator;
pub mod walker;

pub use action::{Action, ActionError};
pub use events::{EventSink, GatewayFailure, HostReport, HostStatus, KeySummary, RunEvent, RunSummary};
pub use orchestrator::{Orchestrator, RunOptions};
pub use walker::{walk, Flow, HostVisitor};
