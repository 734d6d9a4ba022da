//! keyfleet CLI library
//!
//! Terminal front end for the orchestrator: colored output, the key table,
//! the per-host prompt and the event printer used by the `keyfleet` binary.

pub mod output;
pub mod prompt;
pub mod reporter;
