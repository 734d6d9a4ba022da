//! kf-core: Core abstractions and configuration for keyfleet
//!
//! This crate provides the host/gateway topology model, the keyfile-list
//! format, the capability traits the orchestrator drives, and the commit
//! protocol that publishes a reconciled `authorized_keys` file.

pub mod commit;
pub mod config;
pub mod error;
pub mod keylist;
pub mod shell;
pub mod topology;
pub mod traits;
pub mod types;

pub use commit::{commit, CommitOutcome, CommitStage};
pub use config::FleetConfig;
pub use error::KfError;
pub use keylist::{KeyIntent, KeyList, KeyListEntry};
pub use topology::{Topology, TopologyNode};
pub use traits::{CommandOutput, Connector, HostDecision, Prompter, RemoteSession};
pub use types::{HostDefaults, HostSpec};
