//! kf-ssh: SSH transport for keyfleet
//!
//! Implements the kf-core [`Connector`](kf_core::Connector) and
//! [`RemoteSession`](kf_core::RemoteSession) capabilities on top of russh.
//! Hosts behind gateways are reached by running a new SSH connection over
//! a `direct-tcpip` channel of the gateway, so chains of any depth work
//! without a local listener. Interactive sessions are handed to the
//! OpenSSH client.

mod handler;
mod passthrough;

pub mod connector;
pub mod session;

pub use connector::{Gateway, SshConnector};
pub use session::SshSession;
