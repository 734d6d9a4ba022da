//! kf-keys: authorized_keys handling for keyfleet
//!
//! This crate parses OpenSSH `authorized_keys` lines and reconciles an
//! in-memory copy of one account's key file against local keyfiles.
//! Key identity is the base64 payload; options and comments never take
//! part in deciding whether two lines are the same key.

pub mod error;
pub mod keyfile;
pub mod keyline;

pub use error::{KeyFileError, KeyLineError};
pub use keyfile::{Entry, KeyChange, KeyFile, Reconciliation, DEFAULT_AUTHORIZED_KEYS};
pub use keyline::{is_key_line, KeyLine};
