//! Core error types for keyfleet

use std::path::PathBuf;

use kf_keys::KeyFileError;
use thiserror::Error;

use crate::commit::CommitStage;

/// Top-level error type for the keyfleet crates
#[derive(Error, Debug)]
pub enum KfError {
    /// Host list, keyfile list or host specification error
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Remote session error
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Publishing authorized_keys failed
    #[error("Commit error: {0}")]
    Commit(#[from] CommitError),

    /// Local keyfile error
    #[error("Keyfile error: {0}")]
    KeyFile(#[from] KeyFileError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors in host lists, keyfile lists and host specifications
#[derive(Error, Debug)]
pub enum ParseError {
    /// Host specification does not match `[user@]host[:port]`
    #[error("Invalid host specification {spec:?}: {reason}")]
    HostSpec { spec: String, reason: String },

    /// Structural error on a given line
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    /// The file could not be read
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Connection-related errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Host name could not be resolved
    #[error("Cannot resolve {host}: {reason}")]
    Dns { host: String, reason: String },

    /// Connection refused
    #[error("Connection refused by {host}")]
    Refused { host: String },

    /// Network or host unreachable, or the connection dropped during setup
    #[error("Cannot reach {host}: {reason}")]
    Unreachable { host: String, reason: String },

    /// Connect did not finish in time
    #[error("Connection to {host} timed out")]
    Timeout { host: String },

    /// Every authentication method was rejected
    #[error("Authentication failed for {user}@{host}")]
    AuthenticationFailed { user: String, host: String },

    /// The gateway refused to open a tunnel to the host
    #[error("Tunnel to {host} failed: {reason}")]
    Tunnel { host: String, reason: String },

    /// Server key missing from or contradicting known_hosts
    #[error("Host key check failed for {host}: {reason}")]
    HostKey { host: String, reason: String },

    /// Local process for an interactive session could not be run
    #[error("Failed to start {program}: {reason}")]
    Spawn { program: String, reason: String },

    /// SSH protocol level failure
    #[error("SSH error: {0}")]
    Protocol(String),
}

impl ConnectionError {
    /// Whether retrying with a password makes sense
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ConnectionError::AuthenticationFailed { .. })
    }
}

/// Errors from an established remote session
#[derive(Error, Debug)]
pub enum SessionError {
    /// Remote command could not be run
    #[error("Failed to run {command:?}: {reason}")]
    Exec { command: String, reason: String },

    /// File transfer failure
    #[error("SFTP error on {path}: {reason}")]
    Sftp { path: String, reason: String },

    /// Channel could not be opened or broke down
    #[error("Channel error: {0}")]
    Channel(String),
}

/// Errors while publishing a reconciled authorized_keys file
///
/// On any of these the live file is untouched and the key file stays
/// marked as changed, so the caller may retry.
#[derive(Error, Debug)]
pub enum CommitError {
    /// Remote operation failed during a commit stage
    #[error("Transfer failed while {stage}: {source}")]
    Transfer {
        stage: CommitStage,
        #[source]
        source: SessionError,
    },

    /// Staged file missing or smaller than what was written
    #[error("Staged file {path} is {}, expected at least {expected} bytes", describe_size(.actual))]
    Verification {
        path: String,
        expected: u64,
        actual: Option<u64>,
    },

    /// Moving the staged file over the live one failed
    #[error("Failed to activate {path} (exit status {status}): {stderr}")]
    Activation {
        path: String,
        status: u32,
        stderr: String,
    },
}

fn describe_size(actual: &Option<u64>) -> String {
    match actual {
        Some(size) => format!("{} bytes", size),
        None => "missing".to_string(),
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
}
