//! Fleet-wide connection and key settings

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::expand_tilde;
use super::serde_utils::duration_secs;
use crate::error::ConfigError;
use crate::types::{HostDefaults, DEFAULT_PORT, DEFAULT_USER};

/// Settings shared by every host in a run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Login user for hosts that do not name one
    pub default_user: String,

    /// SSH port for hosts that do not name one
    pub default_port: u16,

    /// Remote authorized_keys path, relative to the login directory
    pub authorized_keys: String,

    /// Private keys offered for authentication, in order; missing files are skipped
    pub identity_files: Vec<PathBuf>,

    /// Offer keys held by the running ssh-agent
    pub use_agent: bool,

    /// OpenSSH known_hosts file used to check server keys
    pub known_hosts: PathBuf,

    /// Refuse hosts whose key is not in `known_hosts` (changed keys are always refused)
    pub strict_host_keys: bool,

    /// Connection timeout per hop
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// OpenSSH client used for interactive sessions
    pub ssh_program: String,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            default_user: DEFAULT_USER.to_string(),
            default_port: DEFAULT_PORT,
            authorized_keys: kf_keys::DEFAULT_AUTHORIZED_KEYS.to_string(),
            identity_files: ["id_ed25519", "id_ecdsa", "id_rsa"]
                .iter()
                .map(|name| PathBuf::from("~/.ssh").join(name))
                .collect(),
            use_agent: true,
            known_hosts: PathBuf::from("~/.ssh/known_hosts"),
            strict_host_keys: false,
            connect_timeout: Duration::from_secs(30),
            ssh_program: "ssh".to_string(),
        }
    }
}

impl FleetConfig {
    /// Defaults for parsing host specifications
    pub fn host_defaults(&self) -> HostDefaults {
        HostDefaults {
            user: self.default_user.clone(),
            port: self.default_port,
        }
    }

    /// Identity files that exist on disk, with `~` expanded
    pub fn existing_identity_files(&self) -> Vec<PathBuf> {
        self.identity_files
            .iter()
            .map(|p| expand_tilde(p))
            .filter(|p| p.exists())
            .collect()
    }

    /// known_hosts path with `~` expanded
    pub fn known_hosts_path(&self) -> PathBuf {
        expand_tilde(&self.known_hosts)
    }

    /// Reject settings that cannot work
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_user.is_empty() {
            return Err(ConfigError::Invalid("default_user must not be empty".to_string()));
        }
        if self.default_port == 0 {
            return Err(ConfigError::Invalid("default_port must not be 0".to_string()));
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::Invalid("connect_timeout must be at least 1 second".to_string()));
        }
        if self.authorized_keys.trim().is_empty() {
            return Err(ConfigError::Invalid("authorized_keys must not be empty".to_string()));
        }
        Ok(())
    }
}
