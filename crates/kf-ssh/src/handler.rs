//! russh client callbacks and server key checks

use std::path::PathBuf;

use async_trait::async_trait;
use russh::client;
use russh_keys::key::PublicKey;
use thiserror::Error;

/// Why a server key was refused
#[derive(Error, Debug)]
pub enum HostKeyError {
    /// known_hosts holds a different key for the host
    #[error("key SHA256:{fingerprint} does not match line {line} of {known_hosts}")]
    Changed {
        known_hosts: String,
        line: usize,
        fingerprint: String,
    },

    /// Host not listed and unknown hosts are refused
    #[error("key SHA256:{fingerprint} is not in {known_hosts}")]
    Unknown {
        known_hosts: String,
        fingerprint: String,
    },

    /// known_hosts could not be read or parsed
    #[error("cannot check {known_hosts}: {reason}")]
    Unreadable { known_hosts: String, reason: String },
}

/// How server keys are checked against an OpenSSH known_hosts file
#[derive(Debug, Clone)]
pub(crate) struct HostKeyPolicy {
    pub(crate) known_hosts: PathBuf,
    /// Refuse hosts that are not listed
    pub(crate) strict: bool,
}

impl HostKeyPolicy {
    pub(crate) fn verify(&self, host: &str, port: u16, key: &PublicKey) -> Result<(), HostKeyError> {
        let known_hosts = self.known_hosts.display().to_string();
        let fingerprint = key.fingerprint();

        let listed = if self.known_hosts.exists() {
            russh_keys::check_known_hosts_path(host, port, key, &self.known_hosts)
        } else {
            Ok(false)
        };

        match listed {
            Ok(true) => {
                tracing::debug!("Host key of {}:{} matches {}", host, port, known_hosts);
                Ok(())
            }
            Ok(false) if self.strict => Err(HostKeyError::Unknown {
                known_hosts,
                fingerprint,
            }),
            Ok(false) => {
                tracing::warn!(
                    "Host key SHA256:{} of {}:{} is not in {}, accepting it",
                    fingerprint,
                    host,
                    port,
                    known_hosts
                );
                Ok(())
            }
            Err(russh_keys::Error::KeyChanged { line }) => Err(HostKeyError::Changed {
                known_hosts,
                line,
                fingerprint,
            }),
            Err(e) => Err(HostKeyError::Unreadable {
                known_hosts,
                reason: e.to_string(),
            }),
        }
    }
}

/// Client handler for one connection
pub(crate) struct ClientHandler {
    host: String,
    port: u16,
    host_keys: HostKeyPolicy,
}

impl ClientHandler {
    pub(crate) fn new(host: String, port: u16, host_keys: HostKeyPolicy) -> Self {
        Self {
            host,
            port,
            host_keys,
        }
    }
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = anyhow::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        if let Err(e) = self
            .host_keys
            .verify(&self.host, self.port, server_public_key)
        {
            tracing::error!("Refusing {}:{}: {}", self.host, self.port, e);
            return Err(e.into());
        }
        Ok(true)
    }
}
