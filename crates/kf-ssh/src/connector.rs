//! Connections to gateways and hosts

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Config, Handle};
use russh::Disconnect;
use russh_keys::key::KeyPair;
use tokio::net::TcpStream;

use kf_core::error::ConnectionError;
use kf_core::{Connector, FleetConfig, HostSpec};

use crate::handler::{ClientHandler, HostKeyError, HostKeyPolicy};
use crate::passthrough;
use crate::session::SshSession;

/// An authenticated connection to a jump host
pub struct Gateway {
    spec: HostSpec,
    handle: Handle<ClientHandler>,
}

impl Gateway {
    pub fn spec(&self) -> &HostSpec {
        &self.spec
    }

    pub(crate) fn handle(&self) -> &Handle<ClientHandler> {
        &self.handle
    }
}

/// russh-backed [`Connector`]
pub struct SshConnector {
    ssh_config: Arc<Config>,
    keys: Vec<(String, Arc<KeyPair>)>,
    use_agent: bool,
    host_keys: HostKeyPolicy,
    connect_timeout: Duration,
    ssh_program: String,
}

impl SshConnector {
    /// Build a connector, loading every readable identity file
    ///
    /// Identity files that cannot be loaded (missing, passphrase
    /// protected, unknown format) are skipped with a warning.
    pub fn new(config: &FleetConfig) -> Self {
        let mut keys = Vec::new();
        for path in config.existing_identity_files() {
            match russh_keys::load_secret_key(&path, None) {
                Ok(key) => {
                    tracing::debug!("Loaded identity {}", path.display());
                    keys.push((path.display().to_string(), Arc::new(key)));
                }
                Err(e) => tracing::warn!("Skipping identity {}: {}", path.display(), e),
            }
        }

        Self {
            ssh_config: Arc::new(Config::default()),
            keys,
            use_agent: config.use_agent,
            host_keys: HostKeyPolicy {
                known_hosts: config.known_hosts_path(),
                strict: config.strict_host_keys,
            },
            connect_timeout: config.connect_timeout,
            ssh_program: config.ssh_program.clone(),
        }
    }

    /// Number of private keys loaded from identity files
    pub fn identity_count(&self) -> usize {
        self.keys.len()
    }

    /// Open the SSH transport to `spec`, through `via` when given
    async fn transport(
        &self,
        spec: &HostSpec,
        via: Option<&Gateway>,
    ) -> Result<Handle<ClientHandler>, ConnectionError> {
        let handler = ClientHandler::new(
            spec.host().to_string(),
            spec.port(),
            self.host_keys.clone(),
        );
        let config = Arc::clone(&self.ssh_config);

        let connect = async move {
            match via {
                Some(gateway) => {
                    tracing::info!("Connecting to {} via {}", spec.address(), gateway.spec);
                    let channel = gateway
                        .handle
                        .channel_open_direct_tcpip(spec.host(), spec.port() as u32, "127.0.0.1", 0)
                        .await
                        .map_err(|e| ConnectionError::Tunnel {
                            host: spec.host().to_string(),
                            reason: format!("{} refused the tunnel: {}", gateway.spec, e),
                        })?;
                    client::connect_stream(config, channel.into_stream(), handler)
                        .await
                        .map_err(|e| handshake_error(spec, e))
                }
                None => {
                    tracing::info!("Connecting to {}", spec.address());
                    let stream = tcp_connect(spec).await?;
                    client::connect_stream(config, stream, handler)
                        .await
                        .map_err(|e| handshake_error(spec, e))
                }
            }
        };

        tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| ConnectionError::Timeout {
                host: spec.host().to_string(),
            })?
    }

    /// Try password, or identity files then agent keys
    async fn authenticate(
        &self,
        handle: &mut Handle<ClientHandler>,
        spec: &HostSpec,
        password: Option<&str>,
    ) -> Result<(), ConnectionError> {
        let user = spec.user();

        if let Some(password) = password {
            tracing::debug!("Authenticating {}@{} with password", user, spec.host());
            let accepted = handle
                .authenticate_password(user, password)
                .await
                .map_err(|e| ConnectionError::Protocol(e.to_string()))?;
            return if accepted {
                Ok(())
            } else {
                Err(auth_failed(spec))
            };
        }

        for (name, key) in &self.keys {
            tracing::debug!("Offering {} to {}@{}", name, user, spec.host());
            let accepted = handle
                .authenticate_publickey(user, Arc::clone(key))
                .await
                .map_err(|e| ConnectionError::Protocol(e.to_string()))?;
            if accepted {
                tracing::info!("Authenticated to {} with {}", spec, name);
                return Ok(());
            }
        }

        if self.use_agent && authenticate_with_agent(handle, spec).await {
            return Ok(());
        }

        Err(auth_failed(spec))
    }
}

#[async_trait]
impl Connector for SshConnector {
    type Tunnel = Gateway;
    type Session = SshSession;

    async fn open_gateway(
        &self,
        gateway: &HostSpec,
        via: Option<&Gateway>,
    ) -> Result<Gateway, ConnectionError> {
        let mut handle = self.transport(gateway, via).await?;
        self.authenticate(&mut handle, gateway, None).await?;
        Ok(Gateway {
            spec: gateway.clone(),
            handle,
        })
    }

    async fn open_session(
        &self,
        host: &HostSpec,
        via: Option<&Gateway>,
        password: Option<&str>,
    ) -> Result<SshSession, ConnectionError> {
        let mut handle = self.transport(host, via).await?;
        self.authenticate(&mut handle, host, password).await?;
        Ok(SshSession::new(host.clone(), handle))
    }

    async fn close_gateway(&self, gateway: Gateway) {
        if let Err(e) = gateway
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            tracing::debug!("Disconnecting gateway {} failed: {}", gateway.spec, e);
        }
    }

    async fn passthrough(
        &self,
        host: &HostSpec,
        via: Option<&Gateway>,
    ) -> Result<i32, ConnectionError> {
        match via {
            Some(gateway) => passthrough::via_gateway(&self.ssh_program, host, gateway).await,
            None => passthrough::direct(&self.ssh_program, host).await,
        }
    }
}

/// Resolve and connect, classifying the failure
async fn tcp_connect(spec: &HostSpec) -> Result<TcpStream, ConnectionError> {
    let host = spec.host().to_string();
    let addrs: Vec<_> = tokio::net::lookup_host((spec.host(), spec.port()))
        .await
        .map_err(|e| ConnectionError::Dns {
            host: host.clone(),
            reason: e.to_string(),
        })?
        .collect();
    if addrs.is_empty() {
        return Err(ConnectionError::Dns {
            host,
            reason: "no addresses".to_string(),
        });
    }

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                tracing::debug!("TCP connection to {} established", addr);
                return Ok(stream);
            }
            Err(e) => {
                tracing::debug!("Connecting {} failed: {}", addr, e);
                last_error = Some(e);
            }
        }
    }

    Err(match last_error {
        Some(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
            ConnectionError::Refused { host }
        }
        Some(e) if e.kind() == std::io::ErrorKind::TimedOut => ConnectionError::Timeout { host },
        Some(e) => ConnectionError::Unreachable {
            host,
            reason: e.to_string(),
        },
        None => ConnectionError::Unreachable {
            host,
            reason: "no address could be tried".to_string(),
        },
    })
}

fn handshake_error(spec: &HostSpec, error: anyhow::Error) -> ConnectionError {
    match error.downcast::<HostKeyError>() {
        Ok(e) => ConnectionError::HostKey {
            host: spec.host().to_string(),
            reason: e.to_string(),
        },
        Err(error) => ConnectionError::Unreachable {
            host: spec.host().to_string(),
            reason: format!("SSH handshake failed: {}", error),
        },
    }
}

fn auth_failed(spec: &HostSpec) -> ConnectionError {
    ConnectionError::AuthenticationFailed {
        user: spec.user().to_string(),
        host: spec.host().to_string(),
    }
}

#[cfg(unix)]
async fn authenticate_with_agent(handle: &mut Handle<ClientHandler>, spec: &HostSpec) -> bool {
    use russh_keys::agent::client::AgentClient;

    let mut agent = match AgentClient::connect_env().await {
        Ok(agent) => agent,
        Err(e) => {
            tracing::debug!("No ssh-agent available: {}", e);
            return false;
        }
    };
    let identities = match agent.request_identities().await {
        Ok(identities) => identities,
        Err(e) => {
            tracing::warn!("Listing ssh-agent keys failed: {}", e);
            return false;
        }
    };

    for key in identities {
        let fingerprint = key.fingerprint();
        let (returned, result) = handle.authenticate_future(spec.user(), key, agent).await;
        agent = returned;
        match result {
            Ok(true) => {
                tracing::info!("Authenticated to {} with agent key SHA256:{}", spec, fingerprint);
                return true;
            }
            Ok(false) => {}
            Err(e) => tracing::debug!("Agent key SHA256:{} failed: {:?}", fingerprint, e),
        }
    }
    false
}

#[cfg(not(unix))]
async fn authenticate_with_agent(_handle: &mut Handle<ClientHandler>, _spec: &HostSpec) -> bool {
    false
}
