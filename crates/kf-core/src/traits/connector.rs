//! Connection traits

use async_trait::async_trait;

use super::remote::RemoteSession;
use crate::error::ConnectionError;
use crate::types::HostSpec;

/// Opens gateways, host sessions and interactive sessions
///
/// `via` is the innermost gateway of the current chain; `None` means a
/// direct connection. Only the traversal frame that opened a tunnel closes
/// it, through [`Connector::close_gateway`].
#[async_trait]
pub trait Connector: Send + Sync {
    /// An established gateway that further hops can be tunneled through
    type Tunnel: Send + Sync;

    /// An authenticated session on a host
    type Session: RemoteSession;

    /// Connect to a gateway
    async fn open_gateway(
        &self,
        gateway: &HostSpec,
        via: Option<&Self::Tunnel>,
    ) -> Result<Self::Tunnel, ConnectionError>;

    /// Connect and authenticate to a host
    ///
    /// With `password` set, password authentication is used; otherwise the
    /// configured keys are offered.
    async fn open_session(
        &self,
        host: &HostSpec,
        via: Option<&Self::Tunnel>,
        password: Option<&str>,
    ) -> Result<Self::Session, ConnectionError>;

    /// Tear down a gateway
    async fn close_gateway(&self, tunnel: Self::Tunnel);

    /// Run an interactive login on the host and wait for it to end
    ///
    /// Returns the exit code of the interactive client.
    async fn passthrough(
        &self,
        host: &HostSpec,
        via: Option<&Self::Tunnel>,
    ) -> Result<i32, ConnectionError>;
}
