//! Depth-first traversal of the host tree
//!
//! The chain of open gateways is an owned stack: a frame pushes the tunnel
//! it opened, walks its children with the innermost tunnel on top, then
//! pops and closes it. Tunnels are closed innermost first whether the
//! subtree finished normally or the visitor asked to leave.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};

use kf_core::error::ConnectionError;
use kf_core::{Connector, HostSpec, TopologyNode};

/// Whether the traversal goes on after a host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Stop the whole traversal
    Leave,
}

/// Callbacks the walker drives
#[async_trait]
pub trait HostVisitor<T: Send + Sync>: Send {
    /// Handle one host; `via` is the innermost open gateway
    async fn visit_host(&mut self, host: &HostSpec, via: Option<&T>) -> Flow;

    /// About to connect to `gateway`
    fn gateway_opening(&mut self, _gateway: &HostSpec) {}

    /// `gateway` could not be opened; its subtree is skipped
    fn gateway_failed(&mut self, gateway: &HostSpec, error: ConnectionError);

    /// `gateway` was closed after its subtree
    fn gateway_closed(&mut self, _gateway: &HostSpec) {}
}

/// Visit `nodes` in order, pre-order depth first
///
/// `chain` holds the tunnels opened by enclosing frames; it has the same
/// contents on return as on entry.
pub fn walk<'a, C, V>(
    connector: &'a C,
    nodes: &'a [TopologyNode],
    chain: &'a mut Vec<C::Tunnel>,
    visitor: &'a mut V,
) -> BoxFuture<'a, Flow>
where
    C: Connector,
    V: HostVisitor<C::Tunnel>,
{
    async move {
        for node in nodes {
            match node {
                TopologyNode::Host(host) => {
                    if visitor.visit_host(host, chain.last()).await == Flow::Leave {
                        return Flow::Leave;
                    }
                }
                TopologyNode::Gateway { spec, children } => {
                    visitor.gateway_opening(spec);
                    let tunnel = match connector.open_gateway(spec, chain.last()).await {
                        Ok(tunnel) => tunnel,
                        Err(e) => {
                            tracing::error!("Gateway {} failed, skipping its hosts: {}", spec, e);
                            visitor.gateway_failed(spec, e);
                            continue;
                        }
                    };
                    tracing::info!("Gateway {} open", spec);

                    chain.push(tunnel);
                    let flow = walk(connector, children, chain, visitor).await;
                    if let Some(tunnel) = chain.pop() {
                        connector.close_gateway(tunnel).await;
                    }
                    tracing::debug!("Gateway {} closed", spec);
                    visitor.gateway_closed(spec);

                    if flow == Flow::Leave {
                        return Flow::Leave;
                    }
                }
            }
        }
        Flow::Continue
    }
    .boxed()
}
