//! Interactive sessions through the OpenSSH client

use std::process::ExitStatus;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::process::Command;

use kf_core::error::ConnectionError;
use kf_core::HostSpec;

use crate::connector::Gateway;

/// Run `ssh -p <port> user@host` and wait for it
pub(crate) async fn direct(program: &str, host: &HostSpec) -> Result<i32, ConnectionError> {
    tracing::info!("SSH'ing to {}", host);
    let status = Command::new(program)
        .arg("-p")
        .arg(host.port().to_string())
        .arg(format!("{}@{}", host.user(), host.host()))
        .status()
        .await
        .map_err(|e| spawn_error(program, e))?;
    Ok(exit_code(status))
}

/// Forward a local port through `gateway` and run ssh against it
///
/// The forwarded port changes every time, so host key checking is turned
/// off for these sessions.
pub(crate) async fn via_gateway(
    program: &str,
    host: &HostSpec,
    gateway: &Gateway,
) -> Result<i32, ConnectionError> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| tunnel_error(host, e))?;
    let local_port = listener
        .local_addr()
        .map_err(|e| tunnel_error(host, e))?
        .port();

    tracing::warn!("No host key checking for {} behind gateway {}", host, gateway.spec());
    tracing::info!("SSH'ing to {} via {}", host, gateway.spec());

    let mut child = Command::new(program)
        .args(["-o", "StrictHostKeyChecking=no", "-o", "UserKnownHostsFile=/dev/null"])
        .arg("-p")
        .arg(local_port.to_string())
        .arg(format!("{}@localhost", host.user()))
        .spawn()
        .map_err(|e| spawn_error(program, e))?;

    let forward = async {
        let (mut socket, peer) = listener.accept().await.context("accept failed")?;
        tracing::debug!("Forwarding {} to {} via {}", peer, host.address(), gateway.spec());
        let channel = gateway
            .handle()
            .channel_open_direct_tcpip(
                host.host(),
                host.port() as u32,
                "127.0.0.1",
                local_port as u32,
            )
            .await
            .with_context(|| format!("{} refused the tunnel", gateway.spec()))?;
        let mut stream = channel.into_stream();
        tokio::io::copy_bidirectional(&mut socket, &mut stream)
            .await
            .context("forwarding failed")?;
        Ok::<_, anyhow::Error>(())
    };
    tokio::pin!(forward);

    let waited = tokio::select! {
        status = child.wait() => status,
        result = &mut forward => {
            if let Err(e) = result {
                tracing::warn!("Port forward to {}: {:#}", host.host(), e);
            }
            child.wait().await
        }
    };
    let status = waited.map_err(|e| spawn_error(program, e))?;

    Ok(exit_code(status))
}

fn exit_code(status: ExitStatus) -> i32 {
    // killed by a signal
    status.code().unwrap_or(255)
}

fn spawn_error(program: &str, error: std::io::Error) -> ConnectionError {
    ConnectionError::Spawn {
        program: program.to_string(),
        reason: error.to_string(),
    }
}

fn tunnel_error(host: &HostSpec, error: std::io::Error) -> ConnectionError {
    ConnectionError::Tunnel {
        host: host.host().to_string(),
        reason: error.to_string(),
    }
}
