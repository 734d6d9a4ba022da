//! Command execution and file transfer on a connected host

use async_trait::async_trait;
use russh::client::Handle;
use russh::{ChannelMsg, Disconnect};
use russh_sftp::client::SftpSession;
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;

use kf_core::error::SessionError;
use kf_core::{CommandOutput, HostSpec, RemoteSession};

use crate::handler::ClientHandler;

/// Authenticated connection to one host
///
/// Every command runs on its own channel. The SFTP subsystem is started on
/// first use and reused for the rest of the session.
pub struct SshSession {
    host: HostSpec,
    handle: Handle<ClientHandler>,
    sftp: OnceCell<SftpSession>,
}

impl SshSession {
    pub(crate) fn new(host: HostSpec, handle: Handle<ClientHandler>) -> Self {
        Self {
            host,
            handle,
            sftp: OnceCell::new(),
        }
    }

    async fn sftp(&self, path: &str) -> Result<&SftpSession, SessionError> {
        self.sftp
            .get_or_try_init(|| async {
                let sftp_err = |reason: String| SessionError::Sftp {
                    path: path.to_string(),
                    reason,
                };
                let channel = self
                    .handle
                    .channel_open_session()
                    .await
                    .map_err(|e| SessionError::Channel(e.to_string()))?;
                channel
                    .request_subsystem(true, "sftp")
                    .await
                    .map_err(|e| sftp_err(format!("subsystem request failed: {}", e)))?;
                let sftp = SftpSession::new(channel.into_stream())
                    .await
                    .map_err(|e| sftp_err(e.to_string()))?;
                tracing::debug!("SFTP subsystem started on {}", self.host);
                Ok::<_, SessionError>(sftp)
            })
            .await
    }
}

fn sftp_error(path: &str, error: impl std::fmt::Display) -> SessionError {
    SessionError::Sftp {
        path: path.to_string(),
        reason: error.to_string(),
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    fn host(&self) -> &HostSpec {
        &self.host
    }

    async fn exec(&self, command: &str) -> Result<CommandOutput, SessionError> {
        let exec_err = |reason: String| SessionError::Exec {
            command: command.to_string(),
            reason,
        };

        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| SessionError::Channel(e.to_string()))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| exec_err(e.to_string()))?;
        tracing::debug!("{}: {}", self.host, command);

        let mut output = CommandOutput::default();
        let mut exit_status = None;
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => output.stdout.extend_from_slice(&data),
                ChannelMsg::ExtendedData { data, ext } if ext == 1 => {
                    output.stderr.extend_from_slice(&data)
                }
                ChannelMsg::ExitStatus { exit_status: status } => exit_status = Some(status),
                ChannelMsg::Close => break,
                _ => {}
            }
        }

        output.exit_status =
            exit_status.ok_or_else(|| exec_err("channel closed without exit status".to_string()))?;
        Ok(output)
    }

    async fn read_file(&self, path: &str) -> Result<Option<Vec<u8>>, SessionError> {
        let sftp = self.sftp(path).await?;
        if !sftp.try_exists(path).await.map_err(|e| sftp_error(path, e))? {
            return Ok(None);
        }
        let data = sftp.read(path).await.map_err(|e| sftp_error(path, e))?;
        tracing::debug!("Read {} bytes from {}:{}", data.len(), self.host, path);
        Ok(Some(data))
    }

    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<(), SessionError> {
        let sftp = self.sftp(path).await?;
        let mut file = sftp.create(path).await.map_err(|e| sftp_error(path, e))?;
        file.write_all(contents)
            .await
            .map_err(|e| sftp_error(path, e))?;
        file.shutdown().await.map_err(|e| sftp_error(path, e))?;
        tracing::debug!("Wrote {} bytes to {}:{}", contents.len(), self.host, path);
        Ok(())
    }

    async fn file_size(&self, path: &str) -> Result<Option<u64>, SessionError> {
        let sftp = self.sftp(path).await?;
        if !sftp.try_exists(path).await.map_err(|e| sftp_error(path, e))? {
            return Ok(None);
        }
        let attrs = sftp.metadata(path).await.map_err(|e| sftp_error(path, e))?;
        Ok(Some(attrs.size.unwrap_or(0)))
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(|e| SessionError::Channel(e.to_string()))?;
        tracing::debug!("Disconnected from {}", self.host);
        Ok(())
    }
}
