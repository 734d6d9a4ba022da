//! Remote session traits

use async_trait::async_trait;

use crate::error::SessionError;
use crate::types::HostSpec;

/// Result of a remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output
    pub stdout: Vec<u8>,
    /// Standard error
    pub stderr: Vec<u8>,
    /// Exit status reported by the remote side
    pub exit_status: u32,
}

impl CommandOutput {
    /// Whether the command exited with status 0
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }

    /// Standard output as text
    pub fn stdout_string(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Standard error as text
    pub fn stderr_string(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// An authenticated session on one host
///
/// Relative paths are resolved against the login directory.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Host this session is connected to
    fn host(&self) -> &HostSpec;

    /// Run a command through the login shell and collect its output
    async fn exec(&self, command: &str) -> Result<CommandOutput, SessionError>;

    /// Read a whole file; `None` when it does not exist
    async fn read_file(&self, path: &str) -> Result<Option<Vec<u8>>, SessionError>;

    /// Create or truncate a file and write `contents` to it
    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<(), SessionError>;

    /// Size of a file; `None` when it does not exist
    async fn file_size(&self, path: &str) -> Result<Option<u64>, SessionError>;

    /// Close the session
    async fn close(&self) -> Result<(), SessionError>;
}
