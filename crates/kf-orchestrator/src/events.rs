//! Progress reporting for a run

use tokio::sync::mpsc;

use kf_core::{CommandOutput, CommitOutcome, HostSpec};
use kf_keys::{KeyChange, KeyLine};

/// One key as shown by `list`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySummary {
    /// `SHA256:` fingerprint, when the payload decodes
    pub fingerprint: Option<String>,
    pub algorithm: String,
    pub comment: String,
}

impl From<&KeyLine> for KeySummary {
    fn from(key: &KeyLine) -> Self {
        Self {
            fingerprint: key.fingerprint(),
            algorithm: key.algorithm().to_string(),
            comment: key.comment().to_string(),
        }
    }
}

/// Something that happened during a run
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// About to connect to a gateway
    GatewayOpening { gateway: HostSpec },
    /// Gateway could not be reached; its hosts are skipped
    GatewayFailed { gateway: HostSpec, error: String },
    /// Gateway closed after its subtree was done
    GatewayClosed { gateway: HostSpec },
    /// Starting on a host
    HostStarted { host: HostSpec },
    /// Authorized keys of a host
    KeysListed { host: HostSpec, keys: Vec<KeySummary> },
    /// A keyfile was applied (fully, or up to `error`)
    KeysReconciled {
        host: HostSpec,
        source: String,
        changes: Vec<KeyChange>,
        error: Option<String>,
    },
    /// The authorized_keys file was published, or had nothing to publish
    Committed { host: HostSpec, outcome: CommitOutcome },
    /// A remote command finished
    CommandFinished {
        host: HostSpec,
        command: String,
        output: CommandOutput,
    },
    /// A file was uploaded
    Uploaded {
        host: HostSpec,
        remote_path: String,
        bytes: u64,
    },
    /// Done with a host
    HostFinished { host: HostSpec, status: HostStatus },
    /// The user asked to stop
    Quit,
}

/// Receives run events as they happen
pub trait EventSink: Send + Sync {
    fn emit(&self, event: RunEvent);
}

impl EventSink for mpsc::UnboundedSender<RunEvent> {
    fn emit(&self, event: RunEvent) {
        // Receiver gone means nobody is listening any more
        let _ = self.send(event);
    }
}

/// How a host ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostStatus {
    Succeeded,
    /// Skipped at the interactive prompt
    Skipped,
    Failed(String),
}

impl HostStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, HostStatus::Failed(_))
    }
}

/// Final state of one visited host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostReport {
    pub host: HostSpec,
    pub status: HostStatus,
}

/// A gateway that could not be opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayFailure {
    pub gateway: HostSpec,
    pub error: String,
}

/// Outcome of a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Visited hosts in visiting order
    pub hosts: Vec<HostReport>,
    pub gateway_failures: Vec<GatewayFailure>,
    /// Run ended at the user's request
    pub quit: bool,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.count(|s| *s == HostStatus::Succeeded)
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| *s == HostStatus::Skipped)
    }

    pub fn failed(&self) -> usize {
        self.count(HostStatus::is_failure)
    }

    fn count(&self, pred: impl Fn(&HostStatus) -> bool) -> usize {
        self.hosts.iter().filter(|r| pred(&r.status)).count()
    }

    /// Process exit status
    ///
    /// A user quit exits 0; otherwise any failed host or unreachable
    /// gateway makes it 1.
    pub fn exit_code(&self) -> i32 {
        if self.quit {
            0
        } else if self.failed() > 0 || !self.gateway_failures.is_empty() {
            1
        } else {
            0
        }
    }
}
