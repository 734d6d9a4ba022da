//! Prints run events as they arrive

use kf_core::CommitOutcome;
use kf_orchestrator::{EventSink, HostStatus, RunEvent};

use crate::output::{
    format_changes, format_keys, print_error, print_header, print_info, print_success,
};

/// [`EventSink`] writing to the terminal
///
/// Events are printed synchronously so that output for a host always
/// appears before the next interactive prompt. With `quiet` set only
/// errors and requested data (key tables, command output) are shown.
#[derive(Debug, Default)]
pub struct TerminalReporter {
    quiet: bool,
}

impl TerminalReporter {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    fn info(&self, msg: &str) {
        if !self.quiet {
            print_info(msg);
        }
    }

    fn success(&self, msg: &str) {
        if !self.quiet {
            print_success(msg);
        }
    }

    fn header(&self, msg: &str) {
        if !self.quiet {
            print_header(msg);
        }
    }
}

impl EventSink for TerminalReporter {
    fn emit(&self, event: RunEvent) {
        match event {
            RunEvent::GatewayOpening { gateway } => self.header(&format!("Gateway: {}", gateway)),
            RunEvent::GatewayFailed { gateway, error } => print_error(&format!(
                "Gateway {} unreachable, skipping its hosts: {}",
                gateway, error
            )),
            RunEvent::GatewayClosed { .. } => {}
            RunEvent::HostStarted { host } => self.header(&format!("Host: {}", host)),
            RunEvent::KeysListed { keys, .. } => println!("{}", format_keys(&keys)),
            RunEvent::KeysReconciled {
                host,
                source,
                changes,
                error,
            } => {
                if !self.quiet {
                    println!("{}", format_changes(&source, &changes));
                }
                if let Some(error) = error {
                    print_error(&format!("{}: {}", host, error));
                }
            }
            RunEvent::Committed { host, outcome } => match outcome {
                CommitOutcome::Unchanged => self.info(&format!("{}: no changes to commit", host)),
                CommitOutcome::Activated { bytes, backup } => self.success(&format!(
                    "{}: authorized_keys updated ({} bytes, backup {})",
                    host, bytes, backup
                )),
            },
            RunEvent::CommandFinished { output, .. } => {
                let stdout = output.stdout_string();
                if !stdout.trim_end().is_empty() {
                    println!("{}", stdout.trim_end());
                }
                let stderr = output.stderr_string();
                if !stderr.trim_end().is_empty() {
                    eprintln!("{}", stderr.trim_end());
                }
            }
            RunEvent::Uploaded {
                host,
                remote_path,
                bytes,
            } => self.success(&format!("{}: uploaded {} ({} bytes)", host, remote_path, bytes)),
            RunEvent::HostFinished { host, status } => match status {
                HostStatus::Succeeded => {}
                HostStatus::Skipped => self.info(&format!("{} skipped", host)),
                HostStatus::Failed(reason) => print_error(&format!("{}: {}", host, reason)),
            },
            RunEvent::Quit => self.info("Quitting"),
        }
    }
}
