//! Per-host processing
//!
//! For every host the orchestrator optionally asks the user whether to go
//! on, connects (retrying with a typed password when key authentication
//! is rejected), runs the action and closes the session again. Errors on
//! one host are reported and never stop the run; only a quit at the
//! interactive prompt does.

use std::path::Path;

use async_trait::async_trait;

use kf_core::error::{ConnectionError, SessionError};
use kf_core::shell::quote;
use kf_core::{
    CommandOutput, Connector, HostDecision, HostSpec, KeyIntent, KeyList, KfError, Prompter,
    RemoteSession, Topology,
};
use kf_keys::{KeyFile, DEFAULT_AUTHORIZED_KEYS};

use crate::action::Action;
use crate::events::{
    EventSink, GatewayFailure, HostReport, HostStatus, KeySummary, RunEvent, RunSummary,
};
use crate::walker::{walk, Flow, HostVisitor};

/// Remote name of an uploaded script while it runs
const SCRIPT_PATH: &str = ".keyfleet-script";

/// What a run does
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub action: Action,
    /// Keyfiles for `add`, `remove` and `addremove`
    pub keys: KeyList,
    /// Remote authorized_keys path, relative to the login directory
    pub authorized_keys: String,
    /// Ask before every host
    pub interactive: bool,
}

impl RunOptions {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            keys: KeyList::default(),
            authorized_keys: DEFAULT_AUTHORIZED_KEYS.to_string(),
            interactive: false,
        }
    }
}

/// Runs one action across a topology
pub struct Orchestrator<C, P, E> {
    connector: C,
    prompter: P,
    events: E,
    options: RunOptions,
}

impl<C, P, E> Orchestrator<C, P, E>
where
    C: Connector,
    P: Prompter,
    E: EventSink,
{
    pub fn new(connector: C, prompter: P, events: E, options: RunOptions) -> Self {
        Self {
            connector,
            prompter,
            events,
            options,
        }
    }

    /// Visit every host of `topology` and run the action on it
    pub async fn run(&self, topology: &Topology) -> RunSummary {
        tracing::info!(
            "Running {} on {} host(s)",
            self.options.action,
            topology.host_count()
        );

        let mut runner = HostRunner {
            connector: &self.connector,
            prompter: &self.prompter,
            events: &self.events,
            options: &self.options,
            summary: RunSummary::default(),
        };
        let mut chain = Vec::new();
        let flow = walk(&self.connector, topology.nodes(), &mut chain, &mut runner).await;

        let mut summary = runner.summary;
        summary.quit = flow == Flow::Leave;
        summary
    }
}

struct HostRunner<'a, C, P, E> {
    connector: &'a C,
    prompter: &'a P,
    events: &'a E,
    options: &'a RunOptions,
    summary: RunSummary,
}

#[async_trait]
impl<'a, C, P, E> HostVisitor<C::Tunnel> for HostRunner<'a, C, P, E>
where
    C: Connector,
    P: Prompter,
    E: EventSink,
{
    async fn visit_host(&mut self, host: &HostSpec, via: Option<&C::Tunnel>) -> Flow {
        self.events.emit(RunEvent::HostStarted { host: host.clone() });

        if self.options.interactive {
            match self.prompter.confirm_host(host) {
                Ok(HostDecision::Continue) => {}
                Ok(HostDecision::Skip) => {
                    tracing::info!("Skipping {}", host);
                    self.finish(host, HostStatus::Skipped);
                    return Flow::Continue;
                }
                Ok(HostDecision::Quit) => {
                    tracing::info!("Quit requested at {}", host);
                    self.events.emit(RunEvent::Quit);
                    return Flow::Leave;
                }
                Err(e) => {
                    tracing::error!("Cannot read answer from terminal: {}", e);
                    self.events.emit(RunEvent::Quit);
                    return Flow::Leave;
                }
            }
        }

        let status = self.process(host, via).await;
        self.finish(host, status);
        Flow::Continue
    }

    fn gateway_opening(&mut self, gateway: &HostSpec) {
        self.events.emit(RunEvent::GatewayOpening {
            gateway: gateway.clone(),
        });
    }

    fn gateway_failed(&mut self, gateway: &HostSpec, error: ConnectionError) {
        let error = error.to_string();
        self.events.emit(RunEvent::GatewayFailed {
            gateway: gateway.clone(),
            error: error.clone(),
        });
        self.summary.gateway_failures.push(GatewayFailure {
            gateway: gateway.clone(),
            error,
        });
    }

    fn gateway_closed(&mut self, gateway: &HostSpec) {
        self.events.emit(RunEvent::GatewayClosed {
            gateway: gateway.clone(),
        });
    }
}

impl<'a, C, P, E> HostRunner<'a, C, P, E>
where
    C: Connector,
    P: Prompter,
    E: EventSink,
{
    fn finish(&mut self, host: &HostSpec, status: HostStatus) {
        self.events.emit(RunEvent::HostFinished {
            host: host.clone(),
            status: status.clone(),
        });
        self.summary.hosts.push(HostReport {
            host: host.clone(),
            status,
        });
    }

    async fn process(&self, host: &HostSpec, via: Option<&C::Tunnel>) -> HostStatus {
        if self.options.action == Action::Ssh {
            return self.passthrough(host, via).await;
        }

        let session = match self.connect(host, via).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!("Error connecting {}, skipping it: {}", host, e);
                return HostStatus::Failed(e.to_string());
            }
        };

        let status = match self.dispatch(host, via, &session).await {
            Ok(status) => status,
            Err(e) => {
                tracing::error!("{} failed on {}: {}", self.options.action.name(), host, e);
                HostStatus::Failed(e.to_string())
            }
        };

        if let Err(e) = session.close().await {
            tracing::warn!("Failed to close session to {}: {}", host, e);
        }
        status
    }

    /// Open a session, asking for a password while authentication fails
    async fn connect(
        &self,
        host: &HostSpec,
        via: Option<&C::Tunnel>,
    ) -> Result<C::Session, ConnectionError> {
        let mut password: Option<String> = None;

        loop {
            match self
                .connector
                .open_session(host, via, password.as_deref())
                .await
            {
                Ok(session) => return Ok(session),
                Err(e) if e.is_auth_failure() => {
                    tracing::warn!("{}", e);
                    match self.prompter.password(host) {
                        Ok(Some(typed)) if !typed.is_empty() => password = Some(typed),
                        Ok(_) => return Err(e),
                        Err(io) => {
                            tracing::error!("Cannot read password: {}", io);
                            return Err(e);
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn passthrough(&self, host: &HostSpec, via: Option<&C::Tunnel>) -> HostStatus {
        match self.connector.passthrough(host, via).await {
            Ok(0) => HostStatus::Succeeded,
            Ok(code) => HostStatus::Failed(format!("ssh exited with status {}", code)),
            Err(e) => {
                tracing::error!("Interactive session to {} failed: {}", host, e);
                HostStatus::Failed(e.to_string())
            }
        }
    }

    async fn dispatch(
        &self,
        host: &HostSpec,
        via: Option<&C::Tunnel>,
        session: &C::Session,
    ) -> Result<HostStatus, KfError> {
        match &self.options.action {
            Action::List => {
                let file = self.read_keys(session).await?;
                let keys = file.keys().map(KeySummary::from).collect();
                self.events.emit(RunEvent::KeysListed {
                    host: host.clone(),
                    keys,
                });
                Ok(HostStatus::Succeeded)
            }
            Action::Add | Action::Remove | Action::AddRemove => self.reconcile(host, session).await,
            Action::Hostname => self.run_command(host, session, "hostname").await,
            Action::Cmd(command) => self.run_command(host, session, command).await,
            Action::Script(path) => self.run_script(host, session, path).await,
            Action::Scp(path) => self.upload(host, session, path).await,
            Action::Ssh => Ok(self.passthrough(host, via).await),
        }
    }

    async fn read_keys(&self, session: &C::Session) -> Result<KeyFile, SessionError> {
        let path = &self.options.authorized_keys;
        Ok(match session.read_file(path).await? {
            Some(bytes) => KeyFile::from_bytes(path.clone(), &bytes),
            None => {
                tracing::debug!("{} does not exist on {} yet", path, session.host());
                KeyFile::new(path.clone())
            }
        })
    }

    async fn reconcile(&self, host: &HostSpec, session: &C::Session) -> Result<HostStatus, KfError> {
        let mut file = self.read_keys(session).await?;
        let mut failed = 0;

        for entry in self.options.keys.entries() {
            let intent = match self.options.action {
                Action::Add => KeyIntent::Add,
                Action::Remove => KeyIntent::Remove,
                _ => entry.intent,
            };
            let result = match intent {
                KeyIntent::Add => file.add_from_file(&entry.path),
                KeyIntent::Remove => file.remove_from_file(&entry.path),
            };
            if !result.is_success() {
                failed += 1;
            }
            self.events.emit(RunEvent::KeysReconciled {
                host: host.clone(),
                source: result.source,
                changes: result.changes,
                error: result.error.map(|e| e.to_string()),
            });
        }

        let outcome = kf_core::commit(&mut file, session).await?;
        self.events.emit(RunEvent::Committed {
            host: host.clone(),
            outcome,
        });

        if failed > 0 {
            Ok(HostStatus::Failed(format!(
                "{} keyfile(s) could not be applied",
                failed
            )))
        } else {
            Ok(HostStatus::Succeeded)
        }
    }

    async fn run_command(
        &self,
        host: &HostSpec,
        session: &C::Session,
        command: &str,
    ) -> Result<HostStatus, KfError> {
        let output = session.exec(command).await?;
        Ok(self.command_finished(host, command.to_string(), output))
    }

    async fn run_script(
        &self,
        host: &HostSpec,
        session: &C::Session,
        path: &Path,
    ) -> Result<HostStatus, KfError> {
        let script = tokio::fs::read(path).await?;
        session.write_file(SCRIPT_PATH, &script).await?;

        let result = session.exec(&format!("sh {}", quote(SCRIPT_PATH))).await;
        if let Err(e) = session.exec(&format!("rm -f {}", quote(SCRIPT_PATH))).await {
            tracing::warn!("Could not remove {} on {}: {}", SCRIPT_PATH, host, e);
        }

        let output = result?;
        Ok(self.command_finished(host, format!("script {}", path.display()), output))
    }

    async fn upload(
        &self,
        host: &HostSpec,
        session: &C::Session,
        path: &Path,
    ) -> Result<HostStatus, KfError> {
        let data = tokio::fs::read(path).await?;
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return Ok(HostStatus::Failed(format!("{} has no file name", path.display())));
        };

        session.write_file(name, &data).await?;
        let wanted = data.len() as u64;
        match session.file_size(name).await? {
            Some(size) if size == wanted => {}
            Some(size) => {
                return Ok(HostStatus::Failed(format!(
                    "uploaded {} is {} bytes, expected {}",
                    name, size, wanted
                )))
            }
            None => return Ok(HostStatus::Failed(format!("uploaded {} is missing", name))),
        }

        tracing::info!("Uploaded {} ({} bytes) to {}", name, wanted, host);
        self.events.emit(RunEvent::Uploaded {
            host: host.clone(),
            remote_path: name.to_string(),
            bytes: wanted,
        });
        Ok(HostStatus::Succeeded)
    }

    fn command_finished(&self, host: &HostSpec, command: String, output: CommandOutput) -> HostStatus {
        let status = if output.success() {
            HostStatus::Succeeded
        } else {
            HostStatus::Failed(format!("{} exited with status {}", command, output.exit_status))
        };
        self.events.emit(RunEvent::CommandFinished {
            host: host.clone(),
            command,
            output,
        });
        status
    }
}
