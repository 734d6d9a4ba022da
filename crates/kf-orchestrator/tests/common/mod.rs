//! In-memory fakes of the connection and prompt capabilities

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use kf_core::error::{ConnectionError, SessionError};
use kf_core::{CommandOutput, Connector, HostDecision, HostSpec, Prompter, RemoteSession};

/// Shared state of the fake fleet
#[derive(Default)]
pub struct Fleet {
    /// Files per host name
    pub files: HashMap<String, HashMap<String, Vec<u8>>>,
    /// Everything the connector and sessions did, in order
    pub log: Vec<String>,
    /// Gateways that refuse connections
    pub dead_gateways: HashSet<String>,
    /// Hosts that refuse connections
    pub dead_hosts: HashSet<String>,
    /// Hosts whose server key does not match known_hosts
    pub changed_host_keys: HashSet<String>,
    /// Hosts that only accept this password
    pub passwords: HashMap<String, String>,
}

#[derive(Clone, Default)]
pub struct FakeConnector {
    pub fleet: Arc<Mutex<Fleet>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<F: FnOnce(&mut Fleet)>(self, f: F) -> Self {
        f(&mut self.fleet.lock().unwrap());
        self
    }

    pub fn log(&self) -> Vec<String> {
        self.fleet.lock().unwrap().log.clone()
    }

    pub fn file(&self, host: &str, path: &str) -> Option<String> {
        self.fleet
            .lock()
            .unwrap()
            .files
            .get(host)
            .and_then(|files| files.get(path))
            .map(|b| String::from_utf8(b.clone()).unwrap())
    }

    pub fn file_bytes(&self, host: &str, path: &str) -> Option<Vec<u8>> {
        self.fleet
            .lock()
            .unwrap()
            .files
            .get(host)
            .and_then(|files| files.get(path))
            .cloned()
    }

    pub fn put_file(&self, host: &str, path: &str, contents: &str) {
        self.put_bytes(host, path, contents.as_bytes());
    }

    pub fn put_bytes(&self, host: &str, path: &str, contents: &[u8]) {
        self.fleet
            .lock()
            .unwrap()
            .files
            .entry(host.to_string())
            .or_default()
            .insert(path.to_string(), contents.to_vec());
    }
}

pub struct FakeTunnel {
    pub name: String,
}

fn via_name(via: Option<&FakeTunnel>) -> &str {
    via.map(|t| t.name.as_str()).unwrap_or("direct")
}

#[async_trait]
impl Connector for FakeConnector {
    type Tunnel = FakeTunnel;
    type Session = FakeSession;

    async fn open_gateway(
        &self,
        gateway: &HostSpec,
        via: Option<&FakeTunnel>,
    ) -> Result<FakeTunnel, ConnectionError> {
        let mut fleet = self.fleet.lock().unwrap();
        if fleet.dead_gateways.contains(gateway.host()) {
            fleet.log.push(format!("refused {}", gateway.host()));
            return Err(ConnectionError::Refused {
                host: gateway.host().to_string(),
            });
        }
        fleet
            .log
            .push(format!("open {} via {}", gateway.host(), via_name(via)));
        Ok(FakeTunnel {
            name: gateway.host().to_string(),
        })
    }

    async fn open_session(
        &self,
        host: &HostSpec,
        via: Option<&FakeTunnel>,
        password: Option<&str>,
    ) -> Result<FakeSession, ConnectionError> {
        let mut fleet = self.fleet.lock().unwrap();
        let name = host.host().to_string();
        fleet.log.push(format!(
            "connect {} via {}{}",
            name,
            via_name(via),
            password.map(|p| format!(" password {}", p)).unwrap_or_default()
        ));

        if fleet.dead_hosts.contains(&name) {
            return Err(ConnectionError::Unreachable {
                host: name,
                reason: "no route to host".to_string(),
            });
        }
        if fleet.changed_host_keys.contains(&name) {
            return Err(ConnectionError::HostKey {
                host: name,
                reason: "key does not match known_hosts".to_string(),
            });
        }
        if let Some(expected) = fleet.passwords.get(&name) {
            if password != Some(expected.as_str()) {
                return Err(ConnectionError::AuthenticationFailed {
                    user: host.user().to_string(),
                    host: name,
                });
            }
        }

        Ok(FakeSession {
            host: host.clone(),
            fleet: Arc::clone(&self.fleet),
        })
    }

    async fn close_gateway(&self, tunnel: FakeTunnel) {
        self.fleet
            .lock()
            .unwrap()
            .log
            .push(format!("close {}", tunnel.name));
    }

    async fn passthrough(
        &self,
        host: &HostSpec,
        via: Option<&FakeTunnel>,
    ) -> Result<i32, ConnectionError> {
        self.fleet
            .lock()
            .unwrap()
            .log
            .push(format!("ssh {} via {}", host.host(), via_name(via)));
        Ok(0)
    }
}

pub struct FakeSession {
    host: HostSpec,
    fleet: Arc<Mutex<Fleet>>,
}

#[async_trait]
impl RemoteSession for FakeSession {
    fn host(&self) -> &HostSpec {
        &self.host
    }

    async fn exec(&self, command: &str) -> Result<CommandOutput, SessionError> {
        let mut fleet = self.fleet.lock().unwrap();
        let name = self.host.host().to_string();
        fleet.log.push(format!("exec {} {}", name, command));

        let files = fleet.files.entry(name.clone()).or_default();
        let words: Vec<&str> = command.split_whitespace().collect();
        let mut out = CommandOutput::default();

        match words.as_slice() {
            ["hostname"] => out.stdout = format!("{}\n", name).into_bytes(),
            ["sh", script] => match files.get(*script) {
                Some(body) => out.stdout = body.clone(),
                None => out.exit_status = 127,
            },
            ["rm", "-f", path] => {
                files.remove(*path);
            }
            ["mv", "-f", from, to] => match files.remove(*from) {
                Some(data) => {
                    files.insert(to.to_string(), data);
                }
                None => out.exit_status = 1,
            },
            ["test", "-f", backup, "||", "cp", "-p", auth, _] => {
                if !files.contains_key(*backup) {
                    match files.get(*auth).cloned() {
                        Some(data) => {
                            files.insert(backup.to_string(), data);
                        }
                        None => out.exit_status = 1,
                    }
                }
            }
            ["false"] => out.exit_status = 1,
            ["test", "-d", ..] => {}
            _ => out.stdout = command.as_bytes().to_vec(),
        }
        Ok(out)
    }

    async fn read_file(&self, path: &str) -> Result<Option<Vec<u8>>, SessionError> {
        let fleet = self.fleet.lock().unwrap();
        Ok(fleet
            .files
            .get(self.host.host())
            .and_then(|files| files.get(path))
            .cloned())
    }

    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<(), SessionError> {
        let mut fleet = self.fleet.lock().unwrap();
        let name = self.host.host().to_string();
        fleet.log.push(format!("write {} {}", name, path));
        fleet
            .files
            .entry(name)
            .or_default()
            .insert(path.to_string(), contents.to_vec());
        Ok(())
    }

    async fn file_size(&self, path: &str) -> Result<Option<u64>, SessionError> {
        let fleet = self.fleet.lock().unwrap();
        Ok(fleet
            .files
            .get(self.host.host())
            .and_then(|files| files.get(path))
            .map(|data| data.len() as u64))
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.fleet
            .lock()
            .unwrap()
            .log
            .push(format!("disconnect {}", self.host.host()));
        Ok(())
    }
}

/// Scripted answers for the interactive prompts
#[derive(Default)]
pub struct FakePrompter {
    decisions: Mutex<VecDeque<HostDecision>>,
    passwords: Mutex<VecDeque<String>>,
    pub password_prompts: Mutex<usize>,
}

impl FakePrompter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decisions(self, decisions: &[HostDecision]) -> Self {
        self.decisions.lock().unwrap().extend(decisions.iter().copied());
        self
    }

    pub fn passwords(self, passwords: &[&str]) -> Self {
        self.passwords
            .lock()
            .unwrap()
            .extend(passwords.iter().map(|p| p.to_string()));
        self
    }

    pub fn password_prompts(&self) -> usize {
        *self.password_prompts.lock().unwrap()
    }
}

impl Prompter for FakePrompter {
    fn confirm_host(&self, _host: &HostSpec) -> std::io::Result<HostDecision> {
        Ok(self
            .decisions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(HostDecision::Continue))
    }

    fn password(&self, _host: &HostSpec) -> std::io::Result<Option<String>> {
        *self.password_prompts.lock().unwrap() += 1;
        Ok(self.passwords.lock().unwrap().pop_front())
    }
}
