// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Scripted gateway and provisioning fakes that record what happens to them.

#![allow(dead_code)]

use async_trait::async_trait;
use hopssh::gateway::ConnectTarget;
use hopssh::{
    ConnectionProfile, Error, GatewayConnector, GatewaySession, HostDescriptor, HostOptions,
    HostRegistry, HopResolver, ProfileResolver, Provisioner, Result, SshOptions, TunnelHandle,
    VagrantOption,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Ordered log of gateway activity.
#[derive(Debug, Clone, Default)]
pub struct Events(Arc<Mutex<Vec<String>>>);

impl Events {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn all(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.all().iter().filter(|e| e.starts_with(prefix)).count()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

/// Connector whose sessions forward through real loopback listeners but
/// never touch the network beyond them.
#[derive(Default)]
pub struct FakeConnector {
    pub events: Events,
    /// Hosts whose authentication fails
    pub reject: Mutex<HashSet<String>>,
    /// Ports every session refuses to forward to
    pub refused_ports: Mutex<HashSet<u16>>,
    /// Every session opened, in order
    pub sessions: Mutex<Vec<Arc<FakeSession>>>,
}

impl FakeConnector {
    pub fn new(events: Events) -> Self {
        Self {
            events,
            ..Self::default()
        }
    }

    pub fn reject_host(&self, host: &str) {
        self.reject.lock().unwrap().insert(host.to_string());
    }

    pub fn refuse_port(&self, port: u16) {
        self.refused_ports.lock().unwrap().insert(port);
    }

    /// The most recently opened session to `host`.
    pub fn last_session(&self, host: &str) -> Arc<FakeSession> {
        self.sessions
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|s| s.host == host)
            .cloned()
            .unwrap()
    }
}

#[async_trait]
impl GatewayConnector for FakeConnector {
    async fn open_session(
        &self,
        profile: &ConnectionProfile,
        via: &ConnectTarget,
    ) -> Result<Arc<dyn GatewaySession>> {
        if self.reject.lock().unwrap().contains(&profile.host) {
            self.events.push(format!("reject {}", profile.host));
            return Err(Error::Authentication {
                host: profile.host.clone(),
                address: format!("{}:{}", via.dial_host, via.dial_port),
                user: profile.user.clone(),
                reason: "Password authentication failed".to_string(),
            });
        }

        self.events.push(format!(
            "open {} via {}:{}",
            profile.host, via.dial_host, via.dial_port
        ));
        let session = Arc::new(FakeSession {
            id: Uuid::new_v4(),
            host: profile.host.clone(),
            events: self.events.clone(),
            refused_ports: self.refused_ports.lock().unwrap().clone(),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        });
        self.sessions.lock().unwrap().push(Arc::clone(&session));
        let session: Arc<dyn GatewaySession> = session;
        Ok(session)
    }
}

#[derive(Debug)]
pub struct FakeSession {
    id: Uuid,
    host: String,
    events: Events,
    refused_ports: HashSet<u16>,
    closed: AtomicBool,
    cancel: CancellationToken,
}

#[async_trait]
impl GatewaySession for FakeSession {
    fn id(&self) -> Uuid {
        self.id
    }

    fn host(&self) -> &str {
        &self.host
    }

    async fn forward(&self, remote_host: &str, remote_port: u16) -> Result<TunnelHandle> {
        let path = format!("{}->{}:{}", self.host, remote_host, remote_port);
        if self.refused_ports.contains(&remote_port) {
            self.events.push(format!("refused {path}"));
            return Err(Error::Tunnel {
                gateway: self.host.clone(),
                remote_host: remote_host.to_string(),
                remote_port,
                reason: "Connection refused".to_string(),
            });
        }

        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let local_addr = listener.local_addr().unwrap();
        let cancel = self.cancel.child_token();
        let stop = cancel.clone();
        let events = self.events.clone();
        let closed_path = path.clone();
        let task = tokio::spawn(async move {
            stop.cancelled().await;
            drop(listener);
            events.push(format!("unforward {closed_path}"));
        });

        self.events.push(format!("forward {path}"));
        Ok(TunnelHandle::new(
            local_addr,
            remote_host,
            remote_port,
            cancel,
            Some(task),
        ))
    }

    async fn execute(&self, command: &str) -> Result<String> {
        self.events.push(format!("exec {}: {}", self.host, command));
        if let Some(rest) = command.strip_prefix("exit ") {
            let status: u32 = rest.trim().parse().unwrap_or(1);
            return Err(Error::Execution {
                host: self.host.clone(),
                command: command.to_string(),
                status: Some(status),
                output: "partial output\n".to_string(),
            });
        }
        Ok(format!("{} says {}\n", self.host, command))
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.cancel.cancel();
            self.events.push(format!("close {}", self.host));
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Provisioner answering from a table of machine name to outcome.
#[derive(Default)]
pub struct FakeProvisioner {
    pub answers: HashMap<String, std::result::Result<String, i32>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeProvisioner {
    pub fn answer(mut self, machine: &str, config: &str) -> Self {
        self.answers.insert(machine.to_string(), Ok(config.to_string()));
        self
    }

    pub fn fail(mut self, machine: &str, status: i32) -> Self {
        self.answers.insert(machine.to_string(), Err(status));
        self
    }
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    async fn ssh_config(&self, host: &str, machine: &str) -> Result<String> {
        self.calls.lock().unwrap().push(machine.to_string());
        match self.answers.get(machine) {
            Some(Ok(config)) => Ok(config.clone()),
            Some(Err(status)) => Err(Error::Provisioning {
                host: host.to_string(),
                name: machine.to_string(),
                status: Some(*status),
                message: "The VM is not running".to_string(),
            }),
            None => Err(Error::Provisioning {
                host: host.to_string(),
                name: machine.to_string(),
                status: Some(1),
                message: format!("machine '{machine}' is not defined"),
            }),
        }
    }
}

/// Host with explicit ssh options.
pub fn ssh_host(name: &str, address: &str, from: Option<&str>) -> HostDescriptor {
    HostDescriptor::new(
        name,
        address,
        HostOptions {
            ssh: Some(SshOptions {
                user: Some("admin".to_string()),
                ..SshOptions::default()
            }),
            vagrant: None,
            from: from.map(str::to_string),
        },
    )
}

/// Host provisioned by the fake provisioner under its own name.
pub fn vagrant_host(name: &str, address: &str, from: Option<&str>) -> HostDescriptor {
    HostDescriptor::new(
        name,
        address,
        HostOptions {
            ssh: None,
            vagrant: Some(VagrantOption::Enabled(true)),
            from: from.map(str::to_string),
        },
    )
}

pub struct Harness {
    pub events: Events,
    pub registry: Arc<HostRegistry>,
    pub connector: Arc<FakeConnector>,
    pub provisioner: Arc<FakeProvisioner>,
    pub resolver: HopResolver,
}

impl Harness {
    pub fn new(hosts: Vec<HostDescriptor>) -> Self {
        Self::build(hosts, FakeProvisioner::default(), false)
    }

    pub fn build(hosts: Vec<HostDescriptor>, provisioner: FakeProvisioner, share: bool) -> Self {
        let events = Events::default();
        let registry = Arc::new(HostRegistry::new());
        registry.register_all(hosts);
        let connector = Arc::new(FakeConnector::new(events.clone()));
        let provisioner = Arc::new(provisioner);
        let resolver = HopResolver::new(
            Arc::clone(&registry),
            ProfileResolver::new(provisioner.clone()),
            connector.clone(),
        )
        .with_session_sharing(share);

        Self {
            events,
            registry,
            connector,
            provisioner,
            resolver,
        }
    }
}
