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

use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::forward::{spawn_listener, TunnelHandle};
use super::{ConnectTarget, GatewayConnector, GatewaySession, GatewayTimeouts};
use crate::error::{Error, Result, Stage};
use crate::profile::ConnectionProfile;
use crate::ssh::tokio_client::{self, Client};

/// Opens russh backed gateway sessions.
#[derive(Debug, Clone, Default)]
pub struct SshConnector {
    timeouts: GatewayTimeouts,
}

impl SshConnector {
    pub fn new(timeouts: GatewayTimeouts) -> Self {
        Self { timeouts }
    }

    /// Connect and authenticate, returning the concrete session type.
    pub async fn connect(
        &self,
        profile: &ConnectionProfile,
        via: &ConnectTarget,
    ) -> Result<SshSession> {
        let address = format!("{}:{}", via.dial_host, via.dial_port);
        debug!(
            "Connecting to {} ({}) via {}",
            profile.host,
            profile.to_connection_string(),
            address
        );

        let auth_methods = profile.auth_methods();
        let connect = Client::connect(
            via,
            &profile.user,
            &auth_methods,
            profile.server_check(),
            tokio_client::Config::default(),
        );
        let client = match tokio::time::timeout(self.timeouts.connect, connect).await {
            Ok(Ok(client)) => client,
            Ok(Err(e)) if e.is_authentication_failure() => {
                return Err(Error::Authentication {
                    host: profile.host.clone(),
                    address,
                    user: profile.user.clone(),
                    reason: e.to_string(),
                })
            }
            Ok(Err(e)) => {
                return Err(Error::Connection {
                    host: profile.host.clone(),
                    address,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(Error::Timeout {
                    host: profile.host.clone(),
                    stage: Stage::Connection,
                    after: self.timeouts.connect,
                })
            }
        };

        let session = SshSession {
            id: Uuid::new_v4(),
            host: profile.host.clone(),
            client,
            timeouts: self.timeouts,
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        };
        info!(
            "Opened session {} to {} as {}",
            session.id, session.host, profile.user
        );
        Ok(session)
    }
}

#[async_trait]
impl GatewayConnector for SshConnector {
    async fn open_session(
        &self,
        profile: &ConnectionProfile,
        via: &ConnectTarget,
    ) -> Result<Arc<dyn GatewaySession>> {
        let session = self.connect(profile, via).await?;
        Ok(Arc::new(session))
    }
}

/// An authenticated russh connection to one gateway host.
pub struct SshSession {
    id: Uuid,
    host: String,
    client: Client,
    timeouts: GatewayTimeouts,
    closed: AtomicBool,
    /// Parent of every forward opened through this session
    cancel: CancellationToken,
}

impl SshSession {
    fn tunnel_error(&self, remote_host: &str, remote_port: u16, reason: String) -> Error {
        Error::Tunnel {
            gateway: self.host.clone(),
            remote_host: remote_host.to_string(),
            remote_port,
            reason,
        }
    }
}

impl fmt::Debug for SshSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshSession")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("address", self.client.address())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[async_trait]
impl GatewaySession for SshSession {
    fn id(&self) -> Uuid {
        self.id
    }

    fn host(&self) -> &str {
        &self.host
    }

    async fn forward(&self, remote_host: &str, remote_port: u16) -> Result<TunnelHandle> {
        if self.is_closed() {
            return Err(self.tunnel_error(remote_host, remote_port, "session is closed".into()));
        }

        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(|e| self.tunnel_error(remote_host, remote_port, format!("bind failed: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| self.tunnel_error(remote_host, remote_port, e.to_string()))?;

        // Probe once so a destination the gateway refuses fails here rather
        // than on the first proxied connection.
        let probe = tokio::time::timeout(
            self.timeouts.connect,
            self.client
                .open_direct_tcpip_channel(remote_host, remote_port, None),
        )
        .await
        .map_err(|_| Error::Timeout {
            host: self.host.clone(),
            stage: Stage::Forwarding,
            after: self.timeouts.connect,
        })?
        .map_err(|e| self.tunnel_error(remote_host, remote_port, e.to_string()))?;
        let _ = probe.close().await;

        let cancel = self.cancel.child_token();
        let task = spawn_listener(
            listener,
            self.client.clone(),
            remote_host.to_string(),
            remote_port,
            cancel.clone(),
        );

        debug!(
            "Session {} forwarding {} -> {}:{}",
            self.id, local_addr, remote_host, remote_port
        );
        Ok(TunnelHandle::new(
            local_addr,
            remote_host,
            remote_port,
            cancel,
            Some(task),
        ))
    }

    async fn execute(&self, command: &str) -> Result<String> {
        let connection_error = |reason: String| Error::Connection {
            host: self.host.clone(),
            address: self.client.address().to_string(),
            reason,
        };
        if self.is_closed() {
            return Err(connection_error("session is closed".to_string()));
        }

        debug!("Executing on {}: {}", self.host, command);
        let result = match tokio::time::timeout(self.timeouts.command, self.client.execute(command)).await {
            Ok(Ok(result)) => result,
            Ok(Err(tokio_client::Error::CommandDidntExit)) => {
                return Err(Error::Execution {
                    host: self.host.clone(),
                    command: command.to_string(),
                    status: None,
                    output: String::new(),
                })
            }
            Ok(Err(e)) => return Err(connection_error(e.to_string())),
            Err(_) => {
                return Err(Error::Timeout {
                    host: self.host.clone(),
                    stage: Stage::Execution,
                    after: self.timeouts.command,
                })
            }
        };

        if !result.success() {
            return Err(Error::Execution {
                host: self.host.clone(),
                command: command.to_string(),
                status: result.exit_status,
                output: result.output,
            });
        }
        Ok(result.output)
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.cancel.cancel();
        if let Err(e) = self.client.disconnect().await {
            // The peer may already be gone; the session is closed either way.
            debug!("Disconnect from {} reported: {}", self.host, e);
        }
        info!("Closed session {} to {}", self.id, self.host);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.client.is_closed()
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
