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

//! Gateway sessions: one authenticated SSH connection to one host, able to
//! open loopback forwards and run commands.
//!
//! # Architecture
//!
//! ```text
//! [Probe] → [127.0.0.1:local_port] → [SSH session to gateway] → [remote_host:remote_port]
//! ```
//!
//! [`GatewayConnector`] and [`GatewaySession`] are traits so the hop
//! resolver can be driven without a network; [`SshConnector`] is the russh
//! backed implementation.

mod forward;
mod ssh;

pub use forward::TunnelHandle;
pub use ssh::{SshConnector, SshSession};

pub use crate::ssh::tokio_client::ConnectTarget;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::Result;
use crate::profile::ConnectionProfile;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// Timeouts applied by gateway sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayTimeouts {
    /// TCP connect, handshake, authentication and channel open
    pub connect: Duration,
    /// One remote command, start to exit
    pub command: Duration,
}

impl Default for GatewayTimeouts {
    fn default() -> Self {
        Self {
            connect: DEFAULT_CONNECT_TIMEOUT,
            command: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

/// Opens gateway sessions.
#[async_trait]
pub trait GatewayConnector: Send + Sync {
    /// Connect to `via` and authenticate with `profile`.
    ///
    /// `via` is either the gateway's own address or a loopback endpoint that
    /// an upstream tunnel forwards to it.
    async fn open_session(
        &self,
        profile: &ConnectionProfile,
        via: &ConnectTarget,
    ) -> Result<Arc<dyn GatewaySession>>;
}

/// An authenticated session to one gateway host.
///
/// Serves any number of concurrent forwards until closed. `close` is
/// idempotent and stops every forward opened through the session.
#[async_trait]
pub trait GatewaySession: Send + Sync + fmt::Debug {
    fn id(&self) -> Uuid;

    /// Name of the host this session is connected to.
    fn host(&self) -> &str;

    /// Listen on an ephemeral loopback port and forward every accepted
    /// connection to `remote_host:remote_port` as seen from the gateway.
    async fn forward(&self, remote_host: &str, remote_port: u16) -> Result<TunnelHandle>;

    /// Run `command` and return its interleaved stdout and stderr.
    async fn execute(&self, command: &str) -> Result<String>;

    async fn close(&self) -> Result<()>;

    fn is_closed(&self) -> bool;
}
