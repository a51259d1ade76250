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

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, warn};

use super::pool::{SessionPool, SessionTracker};
use crate::error::Result;
use crate::gateway::{GatewaySession, TunnelHandle};

type ReleaseFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// How an endpoint holds the gateway session its forward runs through.
pub(crate) enum SessionLease {
    /// Opened for this endpoint alone; closed on release.
    Owned {
        session: Arc<dyn GatewaySession>,
        upstream: Box<Endpoint>,
        tracker: Arc<SessionTracker>,
    },
    /// Shared through the pool; closed when the last lease is released.
    Pooled {
        key: String,
        session: Arc<dyn GatewaySession>,
        pool: Arc<SessionPool>,
        tracker: Arc<SessionTracker>,
    },
}

impl SessionLease {
    pub(crate) fn session(&self) -> &Arc<dyn GatewaySession> {
        match self {
            SessionLease::Owned { session, .. } | SessionLease::Pooled { session, .. } => session,
        }
    }

    /// Close the session (or drop the lease on it), then release the
    /// endpoint it was reached through.
    pub(crate) fn release(self) -> ReleaseFuture {
        Box::pin(async move {
            match self {
                SessionLease::Owned {
                    session,
                    upstream,
                    tracker,
                } => close_then_release(&tracker, session, *upstream).await,
                SessionLease::Pooled {
                    key,
                    session,
                    pool,
                    tracker,
                } => match pool.release(&key, session.id()).await {
                    Some(entry) => close_then_release(&tracker, entry.session, entry.upstream).await,
                    None => Ok(()),
                },
            }
        })
    }
}

pub(crate) async fn close_then_release(
    tracker: &SessionTracker,
    session: Arc<dyn GatewaySession>,
    upstream: Endpoint,
) -> Result<()> {
    let closed = tracker.close(&session).await;
    if let Err(e) = &closed {
        warn!("Failed to close session to {}: {}", session.host(), e);
    }
    let released = upstream.release().await;
    closed.and(released)
}

/// A reachable address for a host's service.
///
/// For a directly reachable host this is the host's own address and the
/// requested port. For a proxied host it is a loopback port forwarded
/// through the chain of gateway sessions, which [`Endpoint::release`] tears
/// down innermost first: the forward, then this endpoint's gateway session,
/// then the endpoint that session was reached through.
///
/// An endpoint dropped without being released is released in a background
/// task, if a runtime is available.
pub struct Endpoint {
    host: String,
    port: u16,
    forward: Option<TunnelHandle>,
    lease: Option<SessionLease>,
}

impl Endpoint {
    pub fn direct(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            forward: None,
            lease: None,
        }
    }

    pub(crate) fn tunneled(forward: TunnelHandle, lease: SessionLease) -> Self {
        Self {
            host: forward.local_addr().ip().to_string(),
            port: forward.local_port(),
            forward: Some(forward),
            lease: Some(lease),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`, with IPv6 literals bracketed.
    pub fn socket_string(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn is_tunneled(&self) -> bool {
        self.forward.is_some()
    }

    /// Number of gateway sessions this endpoint is reached through.
    pub fn depth(&self) -> usize {
        match &self.lease {
            Some(SessionLease::Owned { upstream, .. }) => 1 + upstream.depth(),
            Some(SessionLease::Pooled { .. }) => 1,
            None => 0,
        }
    }

    /// Tear down everything this endpoint holds.
    ///
    /// Every step runs even if an earlier one fails; the first error is
    /// returned.
    pub fn release(mut self) -> ReleaseFuture {
        let forward = self.forward.take();
        let lease = self.lease.take();
        let label = self.socket_string();
        Box::pin(release_parts(label, forward, lease))
    }
}

async fn release_parts(
    label: String,
    forward: Option<TunnelHandle>,
    lease: Option<SessionLease>,
) -> Result<()> {
    if forward.is_none() && lease.is_none() {
        return Ok(());
    }
    if let Some(mut forward) = forward {
        forward.release().await;
    }
    let result = match lease {
        Some(lease) => lease.release().await,
        None => Ok(()),
    };
    debug!("Released endpoint {}", label);
    result
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tunneled", &self.is_tunneled())
            .field("depth", &self.depth())
            .finish()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.socket_string())
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        if self.forward.is_none() && self.lease.is_none() {
            return;
        }
        let forward = self.forward.take();
        let lease = self.lease.take();
        let label = self.socket_string();
        warn!("Endpoint {} dropped without release", label);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = release_parts(label, forward, lease).await {
                        warn!("Background release failed: {}", e);
                    }
                });
            }
            // Forwards stop when their handles drop; sessions close when the
            // last reference goes away.
            Err(_) => drop((forward, lease)),
        }
    }
}
