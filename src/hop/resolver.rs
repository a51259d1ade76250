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

//! Recursive construction of tunnel chains.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::endpoint::{close_then_release, Endpoint, SessionLease};
use super::pool::{SessionPool, SessionTracker};
use crate::error::{Error, Result};
use crate::gateway::{ConnectTarget, GatewayConnector, GatewaySession};
use crate::host::{HostDescriptor, HostRegistry};
use crate::profile::{ConnectionProfile, ProfileResolver};

/// Default limit on the number of gateways between the runner and a host.
pub const DEFAULT_MAX_CHAIN_DEPTH: usize = 16;

type EndpointFuture<'a> = Pin<Box<dyn Future<Output = Result<Endpoint>> + Send + 'a>>;

/// Produces reachable endpoints for host services, tunneling through the
/// hosts' `from` chains as needed.
///
/// Every resolution opens its own gateway sessions unless session sharing is
/// enabled, in which case sessions are pooled per gateway host and closed
/// when their last user releases them.
pub struct HopResolver {
    registry: Arc<HostRegistry>,
    profiles: ProfileResolver,
    connector: Arc<dyn GatewayConnector>,
    tracker: Arc<SessionTracker>,
    pool: Option<Arc<SessionPool>>,
    max_chain_depth: usize,
}

impl HopResolver {
    pub fn new(
        registry: Arc<HostRegistry>,
        profiles: ProfileResolver,
        connector: Arc<dyn GatewayConnector>,
    ) -> Self {
        Self {
            registry,
            profiles,
            connector,
            tracker: Arc::new(SessionTracker::default()),
            pool: None,
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
        }
    }

    /// Share one session per gateway host between concurrent resolutions.
    pub fn with_session_sharing(mut self, enabled: bool) -> Self {
        self.pool = enabled.then(|| Arc::new(SessionPool::new()));
        self
    }

    pub fn with_max_chain_depth(mut self, depth: usize) -> Self {
        self.max_chain_depth = depth;
        self
    }

    pub fn registry(&self) -> &Arc<HostRegistry> {
        &self.registry
    }

    pub fn profiles(&self) -> &ProfileResolver {
        &self.profiles
    }

    pub fn connector(&self) -> &Arc<dyn GatewayConnector> {
        &self.connector
    }

    /// Number of gateway sessions currently open.
    pub fn open_sessions(&self) -> usize {
        self.tracker.len()
    }

    /// Number of live users of the pooled session to `gateway`; always zero
    /// without session sharing.
    pub async fn pooled_leases(&self, gateway: &str) -> usize {
        match &self.pool {
            Some(pool) => pool.leases(gateway).await,
            None => 0,
        }
    }

    /// Resolve a reachable endpoint for `port` on host `name`.
    ///
    /// The whole `from` chain is validated before any connection is made.
    /// If any step fails, everything acquired so far is released, innermost
    /// first, before the error is returned.
    pub async fn resolve(&self, name: &str, port: u16) -> Result<Endpoint> {
        let chain = self.registry.chain(name)?;
        self.check_depth(name, chain.len() - 1)?;

        let target = Arc::clone(&chain[0]);
        let address = target.address().to_string();
        let endpoint = self.reach(target, address, port).await?;
        debug!("Resolved {}:{} to {}", name, port, endpoint);
        Ok(endpoint)
    }

    /// Resolve an endpoint, hand it to `probe` and release it afterwards,
    /// whatever the probe returns.
    pub async fn with_endpoint<F, Fut, T>(&self, name: &str, port: u16, probe: F) -> Result<T>
    where
        F: FnOnce(String, u16) -> Fut,
        Fut: Future<Output = T>,
    {
        let endpoint = self.resolve(name, port).await?;
        let output = probe(endpoint.host().to_string(), endpoint.port()).await;
        endpoint.release().await?;
        Ok(output)
    }

    /// Close every session still open, pooled or not.
    pub async fn close_all(&self) -> Result<()> {
        let mut first_error = None;
        let mut closed = 0usize;

        if let Some(pool) = &self.pool {
            for entry in pool.drain().await {
                closed += 1;
                if let Err(e) = close_then_release(&self.tracker, entry.session, entry.upstream).await
                {
                    first_error.get_or_insert(e);
                }
            }
        }

        for session in self.tracker.drain() {
            closed += 1;
            if let Err(e) = session.close().await {
                warn!("Failed to close session to {}: {}", session.host(), e);
                first_error.get_or_insert(e);
            }
        }

        if closed > 0 {
            info!("Closed {} remaining gateway sessions", closed);
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Open a session to host `gateway` (reached through its own chain) and
    /// forward a loopback port to `remote_host:remote_port` as seen from it.
    pub async fn open_tunnel(
        &self,
        gateway: &str,
        remote_host: &str,
        remote_port: u16,
    ) -> Result<Endpoint> {
        let chain = self.registry.chain(gateway)?;
        self.check_depth(gateway, chain.len())?;
        self.forward_through(Arc::clone(&chain[0]), remote_host.to_string(), remote_port)
            .await
    }

    fn check_depth(&self, name: &str, gateways: usize) -> Result<()> {
        if gateways > self.max_chain_depth {
            return Err(Error::configuration(
                name,
                format!(
                    "host chain is {gateways} hops deep, limit is {}",
                    self.max_chain_depth
                ),
            ));
        }
        Ok(())
    }

    /// Reach `target_host:target_port` as seen from `host`'s network.
    ///
    /// A direct host needs nothing. A proxied host needs a session to its
    /// upstream, which in turn needs the upstream's SSH port reached.
    fn reach(&self, host: Arc<HostDescriptor>, target_host: String, target_port: u16) -> EndpointFuture<'_> {
        Box::pin(async move {
            let Some(upstream_name) = host.from() else {
                return Ok(Endpoint::direct(target_host, target_port));
            };
            let gateway = self.registry.find(upstream_name)?;
            self.forward_through(gateway, target_host, target_port).await
        })
    }

    /// Forward to `target_host:target_port` through a session to `gateway`.
    fn forward_through(
        &self,
        gateway: Arc<HostDescriptor>,
        target_host: String,
        target_port: u16,
    ) -> EndpointFuture<'_> {
        Box::pin(async move {
            let profile = self.profiles.resolve(&gateway).await?;
            let lease = self.lease_session(&gateway, &profile).await?;

            let forward = match lease.session().forward(&target_host, target_port).await {
                Ok(forward) => forward,
                Err(e) => {
                    if let Err(release_error) = lease.release().await {
                        warn!(
                            "Release after failed forward through {} also failed: {}",
                            gateway.name(),
                            release_error
                        );
                    }
                    return Err(e);
                }
            };

            debug!(
                "tunnel: localhost:{} -> {} -> {}:{}",
                forward.local_port(),
                gateway.address(),
                target_host,
                target_port
            );
            Ok(Endpoint::tunneled(forward, lease))
        })
    }

    /// A session to `gateway`, owned or pooled.
    async fn lease_session(
        &self,
        gateway: &Arc<HostDescriptor>,
        profile: &Arc<ConnectionProfile>,
    ) -> Result<SessionLease> {
        let Some(pool) = &self.pool else {
            let (session, upstream) = self.open_gateway(gateway, profile).await?;
            return Ok(SessionLease::Owned {
                session,
                upstream: Box::new(upstream),
                tracker: Arc::clone(&self.tracker),
            });
        };

        let (session, stale) = pool
            .acquire(gateway.name(), self.open_gateway(gateway, profile))
            .await;
        if let Some(stale) = stale {
            debug!("Discarding closed pooled session to {}", gateway.name());
            if let Err(e) = close_then_release(&self.tracker, stale.session, stale.upstream).await {
                warn!("Failed to dispose of stale session to {}: {}", gateway.name(), e);
            }
        }
        Ok(SessionLease::Pooled {
            key: gateway.name().to_string(),
            session: session?,
            pool: Arc::clone(pool),
            tracker: Arc::clone(&self.tracker),
        })
    }

    /// Open a new session to `gateway`, reaching its SSH port first.
    async fn open_gateway(
        &self,
        gateway: &Arc<HostDescriptor>,
        profile: &Arc<ConnectionProfile>,
    ) -> Result<(Arc<dyn GatewaySession>, Endpoint)> {
        let upstream = self
            .reach(Arc::clone(gateway), profile.host_name.clone(), profile.port)
            .await?;

        let via = ConnectTarget {
            dial_host: upstream.host().to_string(),
            dial_port: upstream.port(),
            known_host_name: profile.host_name.clone(),
            known_host_port: profile.port,
        };

        match self.connector.open_session(profile, &via).await {
            Ok(session) => {
                self.tracker.track(&session);
                debug!(
                    "Opened gateway session {} to {} via {}",
                    session.id(),
                    gateway.name(),
                    upstream
                );
                Ok((session, upstream))
            }
            Err(e) => {
                if let Err(release_error) = upstream.release().await {
                    warn!(
                        "Release after failed connection to {} also failed: {}",
                        gateway.name(),
                        release_error
                    );
                }
                Err(e)
            }
        }
    }
}
