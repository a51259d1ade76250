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

//! Test-runner integration.
//!
//! A runner drives a [`Suite`] through its hooks:
//!
//! ```text
//! before_suite(hosts)
//!   for each example: before_each(ctx) → probes use resolver()/executor() → after_each(ctx)
//! after_suite()
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Settings;
use crate::error::Result;
use crate::executor::CommandExecutor;
use crate::gateway::{GatewayConnector, SshConnector};
use crate::hop::HopResolver;
use crate::host::{HostDescriptor, HostRegistry};
use crate::profile::ProfileResolver;

/// Per-example hooks of a verification context.
///
/// Both hooks default to doing nothing, so a context implements only what
/// it needs.
#[async_trait]
pub trait VerificationContext: Send {
    async fn before_each(&mut self, _suite: &Suite, _example: &str) -> Result<()> {
        Ok(())
    }

    async fn after_each(&mut self, _suite: &Suite, _example: &str) -> Result<()> {
        Ok(())
    }
}

/// The state one verification run shares between its examples.
pub struct Suite {
    registry: Arc<HostRegistry>,
    resolver: HopResolver,
    executor: CommandExecutor,
}

impl Suite {
    pub fn new(
        registry: Arc<HostRegistry>,
        profiles: ProfileResolver,
        connector: Arc<dyn GatewayConnector>,
        settings: &Settings,
    ) -> Self {
        let resolver = HopResolver::new(
            Arc::clone(&registry),
            profiles.clone(),
            Arc::clone(&connector),
        )
        .with_session_sharing(settings.share_sessions)
        .with_max_chain_depth(settings.max_chain_depth);
        let executor = CommandExecutor::new(Arc::clone(&registry), profiles, connector);

        Self {
            registry,
            resolver,
            executor,
        }
    }

    /// A suite connecting over SSH and provisioning with Vagrant, as
    /// described by `settings`.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            Arc::new(HostRegistry::new()),
            ProfileResolver::new(Arc::new(settings.provisioner())),
            Arc::new(SshConnector::new(settings.timeouts())),
            settings,
        )
    }

    pub fn registry(&self) -> &Arc<HostRegistry> {
        &self.registry
    }

    pub fn resolver(&self) -> &HopResolver {
        &self.resolver
    }

    pub fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    /// Start a run: close anything a previous run left open and replace the
    /// registered hosts.
    pub async fn before_suite<I>(&self, hosts: I) -> Result<()>
    where
        I: IntoIterator<Item = HostDescriptor>,
    {
        self.resolver.close_all().await?;
        self.registry.reset();
        self.registry.register_all(hosts);
        info!("Suite starting with {} hosts", self.registry.len());
        Ok(())
    }

    pub async fn before_each<C>(&self, context: &mut C, example: &str) -> Result<()>
    where
        C: VerificationContext + ?Sized,
    {
        debug!("Entering example: {}", example);
        context.before_each(self, example).await
    }

    pub async fn after_each<C>(&self, context: &mut C, example: &str) -> Result<()>
    where
        C: VerificationContext + ?Sized,
    {
        debug!("Leaving example: {}", example);
        context.after_each(self, example).await
    }

    /// Finish a run: close every gateway session still open and clear the
    /// registry. The registry is cleared even if closing fails.
    pub async fn after_suite(&self) -> Result<()> {
        let swept = self.resolver.close_all().await;
        self.registry.reset();
        info!("Suite finished");
        swept
    }
}
