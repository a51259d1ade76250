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

use std::sync::Arc;
use tracing::debug;

use super::provisioner::{Provisioner, VagrantProvisioner};
use super::ssh_config;
use super::ConnectionProfile;
use crate::error::{Error, Result};
use crate::host::HostDescriptor;

/// Resolves host descriptors into connection profiles.
///
/// Explicit `ssh` options take precedence over `vagrant`. Successful results
/// are memoized on the descriptor; failures are not, so a later call retries
/// the lookup.
#[derive(Clone)]
pub struct ProfileResolver {
    provisioner: Arc<dyn Provisioner>,
}

impl Default for ProfileResolver {
    fn default() -> Self {
        Self::new(Arc::new(VagrantProvisioner::default()))
    }
}

impl ProfileResolver {
    pub fn new(provisioner: Arc<dyn Provisioner>) -> Self {
        Self { provisioner }
    }

    pub async fn resolve(&self, descriptor: &HostDescriptor) -> Result<Arc<ConnectionProfile>> {
        descriptor
            .profile
            .get_or_try_init(|| async { self.build(descriptor).await.map(Arc::new) })
            .await
            .cloned()
    }

    async fn build(&self, descriptor: &HostDescriptor) -> Result<ConnectionProfile> {
        let options = descriptor.options();

        if let Some(ssh) = &options.ssh {
            debug!("Using explicit ssh options for host {}", descriptor.name());
            return Ok(ConnectionProfile::from_ssh_options(
                descriptor.name(),
                descriptor.address(),
                ssh,
            ));
        }

        let machine = options
            .vagrant
            .as_ref()
            .and_then(|v| v.machine_name(descriptor.name()))
            .ok_or_else(|| {
                Error::configuration(descriptor.name(), "set ssh option or vagrant option")
            })?;

        let text = self
            .provisioner
            .ssh_config(descriptor.name(), machine)
            .await?;

        let configs = ssh_config::parse(&text).map_err(|e| {
            Error::configuration(
                descriptor.name(),
                format!("unreadable ssh-config output for '{machine}': {e}"),
            )
        })?;

        let config = ssh_config::find_host_config(&configs, machine).ok_or_else(|| {
            Error::configuration(
                descriptor.name(),
                format!("ssh-config output has no entry for '{machine}'"),
            )
        })?;

        let profile = ConnectionProfile::from_ssh_config(descriptor.name(), descriptor.address(), &config);
        debug!(
            "Resolved host {} via provisioning lookup '{}': {}",
            descriptor.name(),
            machine,
            profile.to_connection_string()
        );
        Ok(profile)
    }
}
