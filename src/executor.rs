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

//! Remote command execution over a direct session.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::gateway::{ConnectTarget, GatewayConnector};
use crate::host::HostRegistry;
use crate::profile::ProfileResolver;

/// Runs commands on registered hosts.
///
/// Commands always run over a fresh direct connection to the host; a `from`
/// declaration is not followed.
#[derive(Clone)]
pub struct CommandExecutor {
    registry: Arc<HostRegistry>,
    profiles: ProfileResolver,
    connector: Arc<dyn GatewayConnector>,
}

impl CommandExecutor {
    pub fn new(
        registry: Arc<HostRegistry>,
        profiles: ProfileResolver,
        connector: Arc<dyn GatewayConnector>,
    ) -> Self {
        Self {
            registry,
            profiles,
            connector,
        }
    }

    /// Run `command` on host `name` and return its combined output.
    ///
    /// A non-zero exit fails with an execution error carrying the output.
    /// The session is closed on every path.
    pub async fn execute(&self, name: &str, command: &str) -> Result<String> {
        let host = self.registry.find(name)?;
        if let Some(from) = host.from() {
            debug!(
                "Host {} is declared from {}; executing over a direct connection",
                name, from
            );
        }

        let profile = self.profiles.resolve(&host).await?;
        let via = ConnectTarget::direct(profile.host_name.clone(), profile.port);
        let session = self.connector.open_session(&profile, &via).await?;

        let result = session.execute(command).await;
        if let Err(e) = session.close().await {
            warn!("Failed to close session to {}: {}", name, e);
        }
        result
    }
}
