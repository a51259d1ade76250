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

//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::gateway::GatewayTimeouts;
use crate::hop::DEFAULT_MAX_CHAIN_DEPTH;
use crate::host::HostOptions;
use crate::profile::provisioner::DEFAULT_PROVISIONING_TIMEOUT;
use crate::profile::VagrantProvisioner;

/// Main configuration structure.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,

    #[serde(default)]
    pub hosts: Vec<HostEntry>,
}

/// Runtime settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Seconds allowed for connecting, authenticating and opening a forward
    pub connect_timeout: u64,
    /// Seconds allowed for one remote command
    pub command_timeout: u64,
    /// Share one session per gateway host between resolutions
    pub share_sessions: bool,
    /// Maximum number of gateways between the runner and a host
    pub max_chain_depth: usize,
    /// Provisioning tool executable
    pub vagrant_program: Option<String>,
    /// Directory holding the Vagrantfile
    pub vagrant_dir: Option<String>,
    /// Seconds allowed for one provisioning lookup
    pub provisioning_timeout: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            connect_timeout: 30,
            command_timeout: 300,
            share_sessions: false,
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
            vagrant_program: None,
            vagrant_dir: None,
            provisioning_timeout: DEFAULT_PROVISIONING_TIMEOUT.as_secs(),
        }
    }
}

impl Settings {
    pub fn timeouts(&self) -> GatewayTimeouts {
        GatewayTimeouts {
            connect: Duration::from_secs(self.connect_timeout),
            command: Duration::from_secs(self.command_timeout),
        }
    }

    pub fn provisioner(&self) -> VagrantProvisioner {
        let mut provisioner = VagrantProvisioner::new()
            .with_timeout(Duration::from_secs(self.provisioning_timeout));
        if let Some(program) = &self.vagrant_program {
            provisioner = provisioner.with_program(super::expand_tilde(&PathBuf::from(program)));
        }
        if let Some(dir) = &self.vagrant_dir {
            provisioner = provisioner.with_working_dir(super::expand_tilde(&PathBuf::from(dir)));
        }
        provisioner
    }
}

/// One host definition.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HostEntry {
    pub name: String,
    pub address: String,
    #[serde(flatten)]
    pub options: HostOptions,
}
