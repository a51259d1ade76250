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

//! Host descriptor data structures

use crate::profile::ConnectionProfile;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Explicit SSH connection options declared for a host.
///
/// Unknown keys are kept in `extra` and travel into the resolved profile as
/// opaque auth fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SshOptions {
    /// Host name or IP used for the SSH connection (defaults to the host address)
    #[serde(default)]
    pub host_name: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub password: Option<String>,
    /// Private key files, tried in order
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub passphrase: Option<String>,
    /// Only use the listed keys (no agent)
    #[serde(default)]
    pub keys_only: Option<bool>,
    #[serde(default)]
    pub use_agent: Option<bool>,
    /// Offer the password (defaults to yes)
    #[serde(default)]
    pub password_authentication: Option<bool>,
    /// yes / no / accept-new
    #[serde(default)]
    pub strict_host_key_checking: Option<String>,
    #[serde(default)]
    pub user_known_hosts_file: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// The `vagrant` option: either a flag or the machine name to query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VagrantOption {
    Enabled(bool),
    Name(String),
}

impl VagrantOption {
    /// Machine name to pass to the provisioning tool, `None` when disabled.
    pub fn machine_name<'a>(&'a self, host_name: &'a str) -> Option<&'a str> {
        match self {
            VagrantOption::Enabled(true) => Some(host_name),
            VagrantOption::Enabled(false) => None,
            VagrantOption::Name(name) => Some(name.as_str()),
        }
    }
}

/// Options recognized on a host definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostOptions {
    #[serde(default)]
    pub ssh: Option<SshOptions>,
    #[serde(default)]
    pub vagrant: Option<VagrantOption>,
    /// Name of the registered host this one is reached through
    #[serde(default)]
    pub from: Option<String>,
}

/// A named remote host.
///
/// Immutable after construction. The resolved connection profile is memoized
/// on the descriptor itself, so every reference to the same registered host
/// shares one (possibly expensive) provisioning lookup.
#[derive(Debug)]
pub struct HostDescriptor {
    name: String,
    address: String,
    options: HostOptions,
    pub(crate) profile: OnceCell<Arc<ConnectionProfile>>,
}

impl HostDescriptor {
    pub fn new(name: impl Into<String>, address: impl Into<String>, options: HostOptions) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            options,
            profile: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn options(&self) -> &HostOptions {
        &self.options
    }

    /// Name of the upstream host, if this host is proxied.
    pub fn from(&self) -> Option<&str> {
        self.options.from.as_deref()
    }

    pub fn is_direct(&self) -> bool {
        self.options.from.is_none()
    }

    /// Memoized profile, if it has been resolved successfully.
    pub fn cached_profile(&self) -> Option<Arc<ConnectionProfile>> {
        self.profile.get().cloned()
    }
}

impl fmt::Display for HostDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)?;
        if let Some(from) = self.from() {
            write!(f, " from {from}")?;
        }
        Ok(())
    }
}
