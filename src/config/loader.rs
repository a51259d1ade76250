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

//! Configuration loading.

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::types::Config;
use super::utils::{expand_env_vars, expand_tilde};
use crate::host::HostDescriptor;

impl Config {
    /// Load configuration from a file. A missing file yields an empty
    /// configuration.
    pub async fn load(path: &Path) -> Result<Self> {
        let expanded_path = expand_tilde(path);

        if !expanded_path.exists() {
            tracing::debug!(
                "Config file not found at {:?}, using defaults",
                expanded_path
            );
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&expanded_path)
            .await
            .with_context(|| format!("Failed to read configuration file at {}. Please check file permissions and ensure the file is accessible.", expanded_path.display()))?;

        Self::from_yaml(&content)
            .with_context(|| format!("Invalid configuration file at {}", expanded_path.display()))
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content).context("Failed to parse YAML configuration. Please check the YAML syntax is valid.\nCommon issues:\n  - Incorrect indentation (use spaces, not tabs)\n  - Missing colons after keys\n  - Unquoted special characters")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject definitions that can never resolve. Unknown `from` targets are
    /// only reported, since hosts may be registered later.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for (index, host) in self.hosts.iter().enumerate() {
            if host.name.trim().is_empty() {
                bail!("Host #{} has an empty name", index + 1);
            }
            if host.address.trim().is_empty() {
                bail!("Host '{}' has an empty address", host.name);
            }
            if host.options.from.as_deref() == Some(host.name.as_str()) {
                bail!("Host '{}' is declared from itself", host.name);
            }
            if !seen.insert(host.name.as_str()) {
                tracing::warn!(
                    "Host '{}' is defined more than once; the first definition is used",
                    host.name
                );
            }
        }

        for host in &self.hosts {
            if let Some(from) = &host.options.from {
                if !seen.contains(from.as_str()) {
                    tracing::warn!(
                        "Host '{}' is declared from '{}', which is not defined in this file",
                        host.name,
                        from
                    );
                }
            }
        }

        if self.settings.max_chain_depth == 0 {
            bail!("settings.max_chain_depth must be at least 1");
        }
        Ok(())
    }

    /// Host descriptors in file order, with environment variables expanded
    /// in addresses.
    pub fn descriptors(&self) -> Vec<HostDescriptor> {
        self.hosts
            .iter()
            .map(|host| {
                HostDescriptor::new(
                    host.name.clone(),
                    expand_env_vars(&host.address),
                    host.options.clone(),
                )
            })
            .collect()
    }

    /// Default configuration path: `./hopssh.yaml` if present, else the
    /// platform configuration directory.
    pub fn default_path() -> PathBuf {
        let local = PathBuf::from("hopssh.yaml");
        if local.exists() {
            return local;
        }
        ProjectDirs::from("", "", "hopssh")
            .map(|dirs| dirs.config_dir().join("hosts.yaml"))
            .unwrap_or(local)
    }
}
