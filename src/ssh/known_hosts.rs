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

use super::tokio_client::ServerCheckMethod;
use directories::BaseDirs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Get the default known_hosts file path
pub fn get_default_known_hosts_path() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().join(".ssh").join("known_hosts"))
}

/// Create a ServerCheckMethod from the host key policy of a profile
///
/// `known_hosts_file` overrides the default `~/.ssh/known_hosts` in strict mode.
pub fn get_check_method(
    strict_mode: StrictHostKeyChecking,
    known_hosts_file: Option<&Path>,
) -> ServerCheckMethod {
    match strict_mode {
        StrictHostKeyChecking::Yes => {
            if let Some(path) = known_hosts_file {
                tracing::debug!("Using known_hosts file: {:?} (strict mode)", path);
                return ServerCheckMethod::KnownHostsFile(path.to_string_lossy().into_owned());
            }
            match get_default_known_hosts_path() {
                Some(path) if path.exists() => {
                    tracing::debug!("Using known_hosts file: {:?} (strict mode)", path);
                    ServerCheckMethod::DefaultKnownHostsFile
                }
                Some(path) => {
                    tracing::warn!("Known hosts file not found at {:?}, using NoCheck", path);
                    ServerCheckMethod::NoCheck
                }
                None => {
                    tracing::warn!("Could not determine known_hosts path, using NoCheck");
                    ServerCheckMethod::NoCheck
                }
            }
        }
        StrictHostKeyChecking::No => {
            tracing::debug!("Host key checking disabled (strict mode = no)");
            ServerCheckMethod::NoCheck
        }
        StrictHostKeyChecking::AcceptNew => {
            // russh has no trust-on-first-use mode; accept-new falls back to relaxed checking
            tracing::debug!("accept-new host key mode, using relaxed checking");
            ServerCheckMethod::NoCheck
        }
    }
}

/// Mode for host key checking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrictHostKeyChecking {
    /// Always verify host keys (fail on unknown/changed)
    Yes,
    /// Never verify host keys (accept all)
    No,
    /// Verify known hosts, add new ones automatically (TOFU)
    #[default]
    AcceptNew,
}

impl FromStr for StrictHostKeyChecking {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "yes" | "true" => Self::Yes,
            "no" | "false" | "off" => Self::No,
            _ => Self::AcceptNew,
        })
    }
}
