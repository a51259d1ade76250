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

//! External provisioning tools that report SSH client configuration.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

/// Default time allowed for one `ssh-config` query.
pub const DEFAULT_PROVISIONING_TIMEOUT: Duration = Duration::from_secs(120);

/// Source of OpenSSH client configuration for provisioned machines.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Return the client configuration text for machine `machine`.
    ///
    /// `host` is the registered host name and only used for error reporting.
    async fn ssh_config(&self, host: &str, machine: &str) -> Result<String>;
}

/// Runs `vagrant ssh-config <machine>`.
#[derive(Debug, Clone)]
pub struct VagrantProvisioner {
    program: PathBuf,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl Default for VagrantProvisioner {
    fn default() -> Self {
        Self {
            program: PathBuf::from("vagrant"),
            working_dir: None,
            timeout: DEFAULT_PROVISIONING_TIMEOUT,
        }
    }
}

impl VagrantProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different executable, e.g. an absolute path.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Directory holding the Vagrantfile.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Provisioner for VagrantProvisioner {
    async fn ssh_config(&self, host: &str, machine: &str) -> Result<String> {
        let failure = |status: Option<i32>, message: String| Error::Provisioning {
            host: host.to_string(),
            name: machine.to_string(),
            status,
            message,
        };

        let mut command = Command::new(&self.program);
        command
            .arg("ssh-config")
            .arg(machine)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        debug!(
            "Running {} ssh-config {} for host {}",
            self.program.display(),
            machine,
            host
        );

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(failure(
                    None,
                    format!("failed to run {}: {e}", self.program.display()),
                ))
            }
            Err(_) => {
                return Err(Error::Timeout {
                    host: host.to_string(),
                    stage: crate::error::Stage::Provisioning,
                    after: self.timeout,
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(failure(output.status.code(), stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
