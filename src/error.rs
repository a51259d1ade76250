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

//! Error taxonomy for host resolution and tunnel orchestration.
//!
//! Every variant names the host it concerns, and [`Error::stage`] tells which
//! step of building a tunnel chain failed, so a probe that cannot reach its
//! target can report both.
//!
//! # Error Categories
//!
//! - [`Error::NotFound`]: unknown host name
//! - [`Error::Configuration`]: no usable connection method or a cyclic chain
//! - [`Error::Provisioning`]: the external provisioning tool failed
//! - [`Error::Authentication`] / [`Error::Connection`]: transport failures
//! - [`Error::Tunnel`]: a gateway refused or failed a forward
//! - [`Error::Execution`]: a remote command exited non-zero
//! - [`Error::Timeout`]: a connect or command timeout elapsed

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// The step of endpoint construction an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Resolution,
    Provisioning,
    Authentication,
    Connection,
    Forwarding,
    Execution,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Resolution => "resolution",
            Stage::Provisioning => "provisioning",
            Stage::Authentication => "authentication",
            Stage::Connection => "connection",
            Stage::Forwarding => "forwarding",
            Stage::Execution => "execution",
        };
        f.write_str(name)
    }
}

/// Errors produced by the registry, profile resolver, gateways and resolver.
#[derive(Debug, Error)]
pub enum Error {
    #[error("host definition for '{name}' is not found")]
    NotFound { name: String },

    #[error("configuration error for host '{host}': {reason}")]
    Configuration { host: String, reason: String },

    #[error(
        "provisioning lookup '{name}' for host '{host}' failed ({}): {message}",
        format_status(.status)
    )]
    Provisioning {
        host: String,
        name: String,
        status: Option<i32>,
        message: String,
    },

    #[error("authentication to host '{host}' ({address}) as '{user}' failed: {reason}")]
    Authentication {
        host: String,
        address: String,
        user: String,
        reason: String,
    },

    #[error("connection to host '{host}' ({address}) failed: {reason}")]
    Connection {
        host: String,
        address: String,
        reason: String,
    },

    #[error("gateway '{gateway}' failed to forward to {remote_host}:{remote_port}: {reason}")]
    Tunnel {
        gateway: String,
        remote_host: String,
        remote_port: u16,
        reason: String,
    },

    #[error(
        "command `{command}` on host '{host}' failed ({})",
        format_exit(.status)
    )]
    Execution {
        host: String,
        command: String,
        status: Option<u32>,
        output: String,
    },

    #[error("{stage} for host '{host}' timed out after {}s", .after.as_secs())]
    Timeout {
        host: String,
        stage: Stage,
        after: Duration,
    },
}

fn format_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit status {code}"),
        None => "no exit status".to_string(),
    }
}

fn format_exit(status: &Option<u32>) -> String {
    match status {
        Some(code) => format!("exit status {code}"),
        None => "terminated without exit status".to_string(),
    }
}

impl Error {
    pub fn not_found(name: impl Into<String>) -> Self {
        Error::NotFound { name: name.into() }
    }

    pub fn configuration(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Configuration {
            host: host.into(),
            reason: reason.into(),
        }
    }

    /// The stage of tunnel construction this error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            Error::NotFound { .. } | Error::Configuration { .. } => Stage::Resolution,
            Error::Provisioning { .. } => Stage::Provisioning,
            Error::Authentication { .. } => Stage::Authentication,
            Error::Connection { .. } => Stage::Connection,
            Error::Tunnel { .. } => Stage::Forwarding,
            Error::Execution { .. } => Stage::Execution,
            Error::Timeout { stage, .. } => *stage,
        }
    }

    /// Name of the host the error is about.
    pub fn host(&self) -> &str {
        match self {
            Error::NotFound { name } => name,
            Error::Configuration { host, .. }
            | Error::Provisioning { host, .. }
            | Error::Authentication { host, .. }
            | Error::Connection { host, .. }
            | Error::Execution { host, .. }
            | Error::Timeout { host, .. } => host,
            Error::Tunnel { gateway, .. } => gateway,
        }
    }
}

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;
