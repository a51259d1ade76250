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

//! Connection profiles: the concrete SSH parameters of a host.
//!
//! A profile comes either from the host's explicit `ssh` options or from an
//! external provisioning tool (`vagrant ssh-config`) whose output is parsed
//! as OpenSSH client configuration.

pub mod provisioner;
pub mod resolver;
pub mod ssh_config;

pub use provisioner::{Provisioner, VagrantProvisioner};
pub use resolver::ProfileResolver;

use crate::host::SshOptions;
use crate::ssh::known_hosts::get_check_method;
use crate::ssh::tokio_client::{AuthMethod, ServerCheckMethod};
use crate::ssh::StrictHostKeyChecking;
use crate::config::{expand_tilde, get_current_username};
use ssh_config::SshHostConfig;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

pub const DEFAULT_SSH_PORT: u16 = 22;

/// Authentication parameters of a profile.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthParams {
    pub password: Option<Zeroizing<String>>,
    pub identity_files: Vec<PathBuf>,
    pub passphrase: Option<Zeroizing<String>>,
    pub use_agent: bool,
    pub identities_only: bool,
    /// Whether the password is offered at all
    pub password_authentication: bool,
    pub strict_host_key_checking: StrictHostKeyChecking,
    pub user_known_hosts_file: Option<PathBuf>,
    /// Options not interpreted here, kept verbatim
    pub extra: BTreeMap<String, String>,
}

impl fmt::Debug for AuthParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthParams")
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("identity_files", &self.identity_files)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "***"))
            .field("use_agent", &self.use_agent)
            .field("identities_only", &self.identities_only)
            .field("password_authentication", &self.password_authentication)
            .field("strict_host_key_checking", &self.strict_host_key_checking)
            .field("user_known_hosts_file", &self.user_known_hosts_file)
            .field("extra", &self.extra)
            .finish()
    }
}

/// Concrete SSH connection parameters for one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    /// Name of the host this profile belongs to
    pub host: String,
    /// Host name or address the SSH server listens on
    pub host_name: String,
    pub port: u16,
    pub user: String,
    pub auth: AuthParams,
}

impl ConnectionProfile {
    /// Build a profile from explicit `ssh` options; the host name defaults to
    /// the host's address.
    pub fn from_ssh_options(host: &str, address: &str, options: &SshOptions) -> Self {
        let extra = options
            .extra
            .iter()
            .map(|(key, value)| (key.clone(), yaml_scalar(value)))
            .collect();

        Self {
            host: host.to_string(),
            host_name: options
                .host_name
                .clone()
                .unwrap_or_else(|| address.to_string()),
            port: options.port.unwrap_or(DEFAULT_SSH_PORT),
            user: options.user.clone().unwrap_or_else(get_current_username),
            auth: AuthParams {
                password: options.password.clone().map(Zeroizing::new),
                identity_files: options
                    .keys
                    .iter()
                    .map(|k| expand_tilde(Path::new(k)))
                    .collect(),
                passphrase: options.passphrase.clone().map(Zeroizing::new),
                use_agent: options.use_agent.unwrap_or(true),
                identities_only: options.keys_only.unwrap_or(false),
                password_authentication: options.password_authentication.unwrap_or(true),
                strict_host_key_checking: options
                    .strict_host_key_checking
                    .as_deref()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_default(),
                user_known_hosts_file: options
                    .user_known_hosts_file
                    .as_deref()
                    .map(|p| expand_tilde(Path::new(p))),
                extra,
            },
        }
    }

    /// Build a profile from a resolved client-config block. A block without
    /// `HostName` falls back to `fallback_host_name`.
    pub fn from_ssh_config(host: &str, fallback_host_name: &str, config: &SshHostConfig) -> Self {
        Self {
            host: host.to_string(),
            host_name: config
                .hostname
                .clone()
                .unwrap_or_else(|| fallback_host_name.to_string()),
            port: config.port.unwrap_or(DEFAULT_SSH_PORT),
            user: config.user.clone().unwrap_or_else(get_current_username),
            auth: AuthParams {
                password: None,
                identity_files: config
                    .identity_files
                    .iter()
                    .map(|p| expand_tilde(p))
                    .collect(),
                passphrase: None,
                use_agent: true,
                identities_only: config.identities_only.unwrap_or(false),
                password_authentication: config.password_authentication.unwrap_or(true),
                strict_host_key_checking: config
                    .strict_host_key_checking
                    .as_deref()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_default(),
                user_known_hosts_file: config
                    .user_known_hosts_file
                    .as_deref()
                    .map(expand_tilde),
                extra: config.extra.clone(),
            },
        }
    }

    /// Authentication methods in the order they are attempted: identity
    /// files, then the agent (unless identities-only), then the password
    /// (unless password authentication is off).
    pub fn auth_methods(&self) -> Vec<AuthMethod> {
        let passphrase = self.auth.passphrase.as_ref().map(|p| p.as_str());
        let mut methods: Vec<AuthMethod> = self
            .auth
            .identity_files
            .iter()
            .map(|path| AuthMethod::with_key_file(path, passphrase))
            .collect();

        if self.auth.use_agent && !self.auth.identities_only {
            methods.extend(agent_method());
        }

        if let Some(password) = &self.auth.password {
            if self.auth.password_authentication {
                methods.push(AuthMethod::with_password(password));
            }
        }
        methods
    }

    /// Host key verification policy for this profile.
    pub fn server_check(&self) -> ServerCheckMethod {
        get_check_method(
            self.auth.strict_host_key_checking,
            self.auth.user_known_hosts_file.as_deref(),
        )
    }

    /// `user@host_name:port`
    pub fn to_connection_string(&self) -> String {
        format!("{}@{}:{}", self.user, self.host_name, self.port)
    }
}

#[cfg(not(target_os = "windows"))]
fn agent_method() -> Option<AuthMethod> {
    std::env::var_os("SSH_AUTH_SOCK").map(|_| AuthMethod::with_agent())
}

#[cfg(target_os = "windows")]
fn agent_method() -> Option<AuthMethod> {
    None
}

fn yaml_scalar(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Null => String::new(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_ssh_options_defaults() {
        let options = SshOptions {
            user: Some("deploy".to_string()),
            ..SshOptions::default()
        };
        let profile = ConnectionProfile::from_ssh_options("web", "10.0.0.5", &options);
        assert_eq!(profile.host_name, "10.0.0.5");
        assert_eq!(profile.port, 22);
        assert_eq!(profile.user, "deploy");
        assert_eq!(profile.to_connection_string(), "deploy@10.0.0.5:22");
        assert_eq!(
            profile.auth.strict_host_key_checking,
            StrictHostKeyChecking::AcceptNew
        );
    }

    #[test]
    fn test_from_ssh_options_explicit() {
        let yaml = r#"
host_name: web.internal
user: admin
port: 2200
password: s3cret
keys: [/keys/a, /keys/b]
keys_only: true
strict_host_key_checking: "yes"
compression: true
"#;
        let options: SshOptions = serde_yaml::from_str(yaml).unwrap();
        let profile = ConnectionProfile::from_ssh_options("web", "10.0.0.5", &options);
        assert_eq!(profile.host_name, "web.internal");
        assert_eq!(profile.port, 2200);
        assert_eq!(profile.auth.identity_files.len(), 2);
        assert!(profile.auth.identities_only);
        assert_eq!(
            profile.auth.strict_host_key_checking,
            StrictHostKeyChecking::Yes
        );
        assert_eq!(
            profile.auth.extra.get("compression").map(String::as_str),
            Some("true")
        );

        // keys first, no agent because keys_only, password last
        let methods = profile.auth_methods();
        assert_eq!(methods.len(), 3);
        assert!(matches!(methods[0], AuthMethod::PrivateKeyFile { .. }));
        assert!(matches!(methods[2], AuthMethod::Password(_)));
    }

    #[test]
    fn test_debug_redacts_password() {
        let options = SshOptions {
            user: Some("admin".to_string()),
            password: Some("hunter2".to_string()),
            ..SshOptions::default()
        };
        let profile = ConnectionProfile::from_ssh_options("web", "10.0.0.5", &options);
        let rendered = format!("{profile:?}");
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_from_ssh_config() {
        let configs = ssh_config::parse(
            "Host web\n  HostName 127.0.0.1\n  Port 2222\n  User vagrant\n  StrictHostKeyChecking no\n",
        )
        .unwrap();
        let config = ssh_config::find_host_config(&configs, "web").unwrap();
        let profile = ConnectionProfile::from_ssh_config("web", "10.0.0.5", &config);
        assert_eq!(profile.to_connection_string(), "vagrant@127.0.0.1:2222");
        assert_eq!(profile.server_check(), ServerCheckMethod::NoCheck);

        let bare = SshHostConfig::default();
        let profile = ConnectionProfile::from_ssh_config("web", "10.0.0.5", &bare);
        assert_eq!(profile.host_name, "10.0.0.5");
        assert!(profile.auth.password_authentication);
    }

    #[test]
    fn test_password_authentication_off() {
        let configs = ssh_config::parse("Host web
  User vagrant
  PasswordAuthentication no
")
            .unwrap();
        let config = ssh_config::find_host_config(&configs, "web").unwrap();
        let profile = ConnectionProfile::from_ssh_config("web", "10.0.0.5", &config);
        assert!(!profile.auth.password_authentication);

        let options = SshOptions {
            password: Some("s3cret".to_string()),
            use_agent: Some(false),
            password_authentication: Some(false),
            ..SshOptions::default()
        };
        let profile = ConnectionProfile::from_ssh_options("web", "10.0.0.5", &options);
        assert!(profile.auth_methods().is_empty());

        let options = SshOptions {
            password_authentication: None,
            ..options
        };
        let profile = ConnectionProfile::from_ssh_options("web", "10.0.0.5", &options);
        assert!(matches!(
            profile.auth_methods().as_slice(),
            [AuthMethod::Password(_)]
        ));
    }
}
