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

//! OpenSSH client configuration parsing
//!
//! Parses the subset of `ssh_config(5)` that provisioning tools such as
//! `vagrant ssh-config` emit: `Host` blocks with wildcard patterns and
//! `Keyword Value` / `Keyword=Value` options. Options that appear before the
//! first `Host` line apply to every host. When several blocks match, the
//! first obtained value of each option wins, except `IdentityFile`, which
//! accumulates.

use anyhow::Result;
use std::collections::BTreeMap;
use std::path::PathBuf;

const MAX_LINE_LENGTH: usize = 8192;
const MAX_VALUE_LENGTH: usize = 4096;

/// Options of one `Host` block (or the merged result of a lookup)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SshHostConfig {
    pub host_patterns: Vec<String>,
    pub hostname: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub identity_files: Vec<PathBuf>,
    pub identities_only: Option<bool>,
    pub password_authentication: Option<bool>,
    pub strict_host_key_checking: Option<String>,
    pub user_known_hosts_file: Option<PathBuf>,
    /// Every other option, keyed by lowercase keyword
    pub extra: BTreeMap<String, String>,
}

/// Parse configuration text into blocks, in file order.
pub fn parse(content: &str) -> Result<Vec<SshHostConfig>> {
    let mut configs = Vec::new();
    let mut current = SshHostConfig {
        host_patterns: vec!["*".to_string()],
        ..SshHostConfig::default()
    };
    let mut has_global_options = false;
    let mut in_host_block = false;

    for (index, line) in content.lines().enumerate() {
        let line_number = index + 1;

        if line.len() > MAX_LINE_LENGTH {
            anyhow::bail!("Line {line_number} exceeds maximum length of {MAX_LINE_LENGTH} bytes");
        }

        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (keyword, args) = parse_config_line(line, line_number)?;
        if keyword.is_empty() {
            continue;
        }

        if keyword == "host" {
            if args.is_empty() {
                anyhow::bail!("Host directive requires at least one pattern at line {line_number}");
            }
            if in_host_block || has_global_options {
                configs.push(std::mem::take(&mut current));
            }
            current.host_patterns = args;
            in_host_block = true;
            continue;
        }

        if keyword == "match" {
            anyhow::bail!("Match blocks are not supported (line {line_number})");
        }

        if !in_host_block {
            has_global_options = true;
        }
        apply_option(&mut current, &keyword, &args, line_number)?;
    }

    if in_host_block || has_global_options {
        configs.push(current);
    }

    Ok(configs)
}

/// Split a line into lowercase keyword and arguments.
fn parse_config_line(line: &str, line_number: usize) -> Result<(String, Vec<String>)> {
    let (keyword, rest) = match line.find(|c: char| c.is_whitespace() || c == '=') {
        Some(pos) => (&line[..pos], &line[pos..]),
        None => (line, ""),
    };

    // "Key = Value", "Key=Value" and "Key Value" are all accepted
    let rest = rest.trim_start();
    let rest = rest.strip_prefix('=').unwrap_or(rest).trim();

    if rest.len() > MAX_VALUE_LENGTH {
        anyhow::bail!(
            "Value at line {line_number} exceeds maximum length of {MAX_VALUE_LENGTH} bytes"
        );
    }

    Ok((keyword.to_lowercase(), split_arguments(rest)))
}

/// Split arguments on whitespace, honoring double quotes.
fn split_arguments(value: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for c in value.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    args.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        args.push(current);
    }
    args
}

fn parse_yes_no(keyword: &str, value: &str, line_number: usize) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "yes" | "true" => Ok(true),
        "no" | "false" => Ok(false),
        _ => anyhow::bail!("Invalid value '{value}' for {keyword} at line {line_number}"),
    }
}

fn apply_option(
    config: &mut SshHostConfig,
    keyword: &str,
    args: &[String],
    line_number: usize,
) -> Result<()> {
    let Some(value) = args.first() else {
        anyhow::bail!("Missing value for {keyword} at line {line_number}");
    };

    match keyword {
        "hostname" => config.hostname = Some(value.clone()),
        "user" => config.user = Some(value.clone()),
        "port" => {
            let port: u16 = value.parse().map_err(|_| {
                anyhow::anyhow!("Invalid port '{value}' at line {line_number}")
            })?;
            if port == 0 {
                anyhow::bail!("Invalid port '{value}' at line {line_number}");
            }
            config.port = Some(port);
        }
        "identityfile" => config.identity_files.push(PathBuf::from(value)),
        "identitiesonly" => {
            config.identities_only = Some(parse_yes_no(keyword, value, line_number)?)
        }
        "passwordauthentication" => {
            config.password_authentication = Some(parse_yes_no(keyword, value, line_number)?)
        }
        "stricthostkeychecking" => config.strict_host_key_checking = Some(value.clone()),
        "userknownhostsfile" => config.user_known_hosts_file = Some(PathBuf::from(value)),
        _ => {
            config.extra.insert(keyword.to_string(), args.join(" "));
        }
    }
    Ok(())
}

/// Merge every block that applies to `alias`, first obtained value winning.
///
/// Returns `None` when no block applies.
pub fn find_host_config(configs: &[SshHostConfig], alias: &str) -> Option<SshHostConfig> {
    let mut merged: Option<SshHostConfig> = None;

    for config in configs
        .iter()
        .filter(|c| matches_host_patterns(alias, &c.host_patterns))
    {
        let target = merged.get_or_insert_with(|| SshHostConfig {
            host_patterns: vec![alias.to_string()],
            ..SshHostConfig::default()
        });

        if target.hostname.is_none() {
            target.hostname = config.hostname.clone();
        }
        if target.user.is_none() {
            target.user = config.user.clone();
        }
        if target.port.is_none() {
            target.port = config.port;
        }
        target
            .identity_files
            .extend(config.identity_files.iter().cloned());
        if target.identities_only.is_none() {
            target.identities_only = config.identities_only;
        }
        if target.password_authentication.is_none() {
            target.password_authentication = config.password_authentication;
        }
        if target.strict_host_key_checking.is_none() {
            target.strict_host_key_checking = config.strict_host_key_checking.clone();
        }
        if target.user_known_hosts_file.is_none() {
            target.user_known_hosts_file = config.user_known_hosts_file.clone();
        }
        for (key, value) in &config.extra {
            target
                .extra
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }

    merged
}

/// A block applies when a positive pattern matches and no negated one does.
fn matches_host_patterns(alias: &str, patterns: &[String]) -> bool {
    let mut matched = false;
    for pattern in patterns {
        if let Some(negated) = pattern.strip_prefix('!') {
            if wildcard_match(alias, negated) {
                return false;
            }
        } else if wildcard_match(alias, pattern) {
            matched = true;
        }
    }
    matched
}

/// Case-insensitive `*` / `?` matching.
fn wildcard_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().map(|c| c.to_ascii_lowercase()).collect();
    let pattern: Vec<char> = pattern.chars().map(|c| c.to_ascii_lowercase()).collect();

    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            t = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}
