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

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;

use hopssh::{
    cli::{Cli, Commands},
    config::Config,
    lifecycle::Suite,
    utils::init_logging,
    Error,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(&config_path)
        .await
        .with_context(|| format!("Failed to load hosts from {}", config_path.display()))?;
    if let Some(timeout) = cli.connect_timeout {
        config.settings.connect_timeout = timeout;
    }
    if let Some(timeout) = cli.command_timeout {
        config.settings.command_timeout = timeout;
    }

    let suite = Suite::from_settings(&config.settings);
    suite.before_suite(config.descriptors()).await?;

    let result = match cli.command {
        Commands::List => list_hosts(&suite),
        Commands::Endpoint { host, port } => hold_endpoint(&suite, &host, port).await,
        Commands::Exec { host, command } => exec_command(&suite, &host, &command.join(" ")).await,
    };

    if let Err(e) = suite.after_suite().await {
        tracing::warn!("Cleanup failed: {}", e);
    }
    result
}

fn list_hosts(suite: &Suite) -> Result<ExitCode> {
    let hosts = suite.registry().all();
    if hosts.is_empty() {
        println!("No hosts defined");
        return Ok(ExitCode::SUCCESS);
    }

    for host in hosts {
        let route = suite
            .registry()
            .path_description(host.name())
            .unwrap_or_else(|e| format!("unresolvable: {e}"));
        println!("{:<20} {:<24} {}", host.name(), host.address(), route);
    }
    Ok(ExitCode::SUCCESS)
}

async fn hold_endpoint(suite: &Suite, host: &str, port: u16) -> Result<ExitCode> {
    let endpoint = suite
        .resolver()
        .resolve(host, port)
        .await
        .with_context(|| format!("Failed to reach {host}:{port}"))?;

    println!("{}", endpoint.socket_string());
    eprintln!("{host}:{port} is reachable at {endpoint}; press Ctrl+C to close");

    shutdown_signal().await?;
    endpoint
        .release()
        .await
        .context("Failed to tear down the tunnel chain")?;
    Ok(ExitCode::SUCCESS)
}

async fn exec_command(suite: &Suite, host: &str, command: &str) -> Result<ExitCode> {
    match suite.executor().execute(host, command).await {
        Ok(output) => {
            print!("{output}");
            Ok(ExitCode::SUCCESS)
        }
        Err(Error::Execution { output, status, .. }) => {
            print!("{output}");
            let code = status.and_then(|s| u8::try_from(s).ok()).unwrap_or(255);
            Ok(ExitCode::from(code))
        }
        Err(e) => {
            eprintln!("Error: {e}");
            Ok(ExitCode::from(255))
        }
    }
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() -> Result<()> {
    use tokio::signal;

    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result.context("Failed to install Ctrl+C handler")?;
                tracing::info!("Received SIGINT (Ctrl+C)");
            }
            _ = terminate.recv() => tracing::info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    signal::ctrl_c()
        .await
        .context("Failed to install Ctrl+C handler")?;

    Ok(())
}
