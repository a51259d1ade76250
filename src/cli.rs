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

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "hopssh",
    version,
    about = "On-demand multi-hop SSH tunnels for infrastructure verification",
    long_about = "hopssh reaches services on hosts that are only reachable through other hosts.\nHosts are declared in a YAML file; a host declared `from` another host is reached\nby tunneling through that host's SSH session, recursively, and exposed as a local\nloopback endpoint.",
    after_help = "EXAMPLES:\n  List hosts and their tunnel paths:   hopssh list\n  Expose db:5432 on a local port:      hopssh endpoint db 5432\n  Run a command on a host:             hopssh exec web -- uptime"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        short = 'c',
        long,
        env = "HOPSSH_CONFIG",
        help = "Hosts file path\nDefaults to ./hopssh.yaml, then the user configuration directory"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        short = 'v',
        long,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,

    #[arg(long, help = "Connect timeout in seconds (overrides the hosts file)")]
    pub connect_timeout: Option<u64>,

    #[arg(long, help = "Command timeout in seconds (overrides the hosts file)")]
    pub command_timeout: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "List registered hosts and how each is reached")]
    List,

    #[command(
        about = "Expose a host's port on a local endpoint until interrupted",
        long_about = "Builds the tunnel chain to HOST and prints the local address that reaches PORT on it.\nThe chain is torn down on Ctrl+C or SIGTERM."
    )]
    Endpoint {
        #[arg(help = "Registered host name")]
        host: String,
        #[arg(help = "Service port on the host")]
        port: u16,
    },

    #[command(
        about = "Run a command on a host over a direct connection",
        after_help = "Exit codes: the remote exit status, 255 on connection failures"
    )]
    Exec {
        #[arg(help = "Registered host name")]
        host: String,
        #[arg(trailing_var_arg = true, required = true, help = "Command to run")]
        command: Vec<String>,
    },
}
