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

//! SSH channel operations: command execution and `direct-tcpip` forwarding.

use russh::client::Msg;
use russh::Channel;
use std::net::SocketAddr;

use super::connection::Client;

/// Buffer size for SSH command output; matches typical channel window sizes
const SSH_CMD_BUFFER_SIZE: usize = 8192;

/// Result of a command execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandExecutedResult {
    /// stdout and stderr interleaved in the order the server sent them
    pub output: String,
    /// The unix exit status (`$?` in bash), `None` if the command was killed
    /// by a signal or the channel closed without reporting one
    pub exit_status: Option<u32>,
}

impl CommandExecutedResult {
    pub fn success(&self) -> bool {
        self.exit_status == Some(0)
    }
}

impl Client {
    /// Open a `direct-tcpip` channel to `host:port` as seen from the server.
    ///
    /// The host name is passed to the server unresolved, so names only the
    /// server can resolve work.
    pub async fn open_direct_tcpip_channel(
        &self,
        host: &str,
        port: u16,
        originator: Option<SocketAddr>,
    ) -> Result<Channel<Msg>, super::Error> {
        let (orig_host, orig_port) = originator
            .map(|src| (src.ip().to_string(), u32::from(src.port())))
            .unwrap_or_else(|| ("127.0.0.1".to_string(), 22));

        self.connection_handle
            .channel_open_direct_tcpip(host, u32::from(port), orig_host, orig_port)
            .await
            .map_err(super::Error::SshError)
    }

    /// Execute a remote command via the ssh connection.
    ///
    /// Every invocation runs in a new channel and shell context, so `cd` and
    /// variables do not carry over between calls. Make sure commands don't
    /// read from stdin and exit after bounded time.
    pub async fn execute(&self, command: &str) -> Result<CommandExecutedResult, super::Error> {
        let mut output = Vec::with_capacity(SSH_CMD_BUFFER_SIZE);
        let mut channel = self.connection_handle.channel_open_session().await?;
        channel.exec(true, command).await?;

        let mut exit_status: Option<u32> = None;
        let mut exit_signal = false;

        while let Some(msg) = channel.wait().await {
            match msg {
                russh::ChannelMsg::Data { ref data } => output.extend_from_slice(data),
                russh::ChannelMsg::ExtendedData { ref data, ext } => {
                    if ext == 1 {
                        output.extend_from_slice(data);
                    }
                }

                // The exit status may arrive before the last data; keep reading
                // until the channel closes.
                russh::ChannelMsg::ExitStatus { exit_status: code } => exit_status = Some(code),
                russh::ChannelMsg::ExitSignal { .. } => exit_signal = true,
                _ => {}
            }
        }

        if exit_status.is_none() && !exit_signal && output.is_empty() {
            return Err(super::Error::CommandDidntExit);
        }

        Ok(CommandExecutedResult {
            output: String::from_utf8_lossy(&output).into_owned(),
            exit_status,
        })
    }
}
