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

//! Loopback listeners forwarding over `direct-tcpip` channels.
//!
//! A forward owns its bound listener for its whole life, so the local port
//! stays reserved from allocation until release. Every accepted connection
//! gets its own channel and a pump task; cancelling the forward's token stops
//! the listener and every pump.

use russh::client::Msg;
use russh::Channel;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::ssh::tokio_client::Client;

const PUMP_BUFFER_SIZE: usize = 32 * 1024;

/// One forwarded path: `127.0.0.1:local_port` to `remote_host:remote_port`
/// through one gateway session.
///
/// Releasing is idempotent. Dropping an unreleased handle cancels the
/// listener without waiting for it.
#[derive(Debug)]
pub struct TunnelHandle {
    local_addr: SocketAddr,
    remote_host: String,
    remote_port: u16,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl TunnelHandle {
    /// Wrap a running forward. `task` is the listener task, if any; it must
    /// finish once `cancel` is cancelled.
    pub fn new(
        local_addr: SocketAddr,
        remote_host: impl Into<String>,
        remote_port: u16,
        cancel: CancellationToken,
        task: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            local_addr,
            remote_host: remote_host.into(),
            remote_port,
            cancel,
            task,
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn local_port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn remote_host(&self) -> &str {
        &self.remote_host
    }

    pub fn remote_port(&self) -> u16 {
        self.remote_port
    }

    pub fn is_released(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop the listener and wait for it to exit.
    pub async fn release(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    warn!("Forward listener on {} panicked", self.local_addr);
                }
            }
            debug!(
                "Released forward 127.0.0.1:{} -> {}:{}",
                self.local_addr.port(),
                self.remote_host,
                self.remote_port
            );
        }
    }
}

impl Drop for TunnelHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Accept connections on `listener` until `cancel` fires, pumping each one
/// over a fresh channel to `remote_host:remote_port`.
pub(super) fn spawn_listener(
    listener: TcpListener,
    client: Client,
    remote_host: String,
    remote_port: u16,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            trace!("Accepted connection from {}", peer_addr);
                            spawn_connection_handler(
                                stream,
                                peer_addr,
                                client.clone(),
                                remote_host.clone(),
                                remote_port,
                                cancel.child_token(),
                            );
                        }
                        Err(e) => {
                            warn!("Failed to accept connection: {}", e);
                            // Avoid a busy loop on persistent errors
                            sleep(Duration::from_millis(100)).await;
                        }
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
        trace!("Forward listener for {}:{} stopped", remote_host, remote_port);
    })
}

fn spawn_connection_handler(
    stream: TcpStream,
    peer_addr: SocketAddr,
    client: Client,
    remote_host: String,
    remote_port: u16,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let channel = match client
            .open_direct_tcpip_channel(&remote_host, remote_port, Some(peer_addr))
            .await
        {
            Ok(channel) => channel,
            Err(e) => {
                warn!(
                    "Failed to open channel to {}:{} for {}: {}",
                    remote_host, remote_port, peer_addr, e
                );
                return;
            }
        };

        match pump(stream, channel, cancel).await {
            Ok((sent, received)) => debug!(
                "Connection from {} to {}:{} closed: {} bytes sent, {} bytes received",
                peer_addr, remote_host, remote_port, sent, received
            ),
            Err(e) => debug!("Connection from {} ended with error: {}", peer_addr, e),
        }
    });
}

/// Copy data both ways between a local socket and a channel.
///
/// A local half-close is passed on as EOF and the remote side is still
/// drained until it closes, so request/response protocols finish cleanly.
async fn pump(
    mut tcp_stream: TcpStream,
    mut channel: Channel<Msg>,
    cancel: CancellationToken,
) -> std::io::Result<(u64, u64)> {
    let mut buffer = vec![0u8; PUMP_BUFFER_SIZE];
    let mut sent = 0u64;
    let mut received = 0u64;
    let mut local_open = true;

    loop {
        tokio::select! {
            result = tcp_stream.read(&mut buffer), if local_open => {
                match result? {
                    0 => {
                        local_open = false;
                        if channel.eof().await.is_err() {
                            break;
                        }
                    }
                    n => {
                        if let Err(e) = channel.data(&buffer[..n]).await {
                            return Err(std::io::Error::other(e.to_string()));
                        }
                        sent += n as u64;
                    }
                }
            }
            msg = channel.wait() => {
                match msg {
                    Some(russh::ChannelMsg::Data { data }) => {
                        tcp_stream.write_all(&data).await?;
                        received += data.len() as u64;
                    }
                    Some(russh::ChannelMsg::Eof) => {
                        let _ = tcp_stream.shutdown().await;
                        if !local_open {
                            break;
                        }
                    }
                    Some(russh::ChannelMsg::Close) | None => break,
                    Some(other) => trace!("Ignoring channel message: {:?}", other),
                }
            }
            _ = cancel.cancelled() => break,
        }
    }

    let _ = channel.close().await;
    Ok((sent, received))
}
