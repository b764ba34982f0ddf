//! Datagram (UDP) endpoints.
//!
//! One framed message per datagram, fire-and-forget. Lost or reordered
//! datagrams are not errors; they simply never reach the consumer.

use std::net::SocketAddr;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tracing::{debug, info};

use crate::error::StreamError;
use crate::framing::MAX_DATAGRAM_SIZE;
use crate::transport::EndpointConfig;

/// Receive buffer; larger than any UDP payload.
const RECV_BUFFER_SIZE: usize = 65_536;

/// ICMP "port unreachable" surfaces on some platforms as an error on the
/// next socket call. It says nothing about the datagram being processed.
fn is_icmp_noise(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionRefused
    )
}

// ── DatagramSender ───────────────────────────────────────────────

pub struct DatagramSender {
    target: String,
    socket: Option<UdpSocket>,
    remote: Option<SocketAddr>,
}

impl DatagramSender {
    pub fn new(config: &EndpointConfig) -> Self {
        Self {
            target: config.authority(),
            socket: None,
            remote: None,
        }
    }

    /// Wrap an already-bound socket sending to `remote`.
    pub fn from_socket(socket: UdpSocket, remote: SocketAddr) -> Self {
        Self {
            target: remote.to_string(),
            socket: Some(socket),
            remote: Some(remote),
        }
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.remote
    }

    /// Resolve the destination and bind an ephemeral local socket.
    pub async fn start(&mut self) -> Result<(), StreamError> {
        if self.socket.is_some() {
            return Ok(());
        }

        let remote = tokio::net::lookup_host(self.target.as_str())
            .await
            .map_err(|e| StreamError::Connection(format!("resolve {} failed: {e}", self.target)))?
            .next()
            .ok_or_else(|| {
                StreamError::Connection(format!("{} resolved to no address", self.target))
            })?;

        let local = if remote.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|e| StreamError::Connection(format!("bind {local} failed: {e}")))?;

        info!(%remote, "datagram destination ready");
        self.socket = Some(socket);
        self.remote = Some(remote);
        Ok(())
    }

    /// Send one message as a single datagram.
    pub async fn send(&mut self, message: Bytes) -> Result<(), StreamError> {
        if message.len() > MAX_DATAGRAM_SIZE {
            return Err(StreamError::OversizedFrame {
                size: message.len(),
                max: MAX_DATAGRAM_SIZE,
            });
        }
        let (Some(socket), Some(remote)) = (self.socket.as_ref(), self.remote) else {
            return Err(StreamError::Connection("datagram sender not started".into()));
        };

        match socket.send_to(&message, remote).await {
            Ok(_) => Ok(()),
            Err(e) if is_icmp_noise(&e) => {
                debug!("datagram to {remote} not delivered: {e}");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

// ── DatagramReceiver ─────────────────────────────────────────────

pub struct DatagramReceiver {
    bind_addr: String,
    max_message_size: usize,
    socket: Option<UdpSocket>,
    buf: Vec<u8>,
}

impl DatagramReceiver {
    pub fn new(config: &EndpointConfig) -> Self {
        Self {
            bind_addr: config.authority(),
            max_message_size: config.max_message_size.min(MAX_DATAGRAM_SIZE),
            socket: None,
            buf: vec![0u8; RECV_BUFFER_SIZE],
        }
    }

    /// Receive on an already-bound socket.
    pub fn from_socket(socket: UdpSocket, max_message_size: usize) -> Self {
        Self {
            bind_addr: socket
                .local_addr()
                .map(|a| a.to_string())
                .unwrap_or_default(),
            max_message_size: max_message_size.min(MAX_DATAGRAM_SIZE),
            socket: Some(socket),
            buf: vec![0u8; RECV_BUFFER_SIZE],
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Bind the local port.
    pub async fn start(&mut self) -> Result<(), StreamError> {
        if self.socket.is_some() {
            return Ok(());
        }
        let socket = UdpSocket::bind(self.bind_addr.as_str())
            .await
            .map_err(|e| StreamError::Connection(format!("bind {} failed: {e}", self.bind_addr)))?;
        info!(local = ?socket.local_addr().ok(), "datagram receiver bound");
        self.socket = Some(socket);
        Ok(())
    }

    /// Exactly one datagram. Cancel-safe.
    pub async fn receive(&mut self) -> Result<Bytes, StreamError> {
        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| StreamError::Connection("datagram receiver not started".into()))?;

        loop {
            match socket.recv_from(&mut self.buf).await {
                Ok((len, _from)) if len > self.max_message_size => {
                    return Err(StreamError::OversizedFrame {
                        size: len,
                        max: self.max_message_size,
                    });
                }
                Ok((len, _from)) => return Ok(Bytes::copy_from_slice(&self.buf[..len])),
                Err(e) if is_icmp_noise(&e) => {
                    debug!("ignoring {e} on datagram receive");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
