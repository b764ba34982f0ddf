//! Transport endpoints.
//!
//! Two delivery models behind one role-specific interface:
//!
//! | Variant    | Socket | Boundaries        | Acknowledgment         |
//! |------------|--------|-------------------|------------------------|
//! | `Reliable` | TCP    | u32 LE length     | one byte per message   |
//! | `Datagram` | UDP    | one per datagram  | none                   |
//!
//! Pipelines hold a [`SenderEndpoint`] or [`ReceiverEndpoint`] and only call
//! `start`, `send` / `receive` and `acknowledge` on it; the variant is
//! chosen once at construction.

pub mod datagram;
pub mod reliable;

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::StreamError;
use crate::framing::StreamLimits;

pub use datagram::{DatagramReceiver, DatagramSender};
pub use reliable::{ReliableReceiver, ReliableSender};

// ── Acknowledgment bytes ─────────────────────────────────────────

/// Receiver took the message off the stream and delivered it.
pub const ACK: u8 = b'T';

/// Receiver took the message off the stream but dropped it.
pub const NACK: u8 = b'F';

/// Default deadline for establishing a reliable connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Verdict the receiver returns for one reliable message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Accept,
    Reject,
}

impl AckOutcome {
    pub const fn to_byte(self) -> u8 {
        match self {
            Self::Accept => ACK,
            Self::Reject => NACK,
        }
    }
}

// ── TransportKind ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Tcp,
    Udp,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
        }
    }
}

impl FromStr for TransportKind {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            other => Err(StreamError::Config(format!(
                "unknown transport {other:?} (expected tcp or udp)"
            ))),
        }
    }
}

// ── EndpointConfig ───────────────────────────────────────────────

/// Where and how an endpoint talks. Fixed once the endpoint is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub kind: TransportKind,
    /// Remote host for senders, local bind address for receivers.
    pub address: String,
    pub port: u16,
    /// Reliable senders give up connecting after this long.
    pub connect_timeout: Duration,
    /// Largest block accepted off the wire.
    pub max_message_size: usize,
}

impl EndpointConfig {
    pub fn new(kind: TransportKind, address: impl Into<String>, port: u16) -> Self {
        Self {
            kind,
            address: address.into(),
            port,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_message_size: StreamLimits::for_dimensions(640, 480).max_message_size,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_limits(mut self, limits: StreamLimits) -> Self {
        self.max_message_size = limits.max_message_size;
        self
    }

    /// `address:port`, bracketing bare IPv6 literals.
    pub fn authority(&self) -> String {
        if self.address.contains(':') && !self.address.starts_with('[') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }
}

// ── SenderEndpoint ───────────────────────────────────────────────

/// Sending side of a transport.
pub enum SenderEndpoint {
    Reliable(ReliableSender),
    Datagram(DatagramSender),
}

impl SenderEndpoint {
    pub fn from_config(config: &EndpointConfig) -> Self {
        match config.kind {
            TransportKind::Tcp => Self::Reliable(ReliableSender::new(config)),
            TransportKind::Udp => Self::Datagram(DatagramSender::new(config)),
        }
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Reliable(_) => TransportKind::Tcp,
            Self::Datagram(_) => TransportKind::Udp,
        }
    }

    /// Connect (reliable) or prepare the destination (datagram).
    pub async fn start(&mut self) -> Result<(), StreamError> {
        match self {
            Self::Reliable(t) => t.start().await,
            Self::Datagram(t) => t.start().await,
        }
    }

    /// Transmit one framed message.
    ///
    /// On the reliable variant this returns only after the receiver's
    /// acknowledgment has been read.
    pub async fn send(&mut self, message: Bytes) -> Result<(), StreamError> {
        match self {
            Self::Reliable(t) => t.send(message).await,
            Self::Datagram(t) => t.send(message).await,
        }
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Reliable(t) => t.peer_addr(),
            Self::Datagram(t) => t.peer_addr(),
        }
    }
}

// ── ReceiverEndpoint ─────────────────────────────────────────────

/// Receiving side of a transport.
pub enum ReceiverEndpoint {
    Reliable(ReliableReceiver),
    Datagram(DatagramReceiver),
}

impl ReceiverEndpoint {
    pub fn from_config(config: &EndpointConfig) -> Self {
        match config.kind {
            TransportKind::Tcp => Self::Reliable(ReliableReceiver::new(config)),
            TransportKind::Udp => Self::Datagram(DatagramReceiver::new(config)),
        }
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Reliable(_) => TransportKind::Tcp,
            Self::Datagram(_) => TransportKind::Udp,
        }
    }

    /// Whether [`start`](Self::start) waits for a peer to connect.
    pub fn accepts_connection(&self) -> bool {
        matches!(self, Self::Reliable(_))
    }

    /// Bind, and for the reliable variant wait for one sender to connect.
    ///
    /// Cancel-safe: dropping the future leaves the endpoint bound but
    /// unconnected.
    pub async fn start(&mut self) -> Result<(), StreamError> {
        match self {
            Self::Reliable(t) => t.start().await,
            Self::Datagram(t) => t.start().await,
        }
    }

    /// Next whole message off the wire, or `None` when a reliable sender
    /// closed the connection between messages.
    ///
    /// Cancel-safe. Oversized messages come back as a per-frame
    /// [`StreamError::OversizedFrame`]; losing the link mid-message is fatal.
    pub async fn receive(&mut self) -> Result<Option<Bytes>, StreamError> {
        match self {
            Self::Reliable(t) => t.receive().await,
            Self::Datagram(t) => t.receive().await.map(Some),
        }
    }

    /// Answer the message last returned by [`receive`](Self::receive).
    /// Datagram endpoints have no back channel and ignore this.
    pub async fn acknowledge(&mut self, outcome: AckOutcome) -> Result<(), StreamError> {
        match self {
            Self::Reliable(t) => t.acknowledge(outcome).await,
            Self::Datagram(_) => Ok(()),
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Reliable(t) => t.local_addr(),
            Self::Datagram(t) => t.local_addr(),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
