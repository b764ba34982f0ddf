//! Reliable (TCP) endpoints.
//!
//! ## Exchange per message
//!
//! ```text
//! sender                                   receiver
//!   │ ── len: u32 LE ‖ metadata ‖ 0x00 ‖ payload ──► │
//!   │ ◄──────────── 'T' (delivered) / 'F' (dropped) ─ │
//! ```
//!
//! The sender does not write the next message until the reply byte for the
//! previous one has been read, so sender throughput follows receiver
//! processing speed.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info};

use crate::error::StreamError;
use crate::framing::{LengthPrefixCodec, StreamItem};
use crate::transport::{ACK, AckOutcome, EndpointConfig, NACK};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

fn split_boxed<S>(stream: S) -> (BoxedReader, BoxedWriter)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    (Box::new(reader), Box::new(writer))
}

fn tune(stream: &TcpStream) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("TCP_NODELAY not applied: {e}");
    }
}

// ── ReliableSender ───────────────────────────────────────────────

struct SenderLink {
    frames: FramedWrite<BoxedWriter, LengthPrefixCodec>,
    acks: BoxedReader,
}

/// Connecting side; one message in flight at a time.
pub struct ReliableSender {
    target: String,
    connect_timeout: Duration,
    max_message_size: usize,
    peer: Option<SocketAddr>,
    link: Option<SenderLink>,
}

impl ReliableSender {
    pub fn new(config: &EndpointConfig) -> Self {
        Self {
            target: config.authority(),
            connect_timeout: config.connect_timeout,
            max_message_size: config.max_message_size,
            peer: None,
            link: None,
        }
    }

    /// Use an already connected stream; [`start`](Self::start) becomes a no-op.
    pub fn from_stream<S>(stream: S, max_message_size: usize) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let mut sender = Self {
            target: "<stream>".into(),
            connect_timeout: Duration::ZERO,
            max_message_size,
            peer: None,
            link: None,
        };
        let (reader, writer) = split_boxed(stream);
        sender.attach(reader, writer);
        sender
    }

    fn attach(&mut self, reader: BoxedReader, writer: BoxedWriter) {
        self.link = Some(SenderLink {
            frames: FramedWrite::new(writer, LengthPrefixCodec::new(self.max_message_size)),
            acks: reader,
        });
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// Connect to the receiver, giving up after the configured timeout.
    pub async fn start(&mut self) -> Result<(), StreamError> {
        if self.link.is_some() {
            return Ok(());
        }

        let connect = TcpStream::connect(self.target.as_str());
        let stream = match tokio::time::timeout(self.connect_timeout, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(StreamError::Connection(format!(
                    "connect to {} failed: {e}",
                    self.target
                )));
            }
            Err(_) => {
                return Err(StreamError::Connection(format!(
                    "connect to {} timed out after {:?}",
                    self.target, self.connect_timeout
                )));
            }
        };

        tune(&stream);
        self.peer = stream.peer_addr().ok();
        let (reader, writer) = stream.into_split();
        self.attach(Box::new(reader), Box::new(writer));
        info!(target_addr = %self.target, "connected to receiver");
        Ok(())
    }

    /// Write one message and wait for its acknowledgment.
    pub async fn send(&mut self, message: Bytes) -> Result<(), StreamError> {
        if message.len() > self.max_message_size {
            return Err(StreamError::OversizedFrame {
                size: message.len(),
                max: self.max_message_size,
            });
        }
        let link = self
            .link
            .as_mut()
            .ok_or_else(|| StreamError::Connection("not connected".into()))?;

        link.frames.send(message).await?;

        let reply = match link.acks.read_u8().await {
            Ok(byte) => byte,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(StreamError::Acknowledgment(
                    "connection closed before acknowledgment".into(),
                ));
            }
            Err(e) => {
                return Err(StreamError::Acknowledgment(format!(
                    "reading acknowledgment failed: {e}"
                )));
            }
        };

        match reply {
            ACK => Ok(()),
            NACK => Err(StreamError::FrameRejected),
            other => Err(StreamError::Acknowledgment(format!(
                "unexpected acknowledgment byte 0x{other:02x}"
            ))),
        }
    }
}

// ── ReliableReceiver ─────────────────────────────────────────────

struct ReceiverLink {
    frames: FramedRead<BoxedReader, LengthPrefixCodec>,
    acks: BoxedWriter,
}

/// Listening side; serves exactly one sender per session.
pub struct ReliableReceiver {
    bind_addr: String,
    max_message_size: usize,
    listener: Option<TcpListener>,
    local: Option<SocketAddr>,
    peer: Option<SocketAddr>,
    link: Option<ReceiverLink>,
}

impl ReliableReceiver {
    pub fn new(config: &EndpointConfig) -> Self {
        Self {
            bind_addr: config.authority(),
            max_message_size: config.max_message_size,
            listener: None,
            local: None,
            peer: None,
            link: None,
        }
    }

    /// Accept on an already bound listener.
    pub fn from_listener(listener: TcpListener, max_message_size: usize) -> Self {
        let local = listener.local_addr().ok();
        Self {
            bind_addr: local.map(|a| a.to_string()).unwrap_or_default(),
            max_message_size,
            listener: Some(listener),
            local,
            peer: None,
            link: None,
        }
    }

    /// Use an already connected stream; [`start`](Self::start) becomes a no-op.
    pub fn from_stream<S>(stream: S, max_message_size: usize) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let mut receiver = Self {
            bind_addr: "<stream>".into(),
            max_message_size,
            listener: None,
            local: None,
            peer: None,
            link: None,
        };
        let (reader, writer) = split_boxed(stream);
        receiver.attach(reader, writer);
        receiver
    }

    fn attach(&mut self, reader: BoxedReader, writer: BoxedWriter) {
        self.link = Some(ReceiverLink {
            frames: FramedRead::new(reader, LengthPrefixCodec::new(self.max_message_size)),
            acks: writer,
        });
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Bind the listening socket if that has not happened yet.
    pub async fn bind(&mut self) -> Result<SocketAddr, StreamError> {
        if let Some(local) = self.local.filter(|_| self.listener.is_some()) {
            return Ok(local);
        }
        let listener = TcpListener::bind(self.bind_addr.as_str())
            .await
            .map_err(|e| StreamError::Connection(format!("bind {} failed: {e}", self.bind_addr)))?;
        let local = listener.local_addr()?;
        info!(%local, "listening for sender");
        self.listener = Some(listener);
        self.local = Some(local);
        Ok(local)
    }

    /// Wait for one sender to connect. Cancel-safe.
    pub async fn start(&mut self) -> Result<(), StreamError> {
        if self.link.is_some() {
            return Ok(());
        }
        self.bind().await?;

        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| StreamError::Connection("listener unavailable".into()))?;
        let (stream, peer) = listener
            .accept()
            .await
            .map_err(|e| StreamError::Connection(format!("accept failed: {e}")))?;

        tune(&stream);
        info!(%peer, "sender connected");
        self.peer = Some(peer);
        // Further senders are refused for the rest of the session.
        self.listener = None;

        let (reader, writer) = stream.into_split();
        self.attach(Box::new(reader), Box::new(writer));
        Ok(())
    }

    /// Next whole block, or `None` once the sender has closed the
    /// connection between two messages. A close in the middle of a message
    /// is an I/O error. Cancel-safe.
    pub async fn receive(&mut self) -> Result<Option<Bytes>, StreamError> {
        let link = self
            .link
            .as_mut()
            .ok_or_else(|| StreamError::Connection("no sender connected".into()))?;

        match link.frames.next().await {
            Some(Ok(StreamItem::Block(block))) => Ok(Some(block)),
            Some(Ok(StreamItem::Oversized { announced })) => Err(StreamError::OversizedFrame {
                size: announced,
                max: self.max_message_size,
            }),
            Some(Err(e)) => Err(StreamError::TransportIo(e)),
            None => {
                info!(peer = ?self.peer, "sender closed the connection");
                Ok(None)
            }
        }
    }

    /// Reply to the last block taken off the stream.
    pub async fn acknowledge(&mut self, outcome: AckOutcome) -> Result<(), StreamError> {
        let link = self
            .link
            .as_mut()
            .ok_or_else(|| StreamError::Connection("no sender connected".into()))?;
        link.acks.write_all(&[outcome.to_byte()]).await?;
        link.acks.flush().await?;
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use tokio_util::codec::Encoder;

    use crate::transport::TransportKind;

    fn wire(message: &'static [u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        LengthPrefixCodec::new(1024)
            .encode(Bytes::from_static(message), &mut buf)
            .unwrap();
        buf.to_vec()
    }

    fn scripted_sender(reply: &[u8]) -> ReliableSender {
        let mock = tokio_test::io::Builder::new()
            .write(&wire(b"msg"))
            .read(reply)
            .build();
        ReliableSender::from_stream(mock, 1024)
    }

    #[tokio::test]
    async fn ack_completes_send() {
        let mut sender = scripted_sender(b"T");
        sender.send(Bytes::from_static(b"msg")).await.unwrap();
    }

    #[tokio::test]
    async fn nack_is_a_per_frame_rejection() {
        let mut sender = scripted_sender(b"F");
        let err = sender.send(Bytes::from_static(b"msg")).await.unwrap_err();
        assert!(matches!(err, StreamError::FrameRejected));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn unknown_ack_byte_is_fatal() {
        let mut sender = scripted_sender(b"X");
        let err = sender.send(Bytes::from_static(b"msg")).await.unwrap_err();
        assert!(matches!(err, StreamError::Acknowledgment(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn missing_ack_is_fatal() {
        let mock = tokio_test::io::Builder::new().write(&wire(b"msg")).build();
        let mut sender = ReliableSender::from_stream(mock, 1024);
        let err = sender.send(Bytes::from_static(b"msg")).await.unwrap_err();
        assert!(matches!(err, StreamError::Acknowledgment(_)));
    }

    #[tokio::test]
    async fn oversized_message_is_not_written() {
        let mock = tokio_test::io::Builder::new().build();
        let mut sender = ReliableSender::from_stream(mock, 4);
        let err = sender.send(Bytes::from_static(b"too long")).await.unwrap_err();
        assert!(matches!(err, StreamError::OversizedFrame { size: 8, max: 4 }));
    }

    #[tokio::test]
    async fn receiver_reads_blocks_and_acks() {
        let (near, far) = tokio::io::duplex(256);
        let mut receiver = ReliableReceiver::from_stream(far, 64);
        let (mut peer_rx, mut peer_tx) = tokio::io::split(near);

        let mut out = wire(b"one");
        out.extend(wire(b"two"));
        peer_tx.write_all(&out).await.unwrap();

        assert_eq!(&receiver.receive().await.unwrap().unwrap()[..], b"one");
        receiver.acknowledge(AckOutcome::Accept).await.unwrap();
        assert_eq!(&receiver.receive().await.unwrap().unwrap()[..], b"two");
        receiver.acknowledge(AckOutcome::Reject).await.unwrap();

        let mut acks = [0u8; 2];
        peer_rx.read_exact(&mut acks).await.unwrap();
        assert_eq!(&acks, b"TF");

        drop(peer_tx);
        drop(peer_rx);
        assert!(receiver.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn close_inside_a_message_is_fatal() {
        let (near, far) = tokio::io::duplex(256);
        let mut receiver = ReliableReceiver::from_stream(far, 64);

        let partial = wire(b"truncated");
        let (_, mut peer_tx) = tokio::io::split(near);
        peer_tx.write_all(&partial[..6]).await.unwrap();
        drop(peer_tx);

        let err = receiver.receive().await.unwrap_err();
        assert!(matches!(err, StreamError::TransportIo(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn receiver_reports_oversized_announcement() {
        let (near, far) = tokio::io::duplex(256);
        let mut receiver = ReliableReceiver::from_stream(far, 8);
        let (_peer_rx, mut peer_tx) = tokio::io::split(near);

        peer_tx.write_all(&100u32.to_le_bytes()).await.unwrap();
        let err = receiver.receive().await.unwrap_err();
        assert!(matches!(err, StreamError::OversizedFrame { size: 100, max: 8 }));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn close_while_skipping_oversized_is_fatal() {
        let (near, far) = tokio::io::duplex(256);
        let mut receiver = ReliableReceiver::from_stream(far, 8);
        let (_peer_rx, mut peer_tx) = tokio::io::split(near);

        peer_tx.write_all(&100u32.to_le_bytes()).await.unwrap();
        peer_tx.write_all(&[0u8; 20]).await.unwrap();
        let err = receiver.receive().await.unwrap_err();
        assert!(matches!(err, StreamError::OversizedFrame { size: 100, .. }));

        drop(peer_tx);
        let err = receiver.receive().await.unwrap_err();
        assert!(matches!(err, StreamError::TransportIo(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn refused_connect_is_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = EndpointConfig::new(TransportKind::Tcp, "127.0.0.1", port)
            .with_connect_timeout(Duration::from_secs(2));
        let mut sender = ReliableSender::new(&config);
        let err = sender.start().await.unwrap_err();
        assert!(matches!(err, StreamError::Connection(_)));
        assert!(!sender.is_connected());
    }

    #[tokio::test]
    async fn loopback_exchange() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut receiver = ReliableReceiver::from_listener(listener, 1024);
        assert_eq!(receiver.local_addr(), Some(addr));

        let server = tokio::spawn(async move {
            receiver.start().await.unwrap();
            let block = receiver.receive().await.unwrap().unwrap();
            receiver.acknowledge(AckOutcome::Accept).await.unwrap();
            block
        });

        let config = EndpointConfig::new(TransportKind::Tcp, "127.0.0.1", addr.port());
        let mut sender = ReliableSender::new(&config);
        sender.start().await.unwrap();
        assert_eq!(sender.peer_addr(), Some(addr));
        sender.send(Bytes::from_static(b"hello")).await.unwrap();

        assert_eq!(&server.await.unwrap()[..], b"hello");
    }
}
