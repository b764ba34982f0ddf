//! Length-prefixed block codec for byte-stream transports.
//!
//! Each block travels as `len: u32 LE ‖ block`. The decoder accumulates
//! partial reads until a whole block is buffered, so coalesced or
//! fragmented writes on the stream never shift block boundaries.
//!
//! An announced length above the configured maximum is reported as
//! [`StreamItem::Oversized`] as soon as the prefix is seen. The codec then
//! discards the announced number of bytes as they arrive, without buffering
//! them, and resumes framing at the next prefix.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::framing::LENGTH_PREFIX_SIZE;

/// One unit decoded from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamItem {
    /// A complete `metadata ‖ 0x00 ‖ payload` block.
    Block(Bytes),
    /// A prefix announced more than the maximum; its bytes are being skipped.
    Oversized { announced: usize },
}

/// `tokio_util` codec adding and stripping the stream length prefix.
#[derive(Debug, Clone)]
pub struct LengthPrefixCodec {
    max_block: usize,
    /// Bytes of an oversized block still to be skipped.
    discarding: usize,
}

impl LengthPrefixCodec {
    pub fn new(max_block: usize) -> Self {
        Self {
            max_block,
            discarding: 0,
        }
    }

    pub fn max_block(&self) -> usize {
        self.max_block
    }

    /// Whether the decoder is currently skipping an oversized block.
    pub fn is_discarding(&self) -> bool {
        self.discarding > 0
    }

    fn skip_buffered(&mut self, src: &mut BytesMut) {
        let n = self.discarding.min(src.len());
        src.advance(n);
        self.discarding -= n;
    }
}

impl Decoder for LengthPrefixCodec {
    type Item = StreamItem;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.discarding > 0 {
            self.skip_buffered(src);
            if self.discarding > 0 {
                return Ok(None);
            }
        }

        if src.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        prefix.copy_from_slice(&src[..LENGTH_PREFIX_SIZE]);
        let len = u32::from_le_bytes(prefix) as usize;

        if len > self.max_block {
            src.advance(LENGTH_PREFIX_SIZE);
            self.discarding = len;
            self.skip_buffered(src);
            return Ok(Some(StreamItem::Oversized { announced: len }));
        }

        let needed = LENGTH_PREFIX_SIZE + len;
        if src.len() < needed {
            src.reserve(needed - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_SIZE);
        Ok(Some(StreamItem::Block(src.split_to(len).freeze())))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(item) => Ok(Some(item)),
            None if self.discarding > 0 => Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("stream closed with {} bytes of an oversized block unread", self.discarding),
            )),
            None if src.is_empty() => Ok(None),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("stream closed inside a block ({} bytes buffered)", src.len()),
            )),
        }
    }
}

impl Encoder<Bytes> for LengthPrefixCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > self.max_block || item.len() > u32::MAX as usize {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("block of {} bytes exceeds {}", item.len(), self.max_block),
            ));
        }

        dst.reserve(LENGTH_PREFIX_SIZE + item.len());
        dst.put_u32_le(item.len() as u32);
        dst.extend_from_slice(&item);
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
