//! Per-frame metadata sidecar.
//!
//! Serialized as compact JSON ahead of the payload. The JSON encoder escapes
//! control characters, so the encoded block never contains the `0x00`
//! delimiter that separates it from the payload.
//!
//! ```text
//! {"frame_size":48213,"timestamp":1718000000123456,"sequence":17,"width":640,"height":480}
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StreamError;

/// Structured, validated sidecar data accompanying one payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameMetadata {
    /// Payload size in bytes.
    pub frame_size: u64,
    /// Capture time in microseconds since the UNIX epoch.
    pub timestamp: u64,
    /// Per-session sequence number assigned by the sender.
    #[serde(default)]
    pub sequence: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Extension fields, carried through untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl FrameMetadata {
    pub fn new(frame_size: u64, timestamp: u64) -> Self {
        Self {
            frame_size,
            timestamp,
            sequence: 0,
            width: None,
            height: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Attach an extension field.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Internal consistency, independent of any payload.
    pub fn is_valid(&self) -> bool {
        let dims_ok = match (self.width, self.height) {
            (Some(w), Some(h)) => w > 0 && h > 0,
            (None, None) => true,
            _ => false,
        };
        dims_ok && self.frame_size > 0
    }

    /// `true` when this metadata correctly describes `payload`.
    pub fn describes(&self, payload: &[u8]) -> bool {
        self.is_valid() && self.frame_size == payload.len() as u64
    }

    /// Serialize to compact JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StreamError> {
        if !self.is_valid() {
            return Err(StreamError::Metadata(format!(
                "refusing to encode invalid metadata: {self:?}"
            )));
        }
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse and validate a metadata block.
    pub fn parse(raw: &[u8]) -> Result<Self, StreamError> {
        let text = std::str::from_utf8(raw)
            .map_err(|e| StreamError::Metadata(format!("not utf-8: {e}")))?;
        let meta: FrameMetadata = serde_json::from_str(text)?;
        if !meta.is_valid() {
            return Err(StreamError::Metadata(format!("invalid metadata: {text}")));
        }
        Ok(meta)
    }
}

// ── Tests ────────────────────────────────────────────────────────
