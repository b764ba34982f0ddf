//! Frame sources.
//!
//! - [`TestPatternSource`]: synthetic moving gradient, stands in for a
//!   camera when no capture device is wired up.
//! - [`RawFileSource`]: consecutive uncompressed frames of fixed size read
//!   from a file; end of file is end of stream.
//!
//! Neither source paces itself; the sender pipeline throttles reads to the
//! configured frame rate.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use crate::error::StreamError;
use crate::media::FrameSource;
use crate::media::types::{PixelFormat, RawFrame};

// ── TestPatternSource ────────────────────────────────────────────

/// Generates a diagonal gradient that shifts by one step per frame.
#[derive(Debug)]
pub struct TestPatternSource {
    width: u32,
    height: u32,
    format: PixelFormat,
    /// Stop after this many frames (`None` = endless).
    limit: Option<u64>,
    produced: u64,
    opened: bool,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
            limit: None,
            produced: 0,
            opened: false,
        }
    }

    /// End the stream after `frames` frames.
    pub fn with_limit(mut self, frames: u64) -> Self {
        self.limit = Some(frames);
        self
    }

    /// Frames produced so far.
    pub fn produced(&self) -> u64 {
        self.produced
    }

    fn render(&self, phase: u64) -> Vec<u8> {
        let bpp = self.format.bytes_per_pixel();
        let mut data = Vec::with_capacity(self.format.frame_len(self.width, self.height));
        for y in 0..self.height as u64 {
            for x in 0..self.width as u64 {
                let v = ((x + y + phase) & 0xFF) as u8;
                match bpp {
                    1 => data.push(v),
                    3 => data.extend_from_slice(&[v, v.wrapping_add(85), v.wrapping_add(170)]),
                    _ => data.extend_from_slice(&[v, v.wrapping_add(85), v.wrapping_add(170), 0xFF]),
                }
            }
        }
        data
    }
}

#[async_trait]
impl FrameSource for TestPatternSource {
    async fn open(&mut self) -> Result<(), StreamError> {
        if self.width == 0 || self.height == 0 {
            return Err(StreamError::Capture(format!(
                "invalid pattern size {}x{}",
                self.width, self.height
            )));
        }
        self.opened = true;
        debug!(width = self.width, height = self.height, "test pattern opened");
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<RawFrame>, StreamError> {
        if !self.opened {
            return Err(StreamError::Capture("source not opened".into()));
        }
        if self.limit.is_some_and(|limit| self.produced >= limit) {
            return Ok(None);
        }

        let data = self.render(self.produced);
        self.produced += 1;
        Ok(Some(RawFrame::new(self.width, self.height, self.format, data)))
    }

    fn close(&mut self) {
        self.opened = false;
    }
}

// ── RawFileSource ────────────────────────────────────────────────

/// Reads tightly packed frames of a fixed size from a file.
#[derive(Debug)]
pub struct RawFileSource {
    path: PathBuf,
    width: u32,
    height: u32,
    format: PixelFormat,
    file: Option<tokio::fs::File>,
}

impl RawFileSource {
    pub fn new(path: impl AsRef<Path>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            width,
            height,
            format,
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FrameSource for RawFileSource {
    async fn open(&mut self) -> Result<(), StreamError> {
        if self.format.frame_len(self.width, self.height) == 0 {
            return Err(StreamError::Capture(format!(
                "invalid frame size {}x{}",
                self.width, self.height
            )));
        }
        let file = tokio::fs::File::open(&self.path).await.map_err(|e| {
            StreamError::Capture(format!("cannot open {}: {e}", self.path.display()))
        })?;
        self.file = Some(file);
        debug!(path = %self.path.display(), "raw frame file opened");
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<RawFrame>, StreamError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| StreamError::Capture("source not opened".into()))?;

        let frame_len = self.format.frame_len(self.width, self.height);
        let mut data = vec![0u8; frame_len];
        let mut filled = 0;
        while filled < frame_len {
            let n = file
                .read(&mut data[filled..])
                .await
                .map_err(|e| StreamError::Capture(format!("read failed: {e}")))?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled == 0 {
            return Ok(None);
        }
        if filled < frame_len {
            warn!(
                path = %self.path.display(),
                "ignoring truncated trailing frame ({filled} of {frame_len} bytes)"
            );
            return Ok(None);
        }

        Ok(Some(RawFrame::new(self.width, self.height, self.format, data)))
    }

    fn close(&mut self) {
        self.file = None;
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pattern_respects_limit() {
        let mut src = TestPatternSource::new(8, 4, PixelFormat::Rgb8).with_limit(3);
        src.open().await.unwrap();
        let mut frames = Vec::new();
        while let Some(f) = src.read().await.unwrap() {
            frames.push(f);
        }
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(RawFrame::is_consistent));
        assert_ne!(frames[0].data, frames[1].data);
    }

    #[tokio::test]
    async fn pattern_requires_open() {
        let mut src = TestPatternSource::new(8, 4, PixelFormat::Gray8);
        assert!(matches!(src.read().await, Err(StreamError::Capture(_))));
    }

    #[tokio::test]
    async fn raw_file_yields_whole_frames_only() {
        let path = std::env::temp_dir().join(format!(
            "vidstream-raw-{}-{}.bin",
            std::process::id(),
            crate::media::now_micros()
        ));
        let frame_len = PixelFormat::Gray8.frame_len(4, 4);
        let mut contents = vec![1u8; frame_len];
        contents.extend(vec![2u8; frame_len]);
        contents.extend(vec![3u8; frame_len / 2]);
        std::fs::write(&path, &contents).unwrap();

        let mut src = RawFileSource::new(&path, 4, 4, PixelFormat::Gray8);
        src.open().await.unwrap();
        let first = src.read().await.unwrap().unwrap();
        let second = src.read().await.unwrap().unwrap();
        assert!(first.data.iter().all(|&b| b == 1));
        assert!(second.data.iter().all(|&b| b == 2));
        assert!(src.read().await.unwrap().is_none());
        src.close();

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn raw_file_missing_is_capture_error() {
        let mut src = RawFileSource::new("/definitely/not/here.raw", 4, 4, PixelFormat::Gray8);
        assert!(matches!(src.open().await, Err(StreamError::Capture(_))));
    }
}
