//! Headless frame sink.
//!
//! [`LogSink`] stands in for a display window: it tracks the rolling frame
//! rate, logs it periodically, optionally writes each frame as a binary PPM
//! (PGM for grayscale) and asks the pipeline to stop after a frame budget.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use vidstream_core::{DecodedFrame, FrameSink, PixelFormat, RawFrame, StreamError, ThroughputMeter};
use vidstream_core::media::now_micros;

pub struct LogSink {
    meter: ThroughputMeter,
    report_every: Duration,
    last_report: Instant,
    dump_dir: Option<PathBuf>,
    max_frames: Option<u64>,
    shown: u64,
}

impl LogSink {
    pub fn new(report_every: Duration) -> Self {
        Self {
            meter: ThroughputMeter::new(),
            report_every,
            last_report: Instant::now(),
            dump_dir: None,
            max_frames: None,
            shown: 0,
        }
    }

    /// Write every shown frame into `dir`.
    pub fn with_dump_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dump_dir = Some(dir.into());
        self
    }

    /// Request a stop once `frames` frames have been shown.
    pub fn with_max_frames(mut self, frames: u64) -> Self {
        self.max_frames = Some(frames);
        self
    }

    pub fn shown(&self) -> u64 {
        self.shown
    }

    fn dump(&self, dir: &Path, frame: &DecodedFrame) -> Result<(), StreamError> {
        let ext = match frame.frame.format {
            PixelFormat::Gray8 => "pgm",
            _ => "ppm",
        };
        let path = dir.join(format!("frame_{:08}.{ext}", frame.sequence));
        std::fs::File::create(&path)
            .and_then(|mut file| file.write_all(&encode_pnm(&frame.frame)))
            .map_err(|e| StreamError::Sink(format!("cannot write {}: {e}", path.display())))?;
        debug!(path = %path.display(), "frame dumped");
        Ok(())
    }
}

impl FrameSink for LogSink {
    fn show(&mut self, frame: &DecodedFrame) -> Result<(), StreamError> {
        self.shown += 1;
        self.meter.record(frame.encoded_size as u64);

        if let Some(dir) = &self.dump_dir {
            self.dump(dir, frame)?;
        }

        if self.last_report.elapsed() >= self.report_every {
            self.last_report = Instant::now();
            let latency_ms = now_micros().saturating_sub(frame.sent_timestamp_us) as f64 / 1000.0;
            info!(
                "{:.1} fps, {:.1} KiB/s, frame #{} {}x{}, latency {latency_ms:.1} ms",
                self.meter.frames_per_sec(),
                self.meter.bytes_per_sec() / 1024.0,
                frame.sequence,
                frame.frame.width,
                frame.frame.height,
            );
        }
        Ok(())
    }

    fn poll_stop(&mut self) -> bool {
        self.max_frames.is_some_and(|max| self.shown >= max)
    }
}

/// Binary PNM image: P5 for grayscale, P6 (RGB) for everything else.
pub fn encode_pnm(frame: &RawFrame) -> Vec<u8> {
    let magic = match frame.format {
        PixelFormat::Gray8 => "P5",
        _ => "P6",
    };
    let mut out = format!("{magic}\n{} {}\n255\n", frame.width, frame.height).into_bytes();
    let bpp = frame.format.bytes_per_pixel();
    out.reserve(frame.width as usize * frame.height as usize * bpp.min(3));

    for px in frame.data.chunks_exact(bpp) {
        match frame.format {
            PixelFormat::Gray8 => out.push(px[0]),
            PixelFormat::Rgb8 | PixelFormat::Rgba8 => out.extend_from_slice(&px[..3]),
            PixelFormat::Bgr8 => out.extend_from_slice(&[px[2], px[1], px[0]]),
        }
    }
    out
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn decoded(sequence: u64, frame: RawFrame) -> DecodedFrame {
        DecodedFrame {
            sequence,
            sent_timestamp_us: now_micros(),
            encoded_size: frame.data.len(),
            frame,
        }
    }

    #[test]
    fn pnm_reorders_bgr_and_drops_alpha() {
        let bgr = RawFrame::new(1, 1, PixelFormat::Bgr8, vec![1, 2, 3]);
        assert_eq!(encode_pnm(&bgr), b"P6\n1 1\n255\n\x03\x02\x01".to_vec());

        let rgba = RawFrame::new(1, 1, PixelFormat::Rgba8, vec![1, 2, 3, 4]);
        assert_eq!(encode_pnm(&rgba), b"P6\n1 1\n255\n\x01\x02\x03".to_vec());

        let gray = RawFrame::new(2, 1, PixelFormat::Gray8, vec![9, 8]);
        assert_eq!(encode_pnm(&gray), b"P5\n2 1\n255\n\x09\x08".to_vec());
    }

    #[test]
    fn stops_after_frame_budget() {
        let mut sink = LogSink::new(Duration::from_secs(60)).with_max_frames(2);
        let frame = RawFrame::new(1, 1, PixelFormat::Gray8, vec![0]);
        assert!(!sink.poll_stop());
        sink.show(&decoded(0, frame.clone())).unwrap();
        assert!(!sink.poll_stop());
        sink.show(&decoded(1, frame)).unwrap();
        assert!(sink.poll_stop());
        assert_eq!(sink.shown(), 2);
    }

    #[test]
    fn without_budget_never_stops() {
        let mut sink = LogSink::new(Duration::from_secs(60));
        let frame = RawFrame::new(1, 1, PixelFormat::Gray8, vec![0]);
        for i in 0..5 {
            sink.show(&decoded(i, frame.clone())).unwrap();
        }
        assert!(!sink.poll_stop());
    }

    #[test]
    fn dumps_frames_named_by_sequence() {
        let dir = std::env::temp_dir().join(format!("vidstream-dump-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let mut sink = LogSink::new(Duration::from_secs(60)).with_dump_dir(&dir);
        let frame = RawFrame::new(2, 2, PixelFormat::Rgb8, vec![5; 12]);
        sink.show(&decoded(7, frame)).unwrap();

        let written = std::fs::read(dir.join("frame_00000007.ppm")).unwrap();
        assert!(written.starts_with(b"P6\n2 2\n255\n"));
        assert_eq!(written.len(), 11 + 12);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
