// src/recorder/recorder.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use image::DynamicImage;
use tokio::sync::mpsc;

use super::annotate::annotate;
use super::rotator::VideoFileRotator;
use super::PreviewTap;
use crate::codecs::{FrameCodec, JpegCodec};
use crate::core::{Clock, ComponentLogger, LogContext, PipelineError};

/// Per-connection totals, reported when the connection ends.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    pub received: u64,
    pub persisted: u64,
    pub decode_failures: u64,
    pub encode_failures: u64,
}

/// Running totals shared by all writers, updated as each frame is handled.
#[derive(Debug, Default)]
pub struct FrameCounters {
    pub persisted: AtomicU64,
    pub decode_failures: AtomicU64,
}

/// Decode → stamp → annotate → encode → preview → persist, one frame at a time.
pub struct FrameWriter {
    rotator: VideoFileRotator,
    clock: Arc<dyn Clock>,
    preview: Option<PreviewTap>,
    codec: JpegCodec,
    peer: String,
    stats: FrameStats,
    counters: Arc<FrameCounters>,
}

impl FrameWriter {
    pub fn new(
        rotator: VideoFileRotator,
        clock: Arc<dyn Clock>,
        preview: Option<PreviewTap>,
        counters: Arc<FrameCounters>,
        peer: &str,
    ) -> Self {
        Self {
            rotator,
            clock,
            preview,
            codec: JpegCodec,
            peer: peer.to_string(),
            stats: FrameStats::default(),
            counters,
        }
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Handles one reassembled payload. Bad images are logged and dropped;
    /// only persistence and configuration problems come back as errors.
    pub fn handle(&mut self, payload: &[u8]) -> Result<(), PipelineError> {
        self.stats.received += 1;

        let image = match self.codec.decode(payload) {
            Ok(image) => image,
            Err(e) => {
                self.stats.decode_failures += 1;
                self.counters.decode_failures.fetch_add(1, Ordering::Relaxed);
                self.warn_at(
                    "decode",
                    &format!("frame #{} dropped ({} bytes): {}", self.stats.received, payload.len(), e),
                );
                return Ok(());
            }
        };

        let received_at = self.clock.now();
        let (width, height) = (image.width(), image.height());
        let stamped = DynamicImage::ImageRgb8(annotate(image, &received_at));

        let jpeg = match self.codec.encode(&stamped) {
            Ok(jpeg) => Bytes::from(jpeg),
            Err(e) => {
                self.stats.encode_failures += 1;
                self.warn_at("encode", &format!("frame #{} dropped: {}", self.stats.received, e));
                return Ok(());
            }
        };

        if let Some(preview) = &self.preview {
            preview.send_replace(Some(jpeg.clone()));
        }

        self.rotator.write_frame(&jpeg, width, height)?;
        self.stats.persisted += 1;
        self.counters.persisted.fetch_add(1, Ordering::Relaxed);
        if self.rotator.maybe_rotate()? {
            self.debug("rotated output file");
        }
        Ok(())
    }

    /// Closes the active file and returns the totals.
    pub fn finish(mut self) -> Result<FrameStats, PipelineError> {
        self.rotator.close()?;
        Ok(self.stats)
    }
}

impl ComponentLogger for FrameWriter {
    fn log_context(&self) -> LogContext {
        LogContext::new("writer", &self.peer)
    }
}

/// Writer loop for one connection. Runs on its own thread and blocks on the
/// channel; returns once the sender side is dropped or a frame fails fatally.
pub fn run_frame_writer(
    mut rx: mpsc::Receiver<Bytes>,
    mut writer: FrameWriter,
) -> Result<FrameStats, PipelineError> {
    while let Some(payload) = rx.blocking_recv() {
        if let Err(e) = writer.handle(&payload) {
            writer.error_at("persist", &e.to_string());
            return Err(e);
        }
    }
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use crate::recorder::retention_fs::RetentionRing;
    use crate::recorder::sink_avi::read_avi_info;
    use chrono::{Local, TimeDelta, TimeZone};
    use image::{Rgb, RgbImage};

    fn jpeg(w: u32, h: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(w, h, Rgb([90, 40, 200]));
        JpegCodec.encode(&DynamicImage::ImageRgb8(img)).unwrap()
    }

    fn writer_with(
        dir: &std::path::Path,
        preview: Option<PreviewTap>,
        counters: Arc<FrameCounters>,
    ) -> (FrameWriter, Arc<RetentionRing>) {
        let ring = Arc::new(RetentionRing::new(dir.to_path_buf(), 5).unwrap());
        let clock = Arc::new(ManualClock::new(Local.with_ymd_and_hms(2024, 6, 1, 21, 0, 0).unwrap()));
        let rotator = VideoFileRotator::new(ring.clone(), clock.clone(), TimeDelta::minutes(60), 10);
        (FrameWriter::new(rotator, clock, preview, counters, "test"), ring)
    }

    fn writer(dir: &std::path::Path, preview: Option<PreviewTap>) -> (FrameWriter, Arc<RetentionRing>) {
        writer_with(dir, preview, Arc::new(FrameCounters::default()))
    }

    #[test]
    fn corrupt_frame_is_counted_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (mut w, ring) = writer(dir.path(), None);

        w.handle(&jpeg(96, 64)).unwrap();
        w.handle(b"\xff\xd8 definitely not a jpeg").unwrap();
        w.handle(&jpeg(96, 64)).unwrap();

        let stats = w.finish().unwrap();
        assert_eq!(stats.received, 3);
        assert_eq!(stats.persisted, 2);
        assert_eq!(stats.decode_failures, 1);

        let files = ring.entries().unwrap();
        assert_eq!(files.len(), 1);
        let info = read_avi_info(&files[0]).unwrap();
        assert_eq!((info.frames, info.width, info.height), (2, 96, 64));
    }

    #[test]
    fn shared_counters_move_with_every_frame() {
        let dir = tempfile::tempdir().unwrap();
        let counters = Arc::new(FrameCounters::default());
        let (mut w, _ring) = writer_with(dir.path(), None, counters.clone());

        w.handle(&jpeg(64, 48)).unwrap();
        w.handle(b"garbage").unwrap();
        w.handle(&jpeg(64, 48)).unwrap();

        // noch offen, Zähler schon sichtbar
        assert_eq!(counters.persisted.load(Ordering::Relaxed), 2);
        assert_eq!(counters.decode_failures.load(Ordering::Relaxed), 1);

        w.finish().unwrap();
        assert_eq!(counters.persisted.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn preview_sees_the_annotated_frame() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = tokio::sync::watch::channel(None);
        let (mut w, _ring) = writer(dir.path(), Some(Arc::new(tx)));

        w.handle(&jpeg(64, 48)).unwrap();
        let latest = rx.borrow().clone().expect("preview published");
        let decoded = JpegCodec.decode(&latest).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[test]
    fn size_change_ends_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let (w, _ring) = writer(dir.path(), None);
        let (tx, rx) = mpsc::channel(4);

        let handle = std::thread::spawn(move || run_frame_writer(rx, w));
        tx.blocking_send(Bytes::from(jpeg(64, 48))).unwrap();
        tx.blocking_send(Bytes::from(jpeg(32, 32))).unwrap();
        drop(tx);

        let result = handle.join().unwrap();
        assert!(matches!(result, Err(PipelineError::Configuration(_))));
    }
}
