// src/recorder/mod.rs

use std::sync::Arc;

use bytes::Bytes;
use chrono::TimeDelta;

/// Receives the latest annotated JPEG for the live preview.
pub type PreviewTap = Arc<tokio::sync::watch::Sender<Option<Bytes>>>;

#[derive(Debug, Clone, Copy)]
pub struct RecorderConfig {
    pub rotation_interval: TimeDelta,
    pub fps: u32,
}

pub mod annotate;
pub mod recorder;
pub mod retention_fs;
pub mod rotator;
pub mod sink_avi;

pub use annotate::annotate;
pub use recorder::{run_frame_writer, FrameCounters, FrameStats, FrameWriter};
pub use retention_fs::RetentionRing;
pub use rotator::VideoFileRotator;
pub use sink_avi::MjpegAviWriter;
