use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use image::{DynamicImage, Rgb, RgbImage};
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

use crate::capture::FrameSource;
use crate::client::Connector;
use crate::codecs::{FrameCodec, JpegCodec};
use crate::core::{CaptureError, DecodeError, EncodeError};
use crate::server::Acceptor;

const DUPLEX_CAPACITY: usize = 256 * 1024;

/// Refuses the first `failures` connects, then hands out in-memory pipes.
/// The far end of every successful connect arrives on the returned receiver.
pub struct FlakyConnector {
    failures_left: u32,
    attempts: Arc<AtomicU32>,
    accepted: mpsc::UnboundedSender<DuplexStream>,
}

impl FlakyConnector {
    pub fn new(failures: u32) -> (Self, mpsc::UnboundedReceiver<DuplexStream>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                failures_left: failures,
                attempts: Arc::new(AtomicU32::new(0)),
                accepted: tx,
            },
            rx,
        )
    }

    pub fn attempts(&self) -> Arc<AtomicU32> {
        self.attempts.clone()
    }
}

impl Connector for FlakyConnector {
    type Stream = DuplexStream;

    fn target(&self) -> &str {
        "mock"
    }

    async fn connect(&mut self) -> io::Result<DuplexStream> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "mock refused"));
        }

        let (near, far) = tokio::io::duplex(DUPLEX_CAPACITY);
        self.accepted
            .send(far)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "mock acceptor gone"))?;
        Ok(near)
    }
}

/// Accept side of the server fed by the test: each queued item is either an
/// in-memory connection or an accept error. Pends forever once the queue is
/// closed and empty.
pub struct ScriptedAcceptor {
    queue: mpsc::UnboundedReceiver<io::Result<DuplexStream>>,
    accepted: u32,
}

impl ScriptedAcceptor {
    pub fn new() -> (Self, mpsc::UnboundedSender<io::Result<DuplexStream>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { queue: rx, accepted: 0 }, tx)
    }
}

impl Acceptor for ScriptedAcceptor {
    type Stream = DuplexStream;

    async fn accept(&mut self) -> io::Result<(DuplexStream, String)> {
        match self.queue.recv().await {
            Some(Ok(stream)) => {
                self.accepted += 1;
                Ok((stream, format!("scripted-{}", self.accepted)))
            }
            Some(Err(e)) => Err(e),
            None => std::future::pending().await,
        }
    }
}

/// Cycles through a fixed set of images, optionally failing after a number
/// of captures.
pub struct MemorySource {
    frames: Vec<DynamicImage>,
    next: usize,
    captured: u32,
    fail_after: Option<u32>,
}

impl MemorySource {
    pub fn new(frames: Vec<DynamicImage>) -> Self {
        Self {
            frames,
            next: 0,
            captured: 0,
            fail_after: None,
        }
    }

    /// `count` flat frames of slightly different colour.
    pub fn solid(width: u32, height: u32, count: u8) -> Self {
        let frames = (0..count.max(1))
            .map(|i| {
                DynamicImage::ImageRgb8(RgbImage::from_pixel(
                    width,
                    height,
                    Rgb([40u8.wrapping_mul(i), 120, 200]),
                ))
            })
            .collect();
        Self::new(frames)
    }

    pub fn failing_after(mut self, captures: u32) -> Self {
        self.fail_after = Some(captures);
        self
    }
}

impl FrameSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn capture(&mut self) -> Result<DynamicImage, CaptureError> {
        if self.fail_after.is_some_and(|n| self.captured >= n) || self.frames.is_empty() {
            return Err(CaptureError::Unavailable("memory source exhausted".into()));
        }
        let frame = self.frames[self.next].clone();
        self.next = (self.next + 1) % self.frames.len();
        self.captured += 1;
        Ok(frame)
    }
}

/// Encodes every image to the same bytes; decodes as JPEG.
pub struct CannedCodec {
    payload: Vec<u8>,
}

impl CannedCodec {
    pub fn new(payload: Vec<u8>) -> Self {
        Self { payload }
    }
}

impl FrameCodec for CannedCodec {
    fn content_type(&self) -> &'static str {
        "application/octet-stream"
    }

    fn encode(&self, _image: &DynamicImage) -> Result<Vec<u8>, EncodeError> {
        Ok(self.payload.clone())
    }

    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, DecodeError> {
        JpegCodec.decode(bytes)
    }
}
