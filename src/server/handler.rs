// src/server/handler.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::core::{wait_for_shutdown, Clock, ComponentLogger, LogContext, PipelineError, TransportError};
use crate::framing::FrameScanner;
use crate::recorder::{run_frame_writer, FrameStats, FrameWriter, PreviewTap, RecorderConfig, RetentionRing, VideoFileRotator};
use crate::recorder::FrameCounters;

const READ_BUF_SIZE: usize = 64 * 1024;
/// Frames buffered between socket and disk before reads stall.
pub const WRITER_QUEUE: usize = 16;

/// Shared counters, exposed on the preview's health endpoint. Frame counters
/// are updated by the writers as frames arrive.
#[derive(Debug, Default)]
pub struct ServerStatus {
    pub active_connections: AtomicU64,
    pub connections_total: AtomicU64,
    pub frames: Arc<FrameCounters>,
}

/// Everything a connection needs from the server; cloned per accept.
#[derive(Clone)]
pub struct ServerContext {
    pub retention: Arc<RetentionRing>,
    pub clock: Arc<dyn Clock>,
    pub recorder: RecorderConfig,
    pub idle_timeout: Duration,
    pub max_pending: usize,
    pub preview: Option<PreviewTap>,
    pub status: Arc<ServerStatus>,
}

/// One accepted connection: reads, reassembles, and feeds a dedicated writer
/// thread. Never reconnects.
pub struct ConnectionHandler {
    peer: String,
    ctx: ServerContext,
}

impl ConnectionHandler {
    pub fn new(peer: &str, ctx: ServerContext) -> Self {
        Self {
            peer: peer.to_string(),
            ctx,
        }
    }

    /// Runs until EOF, reset, idle timeout or shutdown, then closes the output
    /// file. Framing overflow and writer failures come back as errors.
    pub async fn run<S>(self, mut stream: S, running: Arc<AtomicBool>) -> Result<FrameStats, PipelineError>
    where
        S: AsyncRead + Unpin,
    {
        let rotator = VideoFileRotator::new(
            self.ctx.retention.clone(),
            self.ctx.clock.clone(),
            self.ctx.recorder.rotation_interval,
            self.ctx.recorder.fps,
        );
        let writer = FrameWriter::new(
            rotator,
            self.ctx.clock.clone(),
            self.ctx.preview.clone(),
            self.ctx.status.frames.clone(),
            &self.peer,
        );
        let (tx, rx) = mpsc::channel::<Bytes>(WRITER_QUEUE);

        let writer_thread = std::thread::Builder::new()
            .name(format!("writer-{}", self.peer))
            .spawn(move || run_frame_writer(rx, writer))
            .map_err(TransportError::Io)?;

        self.info("accepted");
        let read_result = self.read_loop(&mut stream, &tx, running).await;
        drop(tx);

        let writer_result = match tokio::task::spawn_blocking(move || writer_thread.join()).await {
            Ok(Ok(result)) => result,
            _ => Err(PipelineError::WriterGone),
        };

        let stats = match (read_result, writer_result) {
            (_, Err(e)) => {
                self.error_at("persist", &format!("connection closed: {}", e));
                return Err(e);
            }
            (Err(e), Ok(_)) => {
                self.error_at("read", &format!("connection closed: {}", e));
                return Err(e);
            }
            (Ok(()), Ok(stats)) => stats,
        };

        self.info(&format!(
            "closed: {} received, {} persisted, {} decode failures",
            stats.received, stats.persisted, stats.decode_failures
        ));
        Ok(stats)
    }

    async fn read_loop<S>(
        &self,
        stream: &mut S,
        tx: &mpsc::Sender<Bytes>,
        running: Arc<AtomicBool>,
    ) -> Result<(), PipelineError>
    where
        S: AsyncRead + Unpin,
    {
        let mut scanner = FrameScanner::new(self.ctx.max_pending);
        let mut buf = vec![0u8; READ_BUF_SIZE];

        loop {
            let read = tokio::select! {
                res = timeout(self.ctx.idle_timeout, stream.read(&mut buf)) => res,
                _ = wait_for_shutdown(running.clone()) => {
                    self.info("shutdown, closing");
                    return Ok(());
                }
            };

            let n = match read {
                Err(_) => {
                    let err = TransportError::IdleTimeout {
                        secs: self.ctx.idle_timeout.as_secs(),
                    };
                    self.warn_at("read", &err.to_string());
                    return Ok(());
                }
                Ok(Err(e)) => {
                    self.warn_at("read", &format!("connection lost: {}", e));
                    return Ok(());
                }
                Ok(Ok(n)) => n,
            };

            if n == 0 {
                if scanner.pending_len() > 0 {
                    self.warn_at(
                        "read",
                        &format!("EOF with {} bytes of an unfinished frame, discarded", scanner.pending_len()),
                    );
                }
                return Ok(());
            }

            scanner.push(&buf[..n]);
            while let Some(frame) = scanner.next_frame()? {
                if tx.send(frame).await.is_err() {
                    // Schreiber hat aufgegeben, Fehler kommt über join
                    return Ok(());
                }
            }
        }
    }
}

impl ComponentLogger for ConnectionHandler {
    fn log_context(&self) -> LogContext {
        LogContext::new("conn", &self.peer)
    }
}
