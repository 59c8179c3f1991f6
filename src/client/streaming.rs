// src/client/streaming.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use super::session::{ConnectionState, Connector, TransportSession};
use crate::capture::{CaptureScheduler, FrameSource};
use crate::codecs::{FrameCodec, FrameTransform, JpegCodec};
use crate::core::{sleep_or_shutdown, ClientError, Clock, SystemClock};
use crate::framing::{contains_separator, frame};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ClientStats {
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub connect_attempts: u64,
}

impl ClientStats {
    pub fn absorb(&mut self, other: ClientStats) {
        self.frames_sent += other.frames_sent;
        self.frames_dropped += other.frames_dropped;
        self.connect_attempts += other.connect_attempts;
    }
}

/// What one pass through the capture cycle ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Sent,
    Dropped,
    Suspended,
    Disconnected,
}

/// Gate → capture → transform → encode → frame → send, strictly in sequence.
pub struct StreamingClient<C: Connector> {
    session: TransportSession<C>,
    source: Box<dyn FrameSource>,
    scheduler: CaptureScheduler,
    transform: FrameTransform,
    codec: Box<dyn FrameCodec>,
    clock: Arc<dyn Clock>,
    frame_interval: Option<Duration>,
    running: Arc<AtomicBool>,
    frames_sent: u64,
    frames_dropped: u64,
}

impl<C: Connector> StreamingClient<C> {
    pub fn new(
        session: TransportSession<C>,
        source: Box<dyn FrameSource>,
        scheduler: CaptureScheduler,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            session,
            source,
            scheduler,
            transform: FrameTransform::default(),
            codec: Box::new(JpegCodec),
            clock: Arc::new(SystemClock),
            frame_interval: None,
            running,
            frames_sent: 0,
            frames_dropped: 0,
        }
    }

    pub fn with_transform(mut self, transform: FrameTransform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_codec(mut self, codec: Box<dyn FrameCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_frame_interval(mut self, interval: Option<Duration>) -> Self {
        self.frame_interval = interval;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    pub fn stats(&self) -> ClientStats {
        ClientStats {
            frames_sent: self.frames_sent,
            frames_dropped: self.frames_dropped,
            connect_attempts: self.session.connect_attempts(),
        }
    }

    /// One cycle. `Err(ClientError::Shutdown)` when shutdown interrupted a
    /// wait; capture failures are returned as-is and end the client.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, ClientError> {
        if !self.scheduler.should_capture_now(self.clock.as_ref()) {
            let wait = self.scheduler.time_until_active(self.clock.now().time());
            // Verbindung nicht über Stunden offen halten
            self.session.disconnect();
            log::info!("[client] outside active hours, idle for {:?}", wait);
            if !sleep_or_shutdown(wait, self.running.clone()).await {
                return Err(ClientError::Shutdown);
            }
            return Ok(CycleOutcome::Suspended);
        }

        if self.session.ensure_connected().await.is_err() {
            return Err(ClientError::Shutdown);
        }

        let image = self.source.capture()?;
        let image = self.transform.apply(image);

        let payload = match self.codec.encode(&image) {
            Ok(payload) => payload,
            Err(e) => {
                self.frames_dropped += 1;
                log::warn!("[client] {}", e);
                return Ok(CycleOutcome::Dropped);
            }
        };

        if contains_separator(&payload) {
            self.frames_dropped += 1;
            log::warn!(
                "[client] encoded frame ({} bytes) contains the stream separator, dropped",
                payload.len()
            );
            return Ok(CycleOutcome::Dropped);
        }

        match self.session.send(&frame(&payload)).await {
            Ok(()) => {
                self.frames_sent += 1;
                Ok(CycleOutcome::Sent)
            }
            Err(e) => {
                self.frames_dropped += 1;
                log::warn!("[client] send failed: {}", e);
                Ok(CycleOutcome::Disconnected)
            }
        }
    }

    /// Runs cycles until shutdown. Returns the counters on a clean stop.
    /// The connection is closed on every exit path.
    pub async fn run(&mut self) -> Result<ClientStats, ClientError> {
        log::info!(
            "[client] streaming from {} (active hours {:?})",
            self.source.name(),
            self.scheduler.active_hours()
        );

        let result = self.stream_until_stopped().await;

        self.session.disconnect();
        let stats = self.stats();
        log::info!(
            "[client] stopped: {} sent, {} dropped, {} connect attempts",
            stats.frames_sent,
            stats.frames_dropped,
            stats.connect_attempts
        );
        result.map(|()| stats)
    }

    async fn stream_until_stopped(&mut self) -> Result<(), ClientError> {
        while self.running.load(Ordering::Relaxed) {
            let started = Instant::now();
            match self.run_cycle().await {
                Ok(CycleOutcome::Sent) | Ok(CycleOutcome::Dropped) => {}
                Ok(CycleOutcome::Suspended) | Ok(CycleOutcome::Disconnected) => continue,
                Err(ClientError::Shutdown) => break,
                Err(e) => {
                    log::error!("[client] stopping: {}", e);
                    return Err(e);
                }
            }

            if let Some(interval) = self.frame_interval {
                let elapsed = started.elapsed();
                if elapsed < interval && !sleep_or_shutdown(interval - elapsed, self.running.clone()).await {
                    break;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use crate::framing::{FrameScanner, SEPARATOR};
    use crate::testing::mocks::{CannedCodec, FlakyConnector, MemorySource};
    use chrono::{Local, TimeZone, TimeDelta};
    use tokio::io::AsyncReadExt;

    fn running() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(true))
    }

    #[tokio::test]
    async fn one_cycle_delivers_one_frame() {
        let (connector, mut accepted) = FlakyConnector::new(2);
        let run = running();
        let session = TransportSession::new(connector, Duration::from_millis(1), run.clone());
        let mut client = StreamingClient::new(
            session,
            Box::new(MemorySource::solid(32, 24, 3)),
            CaptureScheduler::always(),
            run,
        );

        assert_eq!(client.run_cycle().await.unwrap(), CycleOutcome::Sent);
        assert_eq!(client.state(), ConnectionState::Streaming);
        assert_eq!(client.stats().connect_attempts, 3);

        let mut stream = accepted.recv().await.unwrap();
        drop(client);
        let mut wire = Vec::new();
        stream.read_to_end(&mut wire).await.unwrap();

        let mut scanner = FrameScanner::default();
        scanner.push(&wire);
        let payload = scanner.next_frame().unwrap().expect("one frame");
        assert_eq!(&payload[..2], &[0xFF, 0xD8]);
        assert!(scanner.next_frame().unwrap().is_none());
        assert_eq!(scanner.pending_len(), 0);
    }

    #[tokio::test]
    async fn payload_with_separator_is_not_sent() {
        let (connector, _accepted) = FlakyConnector::new(0);
        let run = running();
        let session = TransportSession::new(connector, Duration::from_millis(1), run.clone());
        let mut poisoned = b"\xff\xd8".to_vec();
        poisoned.extend_from_slice(SEPARATOR);
        let mut client = StreamingClient::new(
            session,
            Box::new(MemorySource::solid(8, 8, 1)),
            CaptureScheduler::always(),
            run,
        )
        .with_codec(Box::new(CannedCodec::new(poisoned)));

        assert_eq!(client.run_cycle().await.unwrap(), CycleOutcome::Dropped);
        assert_eq!(client.stats().frames_dropped, 1);
        assert_eq!(client.stats().frames_sent, 0);
    }

    #[tokio::test]
    async fn capture_failure_is_fatal() {
        let (connector, _accepted) = FlakyConnector::new(0);
        let run = running();
        let session = TransportSession::new(connector, Duration::from_millis(1), run.clone());
        let mut client = StreamingClient::new(
            session,
            Box::new(MemorySource::solid(8, 8, 1).failing_after(1)),
            CaptureScheduler::always(),
            run,
        );

        let err = client.run().await.unwrap_err();
        assert!(matches!(err, ClientError::Capture(_)));
        assert_eq!(client.stats().frames_sent, 1);
        // Verbindung ist auch im Fehlerfall zu
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn inactive_hour_suspends_until_shutdown() {
        let (connector, _accepted) = FlakyConnector::new(0);
        let run = running();
        let session = TransportSession::new(connector, Duration::from_millis(1), run.clone());
        // 05:00, aktiv nur nachts
        let clock = Arc::new(ManualClock::new(Local.with_ymd_and_hms(2024, 6, 1, 5, 0, 0).unwrap()));
        let mut client = StreamingClient::new(
            session,
            Box::new(MemorySource::solid(8, 8, 1)),
            CaptureScheduler::new(&[22, 23, 0, 1]).unwrap(),
            run.clone(),
        )
        .with_clock(clock.clone());

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            run.store(false, Ordering::SeqCst);
        });
        assert!(matches!(client.run_cycle().await, Err(ClientError::Shutdown)));
        assert_eq!(client.state(), ConnectionState::Disconnected);
        stopper.await.unwrap();

        clock.advance(TimeDelta::hours(18));
        assert!(client.scheduler.should_capture_now(clock.as_ref()));
    }
}
