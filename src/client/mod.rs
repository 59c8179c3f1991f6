// src/client/mod.rs

pub mod session;
pub mod streaming;
pub mod supervisor;

pub use session::{ConnectionState, Connector, TcpConnector, TransportSession};
pub use streaming::{ClientStats, CycleOutcome, StreamingClient};
pub use supervisor::{probe_once, supervise, Escalation, ProbeTracker};

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::config::ClientConfig;
use crate::core::{ClientError, SystemClock};

/// Builds a fresh TCP streaming client from configuration.
pub fn build_client(
    cfg: &ClientConfig,
    running: Arc<AtomicBool>,
) -> Result<StreamingClient<TcpConnector>, ClientError> {
    let connector = TcpConnector::new(&cfg.server, cfg.connect_timeout());
    let session = TransportSession::new(connector, cfg.reconnect_delay(), running.clone());
    let source = cfg.capture.open_source()?;
    let scheduler = cfg.capture.scheduler()?;

    Ok(StreamingClient::new(session, source, scheduler, running)
        .with_transform(cfg.capture.transform())
        .with_clock(Arc::new(SystemClock))
        .with_frame_interval(cfg.capture.frame_interval()))
}

/// Runs the client, supervised if the probe is enabled.
pub async fn run_client(cfg: &ClientConfig, running: Arc<AtomicBool>) -> Result<ClientStats, ClientError> {
    supervise(
        &cfg.probe,
        cfg.probe_target(),
        || build_client(cfg, running.clone()),
        running.clone(),
    )
    .await
}
