// src/client/supervisor.rs
//
// Connectivity watchdog. Probe failures first rebuild the streaming loop
// locally; if that keeps not helping, the process gives up and exits non-zero
// so the service manager restarts it.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;

use super::session::Connector;
use super::streaming::{ClientStats, StreamingClient};
use crate::config::ProbeConfig;
use crate::core::{sleep_or_shutdown, ClientError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    RestartStreaming,
    ExitProcess,
}

/// Counts consecutive probe failures and the restarts they caused.
#[derive(Debug, Clone)]
pub struct ProbeTracker {
    failures_before_restart: u32,
    restarts_before_exit: u32,
    consecutive_failures: u32,
    restarts: u32,
}

impl ProbeTracker {
    pub fn new(failures_before_restart: u32, restarts_before_exit: u32) -> Self {
        Self {
            failures_before_restart: failures_before_restart.max(1),
            restarts_before_exit,
            consecutive_failures: 0,
            restarts: 0,
        }
    }

    pub fn from_config(cfg: &ProbeConfig) -> Self {
        Self::new(cfg.failures_before_restart, cfg.restarts_before_exit)
    }

    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Records one probe result. A success resets both counters.
    pub fn record(&mut self, reachable: bool) -> Option<Escalation> {
        if reachable {
            self.consecutive_failures = 0;
            self.restarts = 0;
            return None;
        }

        self.consecutive_failures += 1;
        if self.consecutive_failures < self.failures_before_restart {
            return None;
        }

        self.consecutive_failures = 0;
        if self.restarts >= self.restarts_before_exit {
            return Some(Escalation::ExitProcess);
        }
        self.restarts += 1;
        Some(Escalation::RestartStreaming)
    }
}

/// True if a TCP connect to `target` completes within `limit`.
pub async fn probe_once(target: &str, limit: Duration) -> bool {
    matches!(timeout(limit, TcpStream::connect(target)).await, Ok(Ok(_)))
}

async fn watch_connectivity(
    tracker: &mut ProbeTracker,
    cfg: &ProbeConfig,
    target: &str,
    running: Arc<AtomicBool>,
) -> Escalation {
    loop {
        if !sleep_or_shutdown(cfg.interval(), running.clone()).await {
            // the streaming side winds down on its own
            return std::future::pending().await;
        }

        let reachable = probe_once(target, cfg.timeout()).await;
        if !reachable {
            log::warn!(
                "[supervisor] probe to {} failed ({} in a row)",
                target,
                tracker.consecutive_failures() + 1
            );
        }
        if let Some(escalation) = tracker.record(reachable) {
            return escalation;
        }
    }
}

enum Round {
    Finished(Result<ClientStats, ClientError>),
    Escalated(Escalation),
}

/// Runs streaming clients built by `make_client` until shutdown, a fatal
/// client error, or connectivity loss past the restart budget.
pub async fn supervise<C, F>(
    probe: &ProbeConfig,
    probe_target: &str,
    mut make_client: F,
    running: Arc<AtomicBool>,
) -> Result<ClientStats, ClientError>
where
    C: Connector,
    F: FnMut() -> Result<StreamingClient<C>, ClientError>,
{
    if !probe.enabled {
        return make_client()?.run().await;
    }

    let mut tracker = ProbeTracker::from_config(probe);
    let mut totals = ClientStats::default();

    loop {
        let mut client = make_client()?;
        let round = tokio::select! {
            res = client.run() => Round::Finished(res),
            esc = watch_connectivity(&mut tracker, probe, probe_target, running.clone()) => Round::Escalated(esc),
        };
        totals.absorb(client.stats());

        match round {
            Round::Finished(Ok(_)) => return Ok(totals),
            Round::Finished(Err(e)) => return Err(e),
            Round::Escalated(Escalation::RestartStreaming) => {
                log::warn!(
                    "[supervisor] {} unreachable, restarting streaming (restart {} of {})",
                    probe_target,
                    tracker.restarts(),
                    probe.restarts_before_exit
                );
            }
            Round::Escalated(Escalation::ExitProcess) => {
                log::error!("[supervisor] {} still unreachable, giving up", probe_target);
                return Err(ClientError::ConnectivityLost {
                    restarts: tracker.restarts(),
                });
            }
        }
    }
}
