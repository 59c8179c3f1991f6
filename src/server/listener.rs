// src/server/listener.rs

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use tokio::io::AsyncRead;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;

use super::handler::{ConnectionHandler, ServerContext, ServerStatus};
use super::preview;
use crate::config::ServerConfig;
use crate::core::{sleep_or_shutdown, wait_for_shutdown, SystemClock};
use crate::recorder::RetentionRing;

const RESTART_DELAY: Duration = Duration::from_secs(2);
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(500);
const MAX_ACCEPT_ERRORS: u32 = 20;

/// Builds the shared server state from configuration, starts the preview if
/// enabled, and serves until shutdown.
pub async fn run_server(cfg: &ServerConfig, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let retention = Arc::new(RetentionRing::new(cfg.output_dir.clone(), cfg.max_files)?);
    let trimmed = retention.enforce()?;
    if !trimmed.is_empty() {
        log::info!("[listener] trimmed {} old files to max_files={}", trimmed.len(), cfg.max_files);
    }

    let status = Arc::new(ServerStatus::default());
    let preview_tap = if cfg.preview.enabled {
        let addr: SocketAddr = cfg
            .preview
            .bind
            .parse()
            .with_context(|| format!("server.preview.bind {:?}", cfg.preview.bind))?;
        let (tap, state) = preview::channel(status.clone());
        let preview_running = running.clone();
        tokio::spawn(async move {
            if let Err(e) = preview::serve(state, addr, preview_running).await {
                log::error!("[preview] stopped: {:#}", e);
            }
        });
        Some(tap)
    } else {
        None
    };

    let ctx = ServerContext {
        retention,
        clock: Arc::new(SystemClock),
        recorder: cfg.recorder(),
        idle_timeout: cfg.idle_timeout(),
        max_pending: cfg.max_pending_bytes,
        preview: preview_tap,
        status,
    };

    serve_forever(&cfg.listen, ctx, running).await
}

/// Binds and accepts until shutdown. Per-connection accept errors are
/// retried on the same listener; only a listener that keeps failing is
/// re-bound. Handlers live across re-binds and are drained at shutdown.
pub async fn serve_forever(listen: &str, ctx: ServerContext, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let mut handlers = JoinSet::new();

    while running.load(Ordering::Relaxed) {
        let result = match TcpListener::bind(listen).await {
            Ok(mut listener) => {
                log::info!("[listener] listening on {}", listen);
                accept_loop(&mut listener, &ctx, running.clone(), &mut handlers).await
            }
            Err(e) => Err(anyhow::Error::new(e).context(format!("bind {}", listen))),
        };

        match result {
            Ok(()) => break,
            Err(e) => {
                log::error!("[listener] {:#}, re-binding in {:?}", e, RESTART_DELAY);
                if !sleep_or_shutdown(RESTART_DELAY, running.clone()).await {
                    break;
                }
            }
        }
    }

    drain(&mut handlers).await;
    log::info!("[listener] stopped");
    Ok(())
}

/// Runs one acceptor until shutdown, then waits for its connections.
pub async fn serve<A: Acceptor>(mut acceptor: A, ctx: ServerContext, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let mut handlers = JoinSet::new();
    let result = accept_loop(&mut acceptor, &ctx, running, &mut handlers).await;
    drain(&mut handlers).await;
    result
}

/// Accepts until shutdown, spawning one handler task per connection into
/// `handlers`. A failed accept is logged and retried after a short pause;
/// after `MAX_ACCEPT_ERRORS` failures in a row the listener counts as broken
/// and the error is returned. Never waits for handlers.
pub async fn accept_loop<A: Acceptor>(
    acceptor: &mut A,
    ctx: &ServerContext,
    running: Arc<AtomicBool>,
    handlers: &mut JoinSet<()>,
) -> anyhow::Result<()> {
    let mut consecutive_errors = 0u32;

    loop {
        let accepted = tokio::select! {
            res = acceptor.accept() => res,
            // fertige Handler einsammeln
            Some(_) = handlers.join_next(), if !handlers.is_empty() => continue,
            _ = wait_for_shutdown(running.clone()) => return Ok(()),
        };

        let (stream, peer) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                consecutive_errors += 1;
                if consecutive_errors >= MAX_ACCEPT_ERRORS {
                    return Err(anyhow::Error::new(e).context(format!("accept failed {} times in a row", consecutive_errors)));
                }
                log::warn!(
                    "[listener] accept: {} ({} active), retrying in {:?}",
                    e,
                    ctx.status.active_connections.load(Ordering::Relaxed),
                    ACCEPT_RETRY_DELAY
                );
                if !sleep_or_shutdown(ACCEPT_RETRY_DELAY, running.clone()).await {
                    return Ok(());
                }
                continue;
            }
        };
        consecutive_errors = 0;

        let status = ctx.status.clone();
        status.connections_total.fetch_add(1, Ordering::Relaxed);
        status.active_connections.fetch_add(1, Ordering::Relaxed);

        let handler = ConnectionHandler::new(&peer, ctx.clone());
        let handler_running = running.clone();
        handlers.spawn(async move {
            // Fehler sind bereits im Handler geloggt
            let _ = handler.run(stream, handler_running).await;
            status.active_connections.fetch_sub(1, Ordering::Relaxed);
        });
    }
}

async fn drain(handlers: &mut JoinSet<()>) {
    if !handlers.is_empty() {
        log::info!("[listener] waiting for {} connections to close", handlers.len());
    }
    while handlers.join_next().await.is_some() {}
}

/// Source of inbound connections for the accept loop.
pub trait Acceptor: Send {
    type Stream: AsyncRead + Unpin + Send + 'static;

    fn accept(&mut self) -> impl Future<Output = io::Result<(Self::Stream, String)>> + Send;
}

impl Acceptor for TcpListener {
    type Stream = TcpStream;

    async fn accept(&mut self) -> io::Result<(TcpStream, String)> {
        let (stream, peer) = TcpListener::accept(self).await?;
        if let Err(e) = stream.set_nodelay(true) {
            log::debug!("[listener] set_nodelay for {}: {}", peer, e);
        }
        Ok((stream, peer.to_string()))
    }
}
