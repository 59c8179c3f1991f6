// src/server/preview.rs

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use serde::Serialize;
use tokio::sync::watch;

use super::handler::ServerStatus;
use crate::codecs::{FrameCodec, JpegCodec};
use crate::core::wait_for_shutdown;
use crate::recorder::PreviewTap;

#[derive(Clone)]
pub struct PreviewState {
    pub latest: watch::Receiver<Option<Bytes>>,
    pub status: Arc<ServerStatus>,
}

/// A preview channel with nothing published yet.
pub fn channel(status: Arc<ServerStatus>) -> (PreviewTap, PreviewState) {
    let (tx, rx) = watch::channel(None);
    (Arc::new(tx), PreviewState { latest: rx, status })
}

pub fn router(state: PreviewState) -> Router {
    Router::new()
        .route("/preview.jpg", get(latest_frame))
        .route("/health", get(health))
        .with_state(state)
}

pub async fn serve(state: PreviewState, addr: SocketAddr, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("[preview] listening on http://{}/preview.jpg", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(wait_for_shutdown(running))
        .await?;
    Ok(())
}

async fn latest_frame(State(state): State<PreviewState>) -> Response {
    let latest = state.latest.borrow().clone();
    match latest {
        Some(jpeg) => (
            [
                (header::CONTENT_TYPE, JpegCodec.content_type()),
                (header::CACHE_CONTROL, "no-store"),
            ],
            jpeg,
        )
            .into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub active_connections: u64,
    pub connections_total: u64,
    pub frames_persisted: u64,
    pub decode_failures: u64,
    pub has_frame: bool,
}

async fn health(State(state): State<PreviewState>) -> Json<Health> {
    let s = &state.status;
    Json(Health {
        status: "ok",
        active_connections: s.active_connections.load(Ordering::Relaxed),
        connections_total: s.connections_total.load(Ordering::Relaxed),
        frames_persisted: s.frames.persisted.load(Ordering::Relaxed),
        decode_failures: s.frames.decode_failures.load(Ordering::Relaxed),
        has_frame: state.latest.borrow().is_some(),
    })
}
