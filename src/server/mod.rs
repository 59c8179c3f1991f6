// src/server/mod.rs

pub mod handler;
pub mod listener;
pub mod preview;

pub use handler::{ConnectionHandler, ServerContext, ServerStatus, WRITER_QUEUE};
pub use listener::{accept_loop, run_server, serve, serve_forever, Acceptor};
pub use preview::PreviewState;
