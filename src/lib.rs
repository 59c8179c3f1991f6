// src/lib.rs
pub mod capture;
pub mod client;
pub mod codecs;
pub mod config;
pub mod core;
pub mod framing;
pub mod recorder;
pub mod server;
pub mod testing;

// Re-export die wichtigsten Typen
pub use crate::core::{ComponentLogger, LogContext};
pub use crate::core::timestamp::utc_ns_now;
pub use framing::{FrameScanner, SEPARATOR};
