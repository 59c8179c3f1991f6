use std::error::Error as StdError;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures on the byte stream between client and server.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("no connection established")]
    NotConnected,
    #[error("no data for {secs}s, closing")]
    IdleTimeout { secs: u64 },
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum FramingError {
    #[error("no frame separator within {pending} pending bytes (limit {limit})")]
    Overflow { pending: usize, limit: usize },
}

#[derive(Debug, Error)]
#[error("frame decode failed: {0}")]
pub struct DecodeError(#[from] pub image::ImageError);

#[derive(Debug, Error)]
#[error("frame encode failed: {0}")]
pub struct EncodeError(#[from] pub image::ImageError);

#[derive(Debug, Error)]
#[error("{context} {path:?}: {source}")]
pub struct FilesystemError {
    pub context: &'static str,
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl FilesystemError {
    pub fn new(context: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self {
            context,
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{message}")]
    Message { message: String },
    #[error("frame size changed mid-stream: file is {expected_width}x{expected_height}, frame is {width}x{height}")]
    DimensionMismatch {
        expected_width: u32,
        expected_height: u32,
        width: u32,
        height: u32,
    },
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl ConfigError {
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    pub fn with_context<E>(context: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Context {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture device unavailable: {0}")]
    Unavailable(String),
    #[error("capture read failed: {0}")]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Everything that ends a server connection.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Framing(#[from] FramingError),
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error("frame writer stopped unexpectedly")]
    WriterGone,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error("shutdown requested")]
    Shutdown,
    #[error("server unreachable after {restarts} streaming restarts")]
    ConnectivityLost { restarts: u32 },
}
