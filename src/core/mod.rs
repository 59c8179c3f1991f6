pub mod error;
pub mod lock;
pub mod logging;
pub mod timestamp;

pub use error::{
    CaptureError, ClientError, ConfigError, DecodeError, EncodeError, FilesystemError,
    FramingError, PipelineError, TransportError,
};
pub use logging::{ComponentLogger, LogContext};
pub use timestamp::{Clock, ManualClock, SystemClock};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const SHUTDOWN_POLL_MS: u64 = 100;

/// Resolves once `running` drops to false.
pub async fn wait_for_shutdown(running: Arc<AtomicBool>) {
    while running.load(Ordering::Relaxed) {
        tokio::time::sleep(Duration::from_millis(SHUTDOWN_POLL_MS)).await;
    }
}

/// Sleeps for `duration` or until shutdown, whichever comes first.
/// Returns `false` when woken by shutdown.
pub async fn sleep_or_shutdown(duration: Duration, running: Arc<AtomicBool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => running.load(Ordering::Relaxed),
        _ = wait_for_shutdown(running.clone()) => false,
    }
}
