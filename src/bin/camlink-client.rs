// src/bin/camlink-client.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{error, info};
use tokio::runtime::Runtime;

use camlink::client::run_client;
use camlink::config::{Config, DEFAULT_CONFIG_PATH};
use camlink::core::ClientError;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cfg_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.into());

    let cfg = Config::load(&cfg_path)?;
    let client = cfg.client()?.clone();
    info!("[camlink] loaded {}: streaming to {}", cfg_path, client.server);

    let running = Arc::new(AtomicBool::new(true));
    {
        let r = running.clone();
        ctrlc::set_handler(move || {
            info!("[camlink] shutdown requested");
            r.store(false, Ordering::SeqCst);
        })?;
    }

    let rt = Runtime::new()?;
    match rt.block_on(async move { run_client(&client, running).await }) {
        Ok(stats) => {
            info!("[camlink] client stopped after {} frames", stats.frames_sent);
            Ok(())
        }
        Err(e @ ClientError::ConnectivityLost { .. }) => {
            // Dienstverwaltung startet neu
            error!("[camlink] {}", e);
            std::process::exit(2);
        }
        Err(e) => Err(e.into()),
    }
}
