// src/bin/camlink-server.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::info;
use tokio::runtime::Runtime;

use camlink::config::{Config, DEFAULT_CONFIG_PATH};
use camlink::server::run_server;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // ------------------------------------------------------------
    // Config
    // ------------------------------------------------------------
    let cfg_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.into());

    let cfg = Config::load(&cfg_path)?;
    let server = cfg.server()?.clone();
    info!(
        "[camlink] loaded {}: listen {}, {} files of {} min in {:?}",
        cfg_path,
        server.listen,
        server.max_files,
        server.rotation_minutes,
        server.output_dir
    );

    // ------------------------------------------------------------
    // Graceful shutdown
    // ------------------------------------------------------------
    let running = Arc::new(AtomicBool::new(true));
    {
        let r = running.clone();
        ctrlc::set_handler(move || {
            info!("[camlink] shutdown requested");
            r.store(false, Ordering::SeqCst);
        })?;
    }

    let rt = Runtime::new()?;
    rt.block_on(async move { run_server(&server, running).await })?;

    info!("[camlink] server stopped");
    Ok(())
}
