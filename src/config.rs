use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::capture::{CaptureScheduler, FrameSource, ImageDirSource, SyntheticSource};
use crate::codecs::{FrameTransform, Orientation};
use crate::core::{CaptureError, ConfigError};
use crate::framing::DEFAULT_MAX_PENDING;
use crate::recorder::RecorderConfig;

pub const DEFAULT_CONFIG_PATH: &str = "camlink.toml";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: Option<ServerConfig>,
    #[serde(default)]
    pub client: Option<ClientConfig>,
}

// ---------- Server ----------
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_rotation_minutes")]
    pub rotation_minutes: u32,
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    #[serde(default = "default_video_fps")]
    pub video_fps: u32,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_max_pending_bytes")]
    pub max_pending_bytes: usize,
    #[serde(default)]
    pub preview: PreviewConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PreviewConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_preview_bind")]
    pub bind: String,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: default_preview_bind(),
        }
    }
}

impl ServerConfig {
    pub fn rotation_interval(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.rotation_minutes))
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn recorder(&self) -> RecorderConfig {
        RecorderConfig {
            rotation_interval: self.rotation_interval(),
            fps: self.video_fps,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.trim().is_empty() {
            return Err(ConfigError::message("server.listen must not be empty"));
        }
        if self.rotation_minutes == 0 {
            return Err(ConfigError::message("server.rotation_minutes must be at least 1"));
        }
        if self.max_files == 0 {
            return Err(ConfigError::message("server.max_files must be at least 1"));
        }
        if self.video_fps == 0 {
            return Err(ConfigError::message("server.video_fps must be at least 1"));
        }
        if self.idle_timeout_secs == 0 {
            return Err(ConfigError::message("server.idle_timeout_secs must be at least 1"));
        }
        if self.max_pending_bytes < 1024 {
            return Err(ConfigError::message("server.max_pending_bytes must be at least 1024"));
        }
        if self.preview.enabled && self.preview.bind.trim().is_empty() {
            return Err(ConfigError::message("server.preview.bind must not be empty"));
        }
        Ok(())
    }
}

// ---------- Client ----------
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    pub server: String,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
}

impl ClientConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Where the connectivity probe connects; the frame server unless set.
    pub fn probe_target(&self) -> &str {
        self.probe.target.as_deref().unwrap_or(&self.server)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.trim().is_empty() {
            return Err(ConfigError::message("client.server must not be empty"));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::message("client.connect_timeout_ms must be at least 1"));
        }
        self.capture.validate()?;
        self.probe.validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    Synthetic,
    ImageDir,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptureConfig {
    #[serde(default)]
    pub source: SourceKind,
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Unset means capture as fast as the link drains.
    #[serde(default)]
    pub fps: Option<u32>,
    #[serde(default = "default_active_hours")]
    pub active_hours: Vec<u32>,
    #[serde(default)]
    pub grayscale: bool,
    #[serde(default)]
    pub orientation: Orientation,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::default(),
            dir: None,
            width: default_width(),
            height: default_height(),
            fps: None,
            active_hours: default_active_hours(),
            grayscale: false,
            orientation: Orientation::default(),
        }
    }
}

impl CaptureConfig {
    pub fn scheduler(&self) -> Result<CaptureScheduler, ConfigError> {
        CaptureScheduler::new(&self.active_hours)
    }

    pub fn transform(&self) -> FrameTransform {
        FrameTransform {
            grayscale: self.grayscale,
            orientation: self.orientation,
        }
    }

    pub fn frame_interval(&self) -> Option<Duration> {
        self.fps
            .filter(|fps| *fps > 0)
            .map(|fps| Duration::from_secs_f64(1.0 / f64::from(fps)))
    }

    pub fn open_source(&self) -> Result<Box<dyn FrameSource>, CaptureError> {
        match self.source {
            SourceKind::Synthetic => Ok(Box::new(SyntheticSource::new(self.width, self.height)?)),
            SourceKind::ImageDir => {
                let dir = self
                    .dir
                    .as_deref()
                    .ok_or_else(|| CaptureError::Unavailable("capture.dir not set".into()))?;
                Ok(Box::new(ImageDirSource::open(dir)?))
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler()?;
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::message("client.capture width/height must be non-zero"));
        }
        if self.source == SourceKind::ImageDir && self.dir.is_none() {
            return Err(ConfigError::message("client.capture.dir is required for source = \"image_dir\""));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProbeConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default = "default_probe_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_failures_before_restart")]
    pub failures_before_restart: u32,
    #[serde(default = "default_restarts_before_exit")]
    pub restarts_before_exit: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            target: None,
            interval_secs: default_probe_interval_secs(),
            timeout_secs: default_probe_timeout_secs(),
            failures_before_restart: default_failures_before_restart(),
            restarts_before_exit: default_restarts_before_exit(),
        }
    }
}

impl ProbeConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        if self.interval_secs == 0 || self.timeout_secs == 0 {
            return Err(ConfigError::message("client.probe interval/timeout must be at least 1s"));
        }
        if self.failures_before_restart == 0 || self.restarts_before_exit == 0 {
            return Err(ConfigError::message(
                "client.probe failures_before_restart and restarts_before_exit must be at least 1",
            ));
        }
        Ok(())
    }
}

// ---------- Defaults ----------
fn default_listen() -> String {
    "0.0.0.0:9000".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("recordings")
}

fn default_rotation_minutes() -> u32 {
    60
}

fn default_max_files() -> usize {
    24
}

fn default_video_fps() -> u32 {
    10
}

fn default_idle_timeout_secs() -> u64 {
    30
}

fn default_max_pending_bytes() -> usize {
    DEFAULT_MAX_PENDING
}

fn default_preview_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    480
}

fn default_active_hours() -> Vec<u32> {
    (0..24).collect()
}

fn default_probe_interval_secs() -> u64 {
    60
}

fn default_probe_timeout_secs() -> u64 {
    3
}

fn default_failures_before_restart() -> u32 {
    3
}

fn default_restarts_before_exit() -> u32 {
    3
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content =
            fs::read_to_string(path).with_context(|| format!("reading config {:?}", path))?;
        let config = Self::from_toml(&content)?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::with_context("parsing config", e))?;
        config.validate().context("config validation failed")?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.is_none() && self.client.is_none() {
            return Err(ConfigError::message("config needs a [server] or [client] section"));
        }
        if let Some(server) = &self.server {
            server.validate()?;
        }
        if let Some(client) = &self.client {
            client.validate()?;
        }
        Ok(())
    }

    pub fn server(&self) -> anyhow::Result<&ServerConfig> {
        self.server
            .as_ref()
            .ok_or_else(|| ConfigError::message("missing [server] section").into())
    }

    pub fn client(&self) -> anyhow::Result<&ClientConfig> {
        self.client
            .as_ref()
            .ok_or_else(|| ConfigError::message("missing [client] section").into())
    }
}
