// src/core/logging.rs
use std::sync::atomic::{AtomicU64, Ordering};

use super::timestamp::utc_ns_now;

// Globale Sequenznummer für Korrelation
static LOG_SEQUENCE: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone)]
pub struct LogContext {
    pub component: String,
    pub instance_id: String,
    pub stage: Option<String>,
    pub sequence: u64,
    pub timestamp_ns: u64,
}

impl LogContext {
    pub fn new(component: &str, instance_id: &str) -> Self {
        Self {
            component: component.to_string(),
            instance_id: instance_id.to_string(),
            stage: None,
            sequence: LOG_SEQUENCE.fetch_add(1, Ordering::Relaxed),
            timestamp_ns: utc_ns_now(),
        }
    }

    pub fn with_stage(mut self, stage: &str) -> Self {
        self.stage = Some(stage.to_string());
        self
    }

    pub fn format(&self, level: &str, message: &str) -> String {
        let stage_info = match &self.stage {
            Some(stage) => format!(" stage={}", stage),
            None => String::new(),
        };

        format!(
            "[{}][seq={:06}][{}:{}{}] {}",
            level, self.sequence, self.component, self.instance_id, stage_info, message
        )
    }
}

/// Uniform "which component, which connection, which stage" logging.
pub trait ComponentLogger {
    fn log_context(&self) -> LogContext;

    fn debug(&self, message: &str) {
        let ctx = self.log_context();
        log::debug!("{}", ctx.format("DEBUG", message));
    }

    fn info(&self, message: &str) {
        let ctx = self.log_context();
        log::info!("{}", ctx.format("INFO", message));
    }

    fn warn(&self, message: &str) {
        let ctx = self.log_context();
        log::warn!("{}", ctx.format("WARN", message));
    }

    fn error(&self, message: &str) {
        let ctx = self.log_context();
        log::error!("{}", ctx.format("ERROR", message));
    }

    fn warn_at(&self, stage: &str, message: &str) {
        let ctx = self.log_context().with_stage(stage);
        log::warn!("{}", ctx.format("WARN", message));
    }

    fn error_at(&self, stage: &str, message: &str) {
        let ctx = self.log_context().with_stage(stage);
        log::error!("{}", ctx.format("ERROR", message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_context_creation() {
        let ctx = LogContext::new("conn", "10.0.0.7:51512");

        assert_eq!(ctx.component, "conn");
        assert_eq!(ctx.instance_id, "10.0.0.7:51512");
        assert!(ctx.sequence > 0);
        assert!(ctx.timestamp_ns > 0);
        assert!(ctx.stage.is_none());
    }

    #[test]
    fn test_log_formatting_with_stage() {
        let ctx = LogContext::new("conn", "peer");
        let formatted = ctx.format("INFO", "accepted");

        assert!(formatted.contains("[INFO]"));
        assert!(formatted.contains("[conn:peer]"));
        assert!(formatted.contains("accepted"));

        let formatted = ctx.with_stage("decode").format("WARN", "bad jpeg");
        assert!(formatted.contains("stage=decode"));
    }
}
