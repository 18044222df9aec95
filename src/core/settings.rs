use std::path::PathBuf;
use std::time::Duration;

use crate::platform::{NativePlatform, Platform};

pub const DEFAULT_API_HOST: &str = "127.0.0.1";
pub const DEFAULT_API_PORT: u16 = 8000;
pub const DEFAULT_METRICS_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_COMMAND_LOG_CAPACITY: usize = 500;
pub const DEFAULT_TASK_QUEUE_CAPACITY: usize = 1024;

/// Resolved runtime settings for a switchboard process.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api_host: String,
    pub api_port: u16,
    pub data_dir: PathBuf,
    /// Fleet config file; defaults to `<data_dir>/config.json`.
    pub config_path: Option<PathBuf>,
    pub metrics_interval: Duration,
    pub command_log_capacity: usize,
    pub task_queue_capacity: usize,
    pub log_level: tracing::Level,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_host: DEFAULT_API_HOST.to_string(),
            api_port: DEFAULT_API_PORT,
            data_dir: NativePlatform::data_dir(),
            config_path: None,
            metrics_interval: Duration::from_secs(DEFAULT_METRICS_INTERVAL_SECS),
            command_log_capacity: DEFAULT_COMMAND_LOG_CAPACITY,
            task_queue_capacity: DEFAULT_TASK_QUEUE_CAPACITY,
            log_level: tracing::Level::INFO,
        }
    }
}

impl Settings {
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("switchboard.db")
    }

    pub fn fleet_config_path(&self) -> PathBuf {
        self.config_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("config.json"))
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}

pub fn parse_log_level(value: &str) -> Option<tracing::Level> {
    match value.to_ascii_lowercase().as_str() {
        "trace" => Some(tracing::Level::TRACE),
        "debug" => Some(tracing::Level::DEBUG),
        "info" => Some(tracing::Level::INFO),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "error" => Some(tracing::Level::ERROR),
        _ => None,
    }
}
