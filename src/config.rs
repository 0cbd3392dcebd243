use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::application::CollectionMode;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub topology_file: PathBuf,
    pub mode: CollectionMode,
    pub history_size: usize,
    pub live_interval: Duration,
    pub replay_interval: Duration,
    pub error_pause: Duration,
    pub parallel_limit: usize,
    pub resubscribe_delay: Duration,
    pub gateway_url: String,
    pub device_port: u16,
    pub username: String,
    pub password: String,
    pub bus_broker: String,
    pub bus_channel: String,
    pub bus_enabled: bool,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env::var("GNMON_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3000),
            topology_file: env::var("GNMON_TOPOLOGY")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("topology.clab.yml")),
            mode: env::var("GNMON_MODE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(CollectionMode::Parallel),
            history_size: env::var("GNMON_HISTORY_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(120),
            live_interval: Duration::from_millis(
                env::var("GNMON_LIVE_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(500),
            ),
            replay_interval: Duration::from_millis(
                env::var("GNMON_REPLAY_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
            error_pause: Duration::from_millis(
                env::var("GNMON_ERROR_PAUSE_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
            parallel_limit: env::var("GNMON_PARALLEL_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            resubscribe_delay: Duration::from_millis(
                env::var("GNMON_RESUBSCRIBE_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5000),
            ),
            gateway_url: env::var("GNMON_GATEWAY_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8090".to_string()),
            device_port: env::var("GNMON_DEVICE_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(57401),
            username: env::var("GNMON_USERNAME").unwrap_or_else(|_| "admin".to_string()),
            password: env::var("GNMON_PASSWORD").unwrap_or_else(|_| "NokiaSrl1!".to_string()),
            bus_broker: env::var("GNMON_BUS_BROKER")
                .unwrap_or_else(|_| "localhost:1883".to_string()),
            bus_channel: env::var("GNMON_BUS_CHANNEL").unwrap_or_else(|_| "gnmi-data".to_string()),
            bus_enabled: env::var("GNMON_BUS_ENABLED")
                .map(|s| s == "1" || s.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            log_level: env::var("GNMON_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
