use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{BrokerError, Result};
use crate::venue::VenueKind;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub venue: VenueConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VenueConfig {
    /// Venue selector resolved by the venue factory at startup
    #[serde(default = "default_venue_kind")]
    pub kind: String,
    /// Account tag stamped on position snapshot events
    #[serde(default = "default_account")]
    pub account: String,
}

fn default_venue_kind() -> String {
    "paper".to_string()
}

fn default_account() -> String {
    "positions".to_string()
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            kind: default_venue_kind(),
            account: default_account(),
        }
    }
}

impl VenueConfig {
    /// Service name used for health reporting, e.g. "broker_paper"
    pub fn service_name(&self) -> String {
        format!("broker_{}", self.kind)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// When false, netted instructions are logged but never submitted
    #[serde(default = "default_send_orders")]
    pub send_orders: bool,
    /// Upper bound for any single venue call; a timeout counts as a
    /// transient failure
    #[serde(default = "default_venue_timeout_ms")]
    pub venue_timeout_ms: u64,
}

fn default_send_orders() -> bool {
    true
}

fn default_venue_timeout_ms() -> u64 {
    5000
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            send_orders: default_send_orders(),
            venue_timeout_ms: default_venue_timeout_ms(),
        }
    }
}

impl ExecutionConfig {
    pub fn venue_timeout(&self) -> Duration {
        Duration::from_millis(self.venue_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    /// Balance/liveness check cadence (coarse)
    #[serde(default = "default_balance_interval")]
    pub balance_interval_secs: u64,
    /// Position snapshot cadence (fine)
    #[serde(default = "default_positions_interval")]
    pub positions_interval_secs: u64,
    /// Open-order status poll cadence
    #[serde(default = "default_order_status_interval")]
    pub order_status_interval_secs: u64,
}

fn default_balance_interval() -> u64 {
    60
}

fn default_positions_interval() -> u64 {
    15
}

fn default_order_status_interval() -> u64 {
    10
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            balance_interval_secs: default_balance_interval(),
            positions_interval_secs: default_positions_interval(),
            order_status_interval_secs: default_order_status_interval(),
        }
    }
}

/// Connection parameters handed to the pub/sub transport implementation.
/// The in-process bus ignores them.
#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    #[serde(default = "default_bus_host")]
    pub host: String,
    #[serde(default = "default_bus_port")]
    pub port: u16,
    #[serde(default = "default_bus_user")]
    pub user: String,
    #[serde(default = "default_bus_user")]
    pub password: String,
}

fn default_bus_host() -> String {
    "localhost".to_string()
}

fn default_bus_port() -> u16 {
    5672
}

fn default_bus_user() -> String {
    "guest".to_string()
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            host: default_bus_host(),
            port: default_bus_port(),
            user: default_bus_user(),
            password: default_bus_user(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Optional log file; stdout only when unset
    #[serde(default)]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> std::result::Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("BROKERD_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (BROKERD_VENUE__KIND, etc.)
            .add_source(
                Environment::with_prefix("BROKERD")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Fail fast on anything the process cannot start without.
    pub fn validate(&self) -> Result<()> {
        VenueKind::from_str(&self.venue.kind)?;
        if self.venue.account.trim().is_empty() {
            return Err(BrokerError::InvalidConfig(
                "venue.account must not be empty".into(),
            ));
        }
        if self.execution.venue_timeout_ms == 0 {
            return Err(BrokerError::InvalidConfig(
                "execution.venue_timeout_ms must be positive".into(),
            ));
        }
        if self.polling.balance_interval_secs == 0
            || self.polling.positions_interval_secs == 0
            || self.polling.order_status_interval_secs == 0
        {
            return Err(BrokerError::InvalidConfig(
                "polling intervals must be positive".into(),
            ));
        }
        Ok(())
    }
}
