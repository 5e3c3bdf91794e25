//! Application configuration.
//!
//! Settings come from a TOML file. Every section is optional and falls back
//! to its defaults, so a missing file yields a runnable configuration.
//!
//! ```toml
//! [server]
//! address = "127.0.0.1"
//! port = 5000
//!
//! [database]
//! path = "data/finance.sqlite"
//!
//! [analytics]
//! alert_threshold = 0.9
//! ```

use std::fs;
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::ConfigError;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "FINANCE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "finance.toml";

/// Largest trailing window accepted for monthly trends.
pub const MAX_TREND_MONTHS: u32 = 120;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub analytics: AnalyticsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: IpAddr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 5000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file, or `:memory:`.
    pub path: String,
    pub pool_size: u32,
    /// Insert the default category set at startup.
    pub seed_default_categories: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/finance.sqlite".into(),
            pool_size: 8,
            seed_default_categories: true,
        }
    }
}

impl DatabaseConfig {
    pub fn in_memory() -> Self {
        Self {
            path: ":memory:".into(),
            ..Self::default()
        }
    }
}

/// Settings read by the analytics service on every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Utilization at or above which a budget raises an alert.
    pub alert_threshold: Decimal,
    /// Default length of the monthly trend.
    pub trend_months: u32,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            alert_threshold: dec!(0.9),
            trend_months: 6,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

impl LoggingConfig {
    /// Install the global tracing subscriber. `RUST_LOG` overrides `level`.
    pub fn init(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

        match self.format.as_str() {
            "json" => {
                fmt().json().with_env_filter(filter).init();
            }
            _ => {
                fmt().with_env_filter(filter).init();
            }
        }
    }
}

impl Config {
    /// Load and validate the file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref()).map_err(ConfigError::ReadFile)?;
        Self::parse_toml(&contents)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        match fs::read_to_string(path.as_ref()) {
            Ok(contents) => Self::parse_toml(&contents),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::ReadFile(err)),
        }
    }

    /// Load from the path in [`CONFIG_ENV`], or [`DEFAULT_CONFIG_PATH`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        Self::load_or_default(path)
    }

    pub fn parse_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "port",
                reason: "must be greater than 0".into(),
            });
        }
        if self.database.path.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "path",
                reason: "must not be empty".into(),
            });
        }
        if self.database.pool_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pool_size",
                reason: "must be at least 1".into(),
            });
        }
        let threshold = self.analytics.alert_threshold;
        if threshold <= Decimal::ZERO || threshold > Decimal::ONE {
            return Err(ConfigError::InvalidValue {
                field: "alert_threshold",
                reason: format!("must be in (0, 1], got {threshold}"),
            });
        }
        if self.analytics.trend_months == 0 || self.analytics.trend_months > MAX_TREND_MONTHS {
            return Err(ConfigError::InvalidValue {
                field: "trend_months",
                reason: format!("must be between 1 and {MAX_TREND_MONTHS}"),
            });
        }
        Ok(())
    }
}
