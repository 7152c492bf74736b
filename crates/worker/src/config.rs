//! Worker configuration loaded from environment variables.

use std::time::Duration;

use saga::RecoveryConfig;

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Worker configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `json` for JSON log lines, anything else for human-readable output
/// - `DATABASE_URL`: PostgreSQL connection string; its ramps are served read-only, with
///   processing and recovery disabled. The in-memory store is used when unset
/// - `RECOVERY_INTERVAL_SECS`: time between recovery sweeps (default: `300`)
/// - `RECOVERY_STALE_AFTER_SECS`: idle time before a ramp is swept (default: `600`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub recovery_interval_secs: u64,
    pub recovery_stale_after_secs: i64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .map(|f| LogFormat::parse(&f))
                .unwrap_or_default(),
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            recovery_interval_secs: lookup("RECOVERY_INTERVAL_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.recovery_interval_secs),
            recovery_stale_after_secs: lookup("RECOVERY_STALE_AFTER_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.recovery_stale_after_secs),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn recovery_config(&self) -> RecoveryConfig {
        RecoveryConfig {
            interval: Duration::from_secs(self.recovery_interval_secs),
            stale_after: chrono::Duration::seconds(self.recovery_stale_after_secs),
            ..RecoveryConfig::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            recovery_interval_secs: 300,
            recovery_stale_after_secs: 600,
        }
    }
}
