//! Configuration loader for the `conservation-monitor` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). By consolidating configuration logic here, we
//! avoid scattering `env::var` calls throughout the codebase.
//!
use std::env;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::engine::EngineSettings;

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// PostgreSQL connection string.
    pub db_url: String,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// HTTP listen port.
    pub listen_port: u16,

    /// Webhook receiving notifications; `None` logs them instead.
    pub notify_webhook_url: Option<String>,

    /// Minimum minutes between notifications for one artifact.
    pub notify_threshold_minutes: u32,

    /// Seconds between periodic dispatch cycles.
    pub dispatch_interval_secs: u32,

    /// Measurements evaluated concurrently at most.
    pub max_in_flight_evaluations: u32,

    /// Timeout for a single store call, in seconds.
    pub store_timeout_secs: u32,

    /// Timeout for a single notification send, in seconds.
    pub send_timeout_secs: u32,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `DATABASE_URL` – PostgreSQL connection string
///
/// Optional:
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `LISTEN_PORT` – HTTP port (default: 8080)
/// - `NOTIFY_WEBHOOK_URL` – notification webhook (default: log only)
/// - `NOTIFY_THRESHOLD_MINUTES` – per-artifact rate limit (default: 30)
/// - `DISPATCH_INTERVAL_SECS` – dispatch period (default: 60)
/// - `MAX_IN_FLIGHT_EVALUATIONS` – evaluation concurrency (default: 32)
/// - `STORE_TIMEOUT_SECS` – store call timeout, at least 1 (default: 5)
/// - `SEND_TIMEOUT_SECS` – send timeout, at least 1 (default: 10)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let db_url = require_env!("DATABASE_URL");
    let db_pool_max = parse_env_u32!("DB_POOL_MAX", 5);
    let listen_port = u16::try_from(parse_env_u32!("LISTEN_PORT", 8080))
        .map_err(|e| anyhow!("Invalid LISTEN_PORT: {}", e))?;
    let notify_webhook_url = env::var("NOTIFY_WEBHOOK_URL")
        .ok()
        .filter(|url| !url.trim().is_empty());
    let notify_threshold_minutes = parse_env_u32!("NOTIFY_THRESHOLD_MINUTES", 30);
    let dispatch_interval_secs = parse_env_u32!("DISPATCH_INTERVAL_SECS", 60).max(1);
    let max_in_flight_evaluations = parse_env_u32!("MAX_IN_FLIGHT_EVALUATIONS", 32).max(1);
    // Zero would time out every call.
    let store_timeout_secs = parse_env_u32!("STORE_TIMEOUT_SECS", 5).max(1);
    let send_timeout_secs = parse_env_u32!("SEND_TIMEOUT_SECS", 10).max(1);

    Ok(Config {
        db_url,
        db_pool_max,
        listen_port,
        notify_webhook_url,
        notify_threshold_minutes,
        dispatch_interval_secs,
        max_in_flight_evaluations,
        store_timeout_secs,
        send_timeout_secs,
    })
}

impl Config {
    // ---
    pub fn engine_settings(&self) -> EngineSettings {
        // ---
        EngineSettings {
            store_timeout: self.store_timeout(),
            max_in_flight: self.max_in_flight_evaluations as usize,
        }
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.store_timeout_secs))
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.send_timeout_secs))
    }

    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.dispatch_interval_secs))
    }

    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks sensitive information like database passwords while showing
    /// all configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL              : {}", mask_db_url(&self.db_url));
        tracing::info!("  DB_POOL_MAX               : {}", self.db_pool_max);
        tracing::info!("  LISTEN_PORT               : {}", self.listen_port);
        tracing::info!(
            "  NOTIFY_WEBHOOK_URL        : {}",
            self.notify_webhook_url.as_deref().unwrap_or("(unset, logging only)")
        );
        tracing::info!("  NOTIFY_THRESHOLD_MINUTES  : {}", self.notify_threshold_minutes);
        tracing::info!("  DISPATCH_INTERVAL_SECS    : {}", self.dispatch_interval_secs);
        tracing::info!("  MAX_IN_FLIGHT_EVALUATIONS : {}", self.max_in_flight_evaluations);
        tracing::info!("  STORE_TIMEOUT_SECS        : {}", self.store_timeout_secs);
        tracing::info!("  SEND_TIMEOUT_SECS         : {}", self.send_timeout_secs);
    }
}

/// Mask the password in a database URL for logging.
pub fn mask_db_url(db_url: &str) -> String {
    // ---
    if let Some(at_pos) = db_url.rfind('@') {
        if let Some(colon_pos) = db_url[..at_pos].rfind(':') {
            return format!("{}:****{}", &db_url[..colon_pos], &db_url[at_pos..]);
        }
    }
    db_url.to_string()
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_mask_db_url_hides_password() {
        // ---
        assert_eq!(
            mask_db_url("postgres://curator:s3cret@db:5432/museum"),
            "postgres://curator:****@db:5432/museum"
        );
        assert_eq!(mask_db_url("postgres://db/museum"), "postgres://db/museum");
    }

    #[test]
    fn test_zero_timeouts_are_raised_to_one_second() {
        // ---
        // Only test in the crate that touches the process environment.
        env::set_var("DATABASE_URL", "postgres://curator:s3cret@db:5432/museum");
        env::set_var("STORE_TIMEOUT_SECS", "0");
        env::set_var("SEND_TIMEOUT_SECS", "0");

        let cfg = load_from_env().unwrap();

        assert_eq!(cfg.store_timeout(), Duration::from_secs(1));
        assert_eq!(cfg.send_timeout(), Duration::from_secs(1));
        assert_eq!(cfg.engine_settings().store_timeout, Duration::from_secs(1));
    }
}
