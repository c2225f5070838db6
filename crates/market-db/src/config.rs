//! Runtime configuration.
//!
//! Configuration is loaded from `MARKET_*` environment variables with fallback
//! to development defaults.
//!
//! | Variable                        | Default          |
//! |---------------------------------|------------------|
//! | `MARKET_DATABASE_PATH`          | `./market.db`    |
//! | `MARKET_DB_MAX_CONNECTIONS`     | `5`              |
//! | `MARKET_DB_BUSY_TIMEOUT_SECS`   | `5`              |
//! | `MARKET_PLATFORM_FEE_BPS`       | `500` (5%)       |
//! | `MARKET_ACADEMIC_PERIOD_END`    | unset            |
//! | `MARKET_OUTBOX_BATCH_SIZE`      | `100`            |

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use market_core::validation::validate_fee_bps;

use crate::pool::DbConfig;

/// Marketplace runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// SQLite database file
    pub database_path: PathBuf,

    /// Pool size
    pub max_connections: u32,

    /// How long a writer waits for the SQLite write lock
    pub busy_timeout_secs: u64,

    /// Platform fee deducted from third-party sales, in basis points
    pub platform_fee_bps: u32,

    /// End of the active academic period (`YYYY-MM-DD`), used for
    /// spread-across-period billing when no calendar service is wired in
    pub academic_period_end: Option<NaiveDate>,

    /// Outbox entries drained per dispatch run
    pub outbox_batch_size: u32,
}

impl MarketConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value_or = |key: &str, default: &str| -> String {
            lookup(key).unwrap_or_else(|| default.to_string())
        };

        let config = MarketConfig {
            database_path: PathBuf::from(value_or("MARKET_DATABASE_PATH", "./market.db")),

            max_connections: value_or("MARKET_DB_MAX_CONNECTIONS", "5")
                .parse()
                .map_err(|_| ConfigError::InvalidValue("MARKET_DB_MAX_CONNECTIONS".to_string()))?,

            busy_timeout_secs: value_or("MARKET_DB_BUSY_TIMEOUT_SECS", "5")
                .parse()
                .map_err(|_| ConfigError::InvalidValue("MARKET_DB_BUSY_TIMEOUT_SECS".to_string()))?,

            platform_fee_bps: value_or("MARKET_PLATFORM_FEE_BPS", "500")
                .parse()
                .map_err(|_| ConfigError::InvalidValue("MARKET_PLATFORM_FEE_BPS".to_string()))?,

            academic_period_end: lookup("MARKET_ACADEMIC_PERIOD_END")
                .map(|raw| NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d"))
                .transpose()
                .map_err(|_| ConfigError::InvalidValue("MARKET_ACADEMIC_PERIOD_END".to_string()))?,

            outbox_batch_size: value_or("MARKET_OUTBOX_BATCH_SIZE", "100")
                .parse()
                .map_err(|_| ConfigError::InvalidValue("MARKET_OUTBOX_BATCH_SIZE".to_string()))?,
        };

        if config.max_connections == 0 {
            return Err(ConfigError::InvalidValue("MARKET_DB_MAX_CONNECTIONS".to_string()));
        }

        validate_fee_bps(config.platform_fee_bps)
            .map_err(|_| ConfigError::InvalidValue("MARKET_PLATFORM_FEE_BPS".to_string()))?;

        Ok(config)
    }

    /// Pool configuration derived from these settings.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.database_path.clone())
            .max_connections(self.max_connections)
            .busy_timeout(Duration::from_secs(self.busy_timeout_secs))
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = MarketConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.platform_fee_bps, 500);
        assert_eq!(config.max_connections, 5);
        assert!(config.academic_period_end.is_none());
        assert_eq!(config.db_config().busy_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_overrides() {
        let config = MarketConfig::from_lookup(lookup(&[
            ("MARKET_PLATFORM_FEE_BPS", "250"),
            ("MARKET_ACADEMIC_PERIOD_END", "2026-12-15"),
            ("MARKET_DATABASE_PATH", "/var/lib/market/market.db"),
        ]))
        .unwrap();

        assert_eq!(config.platform_fee_bps, 250);
        assert_eq!(config.academic_period_end, NaiveDate::from_ymd_opt(2026, 12, 15));
        assert_eq!(config.database_path, PathBuf::from("/var/lib/market/market.db"));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            MarketConfig::from_lookup(lookup(&[("MARKET_PLATFORM_FEE_BPS", "abc")])),
            Err(ConfigError::InvalidValue(_))
        ));
        assert!(MarketConfig::from_lookup(lookup(&[("MARKET_PLATFORM_FEE_BPS", "10001")])).is_err());
        assert!(MarketConfig::from_lookup(lookup(&[("MARKET_ACADEMIC_PERIOD_END", "15/12/2026")])).is_err());
        assert!(MarketConfig::from_lookup(lookup(&[("MARKET_DB_MAX_CONNECTIONS", "0")])).is_err());
    }
}
