//! Command line configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use wallet_ledger::{DatabaseConfig, LedgerConfig};

/// Complete configuration loaded from environment variables and CLI overrides
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Database configuration
    pub database: DatabaseConfig,
    /// Lock and unit-of-work time bounds
    pub ledger: LedgerConfig,
    /// Capacity of the post-commit event channel
    pub event_buffer: usize,
}

impl CliConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `database_url_override` - Optional database URL override (from CLI args)
    ///
    /// # Returns
    ///
    /// * `Result<CliConfig, ConfigError>` - Loaded and validated configuration or error
    ///
    /// # Errors
    ///
    /// Returns error if a value is out of range
    pub fn from_env(database_url_override: Option<String>) -> Result<Self, ConfigError> {
        let mut database = DatabaseConfig::from_env();
        if let Some(url) = database_url_override {
            database.database_url = url;
        }

        let config = CliConfig {
            database,
            ledger: LedgerConfig::from_env(),
            event_buffer: parse_env_or("LEDGER_EVENT_BUFFER", 64),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    ///
    /// # Returns
    ///
    /// * `Result<(), ConfigError>` - Success or validation error
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = &self.database.database_url;
        if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
            return Err(ConfigError::Invalid {
                var: "DATABASE_URL".to_string(),
                reason: "Must be a postgres:// or postgresql:// URL".to_string(),
            });
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid {
                var: "DB_MAX_CONNECTIONS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid {
                var: "DB_MIN_CONNECTIONS".to_string(),
                reason: format!(
                    "Cannot exceed max connections ({})",
                    self.database.max_connections
                ),
            });
        }

        if self.ledger.lock_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                var: "LEDGER_LOCK_TIMEOUT_MS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.ledger.lock_timeout >= self.ledger.transaction_timeout {
            return Err(ConfigError::Invalid {
                var: "LEDGER_TRANSACTION_TIMEOUT_SECS".to_string(),
                reason: format!(
                    "Must be longer than the lock timeout ({:?})",
                    self.ledger.lock_timeout
                ),
            });
        }

        if self.ledger.query_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                var: "LEDGER_QUERY_TIMEOUT_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.event_buffer == 0 {
            return Err(ConfigError::Invalid {
                var: "LEDGER_EVENT_BUFFER".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
