//! Ledger engine configuration.

use std::time::Duration;

use crate::db::{
    config::parse_env_or,
    timeouts::{DEFAULT_LOCK_TIMEOUT, DEFAULT_QUERY_TIMEOUT, DEFAULT_TRANSACTION_TIMEOUT},
};

/// Timing bounds applied by the wallet manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Longest wait for a wallet row lock
    pub lock_timeout: Duration,

    /// Longest a unit of work may spend before commit; longer units are aborted
    pub transaction_timeout: Duration,

    /// Longest a read operation may run
    pub query_timeout: Duration,
}

impl LedgerConfig {
    /// Create configuration from environment variables
    ///
    /// - `LEDGER_LOCK_TIMEOUT_MS` (default: 5000)
    /// - `LEDGER_TRANSACTION_TIMEOUT_SECS` (default: 10)
    /// - `LEDGER_QUERY_TIMEOUT_SECS` (default: 5)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            lock_timeout: Duration::from_millis(parse_env_or(
                "LEDGER_LOCK_TIMEOUT_MS",
                duration_millis(defaults.lock_timeout),
            )),
            transaction_timeout: Duration::from_secs(parse_env_or(
                "LEDGER_TRANSACTION_TIMEOUT_SECS",
                defaults.transaction_timeout.as_secs(),
            )),
            query_timeout: Duration::from_secs(parse_env_or(
                "LEDGER_QUERY_TIMEOUT_SECS",
                defaults.query_timeout.as_secs(),
            )),
        }
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            transaction_timeout: DEFAULT_TRANSACTION_TIMEOUT,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_wait_fits_inside_unit_of_work() {
        let config = LedgerConfig::default();
        assert!(config.lock_timeout < config.transaction_timeout);
        assert_eq!(config.lock_timeout, Duration::from_millis(5000));
    }
}
