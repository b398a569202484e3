//! Store operation timeout helpers
//!
//! Bound every read, and every unit of work up to its commit, so a stalled
//! store surfaces as a retryable error instead of an indefinite hang.
//! Dropping the timed-out future drops its unit of work, which rolls it back.
//! Commits are never raced against a timer.

use std::time::Duration;
use tokio::time::timeout;

use crate::wallet::{LedgerError, LedgerResult};

/// Default timeout for read queries (5 seconds)
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for a whole unit of work (10 seconds)
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on waiting for a wallet row lock (5 seconds)
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Execute a store operation with timeout
///
/// # Arguments
///
/// * `duration` - Timeout duration
/// * `future` - Async operation to execute
///
/// # Returns
///
/// * `LedgerResult<T>` - The operation's result, or `LedgerError::Timeout`
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> LedgerResult<T>
where
    F: std::future::Future<Output = LedgerResult<T>>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(LedgerError::Timeout(duration)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timeout_constants() {
        assert_eq!(DEFAULT_QUERY_TIMEOUT.as_secs(), 5);
        assert_eq!(DEFAULT_TRANSACTION_TIMEOUT.as_secs(), 10);
        assert_eq!(DEFAULT_LOCK_TIMEOUT.as_secs(), 5);
    }

    #[tokio::test]
    async fn test_slow_future_times_out() {
        let result: LedgerResult<()> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, LedgerError::Timeout(_)));
        assert!(err.is_retryable());
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_inner_error_passes_through() {
        let result: LedgerResult<()> = with_timeout(DEFAULT_QUERY_TIMEOUT, async {
            Err(LedgerError::WalletNotFound(3))
        })
        .await;

        assert!(matches!(result, Err(LedgerError::WalletNotFound(3))));
    }
}
