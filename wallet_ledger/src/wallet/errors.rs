//! Ledger error types.

use super::models::{EntryId, UserId};
use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Amount is zero, negative, malformed or outside `NUMERIC(15,2)`
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Credit would push a balance past the storable maximum
    #[error("Balance overflow for user {0}")]
    BalanceOverflow(UserId),

    /// Sender and receiver are the same user
    #[error("Cannot transfer to yourself (user {0})")]
    SelfTransfer(UserId),

    /// Insufficient balance
    #[error("Insufficient funds: available {available}, required {required}")]
    InsufficientFunds {
        user_id: UserId,
        available: Decimal,
        required: Decimal,
    },

    /// Wallet not found
    #[error("Wallet not found for user {0}")]
    WalletNotFound(UserId),

    /// Entry absent, or not visible to the requesting user
    #[error("Transaction {0} not found")]
    TransactionNotFound(EntryId),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Unit of work or lock wait exceeded its bound
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    /// Any other storage-layer fault
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

/// Coarse error taxonomy exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidAmount,
    SelfTransfer,
    InsufficientFunds,
    NotFound,
    StoreUnavailable,
}

impl LedgerError {
    /// Classify the error into the caller-facing taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidAmount(_) | LedgerError::BalanceOverflow(_) => {
                ErrorKind::InvalidAmount
            }
            LedgerError::SelfTransfer(_) => ErrorKind::SelfTransfer,
            LedgerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            LedgerError::WalletNotFound(_) | LedgerError::TransactionNotFound(_) => {
                ErrorKind::NotFound
            }
            LedgerError::Database(_)
            | LedgerError::Timeout(_)
            | LedgerError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
        }
    }

    /// Whether retrying the same call unmodified can succeed.
    ///
    /// Only infrastructure faults qualify; every other condition is permanent
    /// for the given input.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::StoreUnavailable
    }

    /// Get a client-safe error message that doesn't leak sensitive information
    ///
    /// Storage errors are sanitized to prevent information disclosure about
    /// the internal system structure, and user IDs/entry IDs are redacted.
    pub fn client_message(&self) -> String {
        match self {
            LedgerError::Database(_) | LedgerError::StoreUnavailable(_) => {
                "Service temporarily unavailable".to_string()
            }
            LedgerError::Timeout(_) => "Request timed out, please retry".to_string(),
            LedgerError::SelfTransfer(_) => "Cannot transfer to yourself".to_string(),
            LedgerError::BalanceOverflow(_) => "Amount exceeds wallet capacity".to_string(),
            LedgerError::InsufficientFunds { .. } => "Insufficient funds".to_string(),
            LedgerError::WalletNotFound(_) => "Wallet not found".to_string(),
            LedgerError::TransactionNotFound(_) => "Transaction not found".to_string(),
            LedgerError::InvalidAmount(_) => self.to_string(),
        }
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
