//! Wallet data models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// User ID type
pub type UserId = i64;

/// Ledger entry ID type
pub type EntryId = i64;

/// Wallet model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: UserId,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// A freshly provisioned zero-balance wallet
    pub fn empty(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            balance: Decimal::new(0, 2),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Ledger entry model (append-only audit trail)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub amount: Decimal,
    pub status: EntryStatus,
    pub transaction_type: EntryType,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Whether `user_id` is a party to this entry
    pub fn involves(&self, user_id: UserId) -> bool {
        self.sender_id == user_id || self.receiver_id == user_id
    }
}

/// Entry to be appended inside a unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub amount: Decimal,
    pub transaction_type: EntryType,
    pub description: Option<String>,
}

impl NewEntry {
    /// Self-referencing entry recording a deposit
    pub fn deposit(user_id: UserId, amount: Decimal) -> Self {
        Self {
            sender_id: user_id,
            receiver_id: user_id,
            amount,
            transaction_type: EntryType::Deposit,
            description: Some("Added funds to wallet".to_string()),
        }
    }

    /// Self-referencing entry recording a withdrawal
    pub fn withdrawal(user_id: UserId, amount: Decimal) -> Self {
        Self {
            sender_id: user_id,
            receiver_id: user_id,
            amount,
            transaction_type: EntryType::Withdrawal,
            description: Some("Withdrew funds from wallet".to_string()),
        }
    }

    pub fn transfer(
        sender_id: UserId,
        receiver_id: UserId,
        amount: Decimal,
        description: Option<String>,
    ) -> Self {
        Self {
            sender_id,
            receiver_id,
            amount,
            transaction_type: EntryType::Transfer,
            description,
        }
    }
}

/// Entry status
///
/// Only `Completed` is ever persisted: an entry is written after the balance
/// mutation succeeds, inside the same unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Completed,
    Failed,
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryStatus::Pending => write!(f, "pending"),
            EntryStatus::Completed => write!(f, "completed"),
            EntryStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for EntryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EntryStatus::Pending),
            "completed" => Ok(EntryStatus::Completed),
            "failed" => Ok(EntryStatus::Failed),
            other => Err(format!("unknown entry status '{other}'")),
        }
    }
}

/// Entry type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Deposit,
    Withdrawal,
    Transfer,
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryType::Deposit => write!(f, "deposit"),
            EntryType::Withdrawal => write!(f, "withdrawal"),
            EntryType::Transfer => write!(f, "transfer"),
        }
    }
}

impl FromStr for EntryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(EntryType::Deposit),
            "withdrawal" => Ok(EntryType::Withdrawal),
            "transfer" => Ok(EntryType::Transfer),
            other => Err(format!("unknown transaction type '{other}'")),
        }
    }
}
