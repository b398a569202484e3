//! # Wallet Ledger
//!
//! A wallet ledger engine: per-user balances plus an append-only audit trail
//! of every money movement, safe under concurrent access.
//!
//! Callers arrive already authenticated and pass the acting user's ID
//! explicitly to every operation. Each mutation runs as a single unit of work
//! against a [`db::LedgerStore`]: it either commits in full or leaves no
//! trace.
//!
//! ## Core Modules
//!
//! - [`wallet`]: Models, money validation, balance guard, provisioning and the
//!   [`WalletManager`] coordinator
//! - [`db`]: Store traits, the PostgreSQL store, an in-memory store, schema
//!   and connection pooling
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use wallet_ledger::{LedgerConfig, MemoryLedgerStore, WalletManager};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), wallet_ledger::LedgerError> {
//! let wallets = WalletManager::new(Arc::new(MemoryLedgerStore::new()), LedgerConfig::default());
//!
//! let balance = wallets.deposit(1, "100.00".parse().unwrap()).await?;
//! assert_eq!(balance.to_string(), "100.00");
//! # Ok(())
//! # }
//! ```

/// Persistence: store traits, PostgreSQL and in-memory stores.
pub mod db;

/// Ledger engine: models, guard, provisioner and coordinator.
pub mod wallet;

pub use db::{Database, DatabaseConfig, LedgerStore, MemoryLedgerStore, PgLedgerStore};
pub use wallet::{
    EntryStatus, EntryType, ErrorKind, LedgerConfig, LedgerEntry, LedgerError, LedgerResult,
    Wallet, WalletManager,
};
