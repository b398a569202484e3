//! Wallet module: balances, the append-only ledger, and the coordinator that
//! moves money between them.
//!
//! This module implements:
//! - Exact fixed-point amounts (`NUMERIC(15,2)`) via `rust_decimal`
//! - Lazy wallet provisioning that is race-free under concurrency
//! - Balance guard checks performed under the sender's row lock
//! - Deposit, withdrawal and transfer as all-or-nothing units of work
//! - Post-commit events for side tasks such as notifications
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wallet_ledger::db::{Database, DatabaseConfig};
//! use wallet_ledger::wallet::{LedgerConfig, WalletManager, money::parse_amount};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::new(&DatabaseConfig::from_env()).await?;
//!     db.migrate().await?;
//!     let wallets = WalletManager::new(Arc::new(db.ledger_store()), LedgerConfig::from_env());
//!
//!     wallets.deposit(1, parse_amount("100.00")?).await?;
//!     let entry = wallets
//!         .transfer(1, 2, parse_amount("40.00")?, Some("lunch".to_string()))
//!         .await?;
//!     println!("Recorded transfer {}", entry.id);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod errors;
pub mod events;
pub mod guard;
pub mod manager;
pub mod models;
pub mod money;
pub mod provisioner;

pub use config::LedgerConfig;
pub use errors::{ErrorKind, LedgerError, LedgerResult};
pub use events::{ChannelEventSink, EventSink, LedgerEvent, NoopEventSink};
pub use manager::{TransferStage, WalletManager};
pub use models::{EntryId, EntryStatus, EntryType, LedgerEntry, NewEntry, UserId, Wallet};
pub use provisioner::WalletProvisioner;
