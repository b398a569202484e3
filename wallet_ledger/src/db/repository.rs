//! Store trait definitions for testability and dependency injection.
//!
//! The ledger engine only talks to these traits. [`LedgerStore`] covers the
//! non-transactional reads plus the entry point into a [`UnitOfWork`], which
//! groups every mutation of one operation so that it commits or aborts as a
//! whole. Dropping a unit of work without committing rolls it back.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;

use crate::wallet::{EntryId, LedgerEntry, LedgerResult, NewEntry, UserId, Wallet};

/// Result of an insert-if-absent wallet lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provisioned {
    pub wallet: Wallet,
    /// `true` when this call created the wallet
    pub created: bool,
}

/// Trait for ledger persistence
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Start a unit of work. Row lock waits inside it are bounded by `lock_timeout`.
    async fn begin(&self, lock_timeout: Duration) -> LedgerResult<Box<dyn UnitOfWork>>;

    /// Get wallet for user, without provisioning
    async fn find_wallet(&self, user_id: UserId) -> LedgerResult<Option<Wallet>>;

    /// Atomically insert a zero wallet if absent, else fetch the existing one
    async fn ensure_wallet(&self, user_id: UserId) -> LedgerResult<Provisioned>;

    /// Entries where the user is sender or receiver, newest first
    async fn list_entries(
        &self,
        user_id: UserId,
        limit: Option<i64>,
    ) -> LedgerResult<Vec<LedgerEntry>>;

    /// Entry by ID, only if the user is its sender or receiver
    async fn find_entry(
        &self,
        user_id: UserId,
        entry_id: EntryId,
    ) -> LedgerResult<Option<LedgerEntry>>;

    /// Check that the store is reachable
    async fn health_check(&self) -> LedgerResult<()>;
}

/// One atomic set of ledger mutations
#[async_trait]
pub trait UnitOfWork: Send {
    /// Fetch a wallet holding its exclusive row lock until commit/abort
    async fn lock_wallet(&mut self, user_id: UserId) -> LedgerResult<Option<Wallet>>;

    /// Insert-if-absent inside this unit; the new wallet only becomes visible on commit
    async fn ensure_wallet(&mut self, user_id: UserId) -> LedgerResult<Provisioned>;

    /// Increment a balance in place, returning the new balance
    async fn credit(&mut self, user_id: UserId, amount: Decimal) -> LedgerResult<Decimal>;

    /// Decrement a balance, refusing to go below zero, returning the new balance
    async fn debit(&mut self, user_id: UserId, amount: Decimal) -> LedgerResult<Decimal>;

    /// Append a `completed` ledger entry
    async fn append_entry(&mut self, entry: NewEntry) -> LedgerResult<LedgerEntry>;

    async fn commit(self: Box<Self>) -> LedgerResult<()>;

    async fn rollback(self: Box<Self>) -> LedgerResult<()>;
}
