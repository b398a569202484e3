//! In-memory implementation of the ledger store.
//!
//! Mirrors the PostgreSQL store's semantics on tokio primitives:
//!
//! - every wallet row has its own lock; `lock_wallet`, `credit` and `debit`
//!   take it (as `SELECT ... FOR UPDATE` and `UPDATE` do) and the unit of work
//!   holds it until commit or drop
//! - lock waits are bounded by the unit's lock timeout
//! - mutations are staged inside the unit and applied under the state lock at
//!   commit, so readers never observe a partial unit
//! - provisioning is insert-if-absent at commit, so two units can never create
//!   two wallets for one user
//!
//! One-shot faults can be armed with [`MemoryLedgerStore::inject_fault`] to
//! exercise abort paths.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
    time::Duration,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::repository::{LedgerStore, Provisioned, UnitOfWork};
use crate::wallet::{
    EntryId, EntryStatus, LedgerEntry, LedgerError, LedgerResult, NewEntry, UserId, Wallet,
    money::{self, MAX_BALANCE},
};

/// Store operation that can be made to fail once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    /// Non-transactional reads and provisioning
    Read,
    Begin,
    LockWallet,
    EnsureWallet,
    Credit,
    Debit,
    AppendEntry,
    Commit,
}

/// Point-in-time copy of all committed state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemorySnapshot {
    pub wallets: BTreeMap<UserId, Wallet>,
    pub entries: Vec<LedgerEntry>,
}

impl MemorySnapshot {
    /// Sum of all wallet balances
    pub fn total_balance(&self) -> Decimal {
        self.wallets.values().map(|w| w.balance).sum()
    }

    pub fn balance_of(&self, user_id: UserId) -> Option<Decimal> {
        self.wallets.get(&user_id).map(|w| w.balance)
    }
}

#[derive(Default)]
struct State {
    wallets: HashMap<UserId, Wallet>,
    entries: Vec<LedgerEntry>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    row_locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
    faults: Mutex<HashSet<FaultPoint>>,
    last_entry_id: AtomicI64,
}

impl Shared {
    async fn row_lock(&self, user_id: UserId) -> Arc<Mutex<()>> {
        self.row_locks
            .lock()
            .await
            .entry(user_id)
            .or_default()
            .clone()
    }

    /// Fail if a fault is armed at `point`, disarming it
    async fn trip(&self, point: FaultPoint) -> LedgerResult<()> {
        if self.faults.lock().await.remove(&point) {
            return Err(LedgerError::StoreUnavailable(format!(
                "injected fault at {point:?}"
            )));
        }
        Ok(())
    }
}

/// Ledger store kept entirely in process memory
#[derive(Clone, Default)]
pub struct MemoryLedgerStore {
    shared: Arc<Shared>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next operation reaching `point` fail with `StoreUnavailable`
    pub async fn inject_fault(&self, point: FaultPoint) {
        self.shared.faults.lock().await.insert(point);
    }

    /// Disarm every pending fault
    pub async fn clear_faults(&self) {
        self.shared.faults.lock().await.clear();
    }

    /// Copy of all committed wallets and entries
    pub async fn snapshot(&self) -> MemorySnapshot {
        let state = self.shared.state.lock().await;
        MemorySnapshot {
            wallets: state
                .wallets
                .iter()
                .map(|(id, wallet)| (*id, wallet.clone()))
                .collect(),
            entries: state.entries.clone(),
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn begin(&self, lock_timeout: Duration) -> LedgerResult<Box<dyn UnitOfWork>> {
        self.shared.trip(FaultPoint::Begin).await?;

        Ok(Box::new(MemoryUnitOfWork {
            shared: Arc::clone(&self.shared),
            lock_timeout,
            held: HashMap::new(),
            provisioned: HashMap::new(),
            deltas: HashMap::new(),
            entries: Vec::new(),
        }))
    }

    async fn find_wallet(&self, user_id: UserId) -> LedgerResult<Option<Wallet>> {
        self.shared.trip(FaultPoint::Read).await?;
        Ok(self.shared.state.lock().await.wallets.get(&user_id).cloned())
    }

    async fn ensure_wallet(&self, user_id: UserId) -> LedgerResult<Provisioned> {
        self.shared.trip(FaultPoint::Read).await?;

        let mut state = self.shared.state.lock().await;
        if let Some(wallet) = state.wallets.get(&user_id) {
            return Ok(Provisioned {
                wallet: wallet.clone(),
                created: false,
            });
        }

        let wallet = Wallet::empty(user_id);
        state.wallets.insert(user_id, wallet.clone());
        Ok(Provisioned {
            wallet,
            created: true,
        })
    }

    async fn list_entries(
        &self,
        user_id: UserId,
        limit: Option<i64>,
    ) -> LedgerResult<Vec<LedgerEntry>> {
        self.shared.trip(FaultPoint::Read).await?;

        let state = self.shared.state.lock().await;
        let mut entries: Vec<LedgerEntry> = state
            .entries
            .iter()
            .filter(|e| e.involves(user_id))
            .cloned()
            .collect();
        drop(state);

        entries.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        if let Some(limit) = limit {
            entries.truncate(usize::try_from(limit).unwrap_or(0));
        }
        Ok(entries)
    }

    async fn find_entry(
        &self,
        user_id: UserId,
        entry_id: EntryId,
    ) -> LedgerResult<Option<LedgerEntry>> {
        self.shared.trip(FaultPoint::Read).await?;

        let state = self.shared.state.lock().await;
        Ok(state
            .entries
            .iter()
            .find(|e| e.id == entry_id && e.involves(user_id))
            .cloned())
    }

    async fn health_check(&self) -> LedgerResult<()> {
        self.shared.trip(FaultPoint::Read).await
    }
}

/// Unit of work staging its mutations until commit
pub struct MemoryUnitOfWork {
    shared: Arc<Shared>,
    lock_timeout: Duration,
    held: HashMap<UserId, OwnedMutexGuard<()>>,
    provisioned: HashMap<UserId, Wallet>,
    deltas: HashMap<UserId, Decimal>,
    entries: Vec<LedgerEntry>,
}

impl MemoryUnitOfWork {
    /// Take the row lock for `user_id` unless this unit already holds it
    async fn acquire(&mut self, user_id: UserId) -> LedgerResult<()> {
        if self.held.contains_key(&user_id) {
            return Ok(());
        }

        let lock = self.shared.row_lock(user_id).await;
        let guard = tokio::time::timeout(self.lock_timeout, lock.lock_owned())
            .await
            .map_err(|_| LedgerError::Timeout(self.lock_timeout))?;
        self.held.insert(user_id, guard);
        Ok(())
    }

    /// Committed wallet (or one provisioned by this unit) with staged deltas applied
    async fn view(&self, user_id: UserId) -> Option<Wallet> {
        let state = self.shared.state.lock().await;
        let mut wallet = state
            .wallets
            .get(&user_id)
            .or_else(|| self.provisioned.get(&user_id))
            .cloned()?;
        drop(state);

        if let Some(delta) = self.deltas.get(&user_id) {
            wallet.balance += *delta;
        }
        Some(wallet)
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn lock_wallet(&mut self, user_id: UserId) -> LedgerResult<Option<Wallet>> {
        self.shared.trip(FaultPoint::LockWallet).await?;
        self.acquire(user_id).await?;
        Ok(self.view(user_id).await)
    }

    async fn ensure_wallet(&mut self, user_id: UserId) -> LedgerResult<Provisioned> {
        self.shared.trip(FaultPoint::EnsureWallet).await?;

        if let Some(wallet) = self.view(user_id).await {
            return Ok(Provisioned {
                wallet,
                created: false,
            });
        }

        let wallet = Wallet::empty(user_id);
        self.provisioned.insert(user_id, wallet.clone());
        Ok(Provisioned {
            wallet,
            created: true,
        })
    }

    async fn credit(&mut self, user_id: UserId, amount: Decimal) -> LedgerResult<Decimal> {
        self.shared.trip(FaultPoint::Credit).await?;
        self.acquire(user_id).await?;

        let wallet = self
            .view(user_id)
            .await
            .ok_or(LedgerError::WalletNotFound(user_id))?;
        let new_balance = money::checked_credit(user_id, wallet.balance, amount)?;

        *self.deltas.entry(user_id).or_default() += amount;
        Ok(new_balance)
    }

    async fn debit(&mut self, user_id: UserId, amount: Decimal) -> LedgerResult<Decimal> {
        self.shared.trip(FaultPoint::Debit).await?;
        self.acquire(user_id).await?;

        let wallet = self
            .view(user_id)
            .await
            .ok_or(LedgerError::WalletNotFound(user_id))?;
        if wallet.balance < amount {
            return Err(LedgerError::InsufficientFunds {
                user_id,
                available: wallet.balance,
                required: amount,
            });
        }

        *self.deltas.entry(user_id).or_default() -= amount;
        Ok(wallet.balance - amount)
    }

    async fn append_entry(&mut self, entry: NewEntry) -> LedgerResult<LedgerEntry> {
        self.shared.trip(FaultPoint::AppendEntry).await?;

        // Like a sequence, ids consumed by aborted units are not reused
        let id = self.shared.last_entry_id.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();
        let entry = LedgerEntry {
            id,
            sender_id: entry.sender_id,
            receiver_id: entry.receiver_id,
            amount: entry.amount,
            status: EntryStatus::Completed,
            transaction_type: entry.transaction_type,
            description: entry.description,
            created_at: now,
            updated_at: now,
        };

        self.entries.push(entry.clone());
        Ok(entry)
    }

    async fn commit(self: Box<Self>) -> LedgerResult<()> {
        let mut unit = *self;
        unit.shared.trip(FaultPoint::Commit).await?;

        let shared = Arc::clone(&unit.shared);
        let mut state = shared.state.lock().await;

        // Check every staged balance before touching anything
        let mut balances = Vec::with_capacity(unit.deltas.len());
        for (&user_id, &delta) in &unit.deltas {
            let current = state
                .wallets
                .get(&user_id)
                .or_else(|| unit.provisioned.get(&user_id))
                .ok_or(LedgerError::WalletNotFound(user_id))?;
            let balance = current.balance + delta;
            if balance < Decimal::ZERO {
                return Err(LedgerError::StoreUnavailable(format!(
                    "balance check violated for user {user_id}"
                )));
            }
            if balance > MAX_BALANCE {
                return Err(LedgerError::BalanceOverflow(user_id));
            }
            balances.push((user_id, balance));
        }

        for (user_id, wallet) in unit.provisioned.drain() {
            state.wallets.entry(user_id).or_insert(wallet);
        }

        let now = Utc::now();
        for (user_id, balance) in balances {
            if let Some(wallet) = state.wallets.get_mut(&user_id) {
                wallet.balance = balance;
                wallet.updated_at = now;
            }
        }

        state.entries.append(&mut unit.entries);
        drop(state);

        // Row locks are released when `unit` drops here
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> LedgerResult<()> {
        Ok(())
    }
}
