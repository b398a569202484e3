//! Wallet manager: the coordinator running every ledger mutation as one
//! atomic unit of work.

use rust_decimal::Decimal;
use std::{fmt, sync::Arc};

use super::{
    config::LedgerConfig,
    errors::{LedgerError, LedgerResult},
    events::{EventSink, LedgerEvent, NoopEventSink},
    guard,
    models::{EntryId, LedgerEntry, NewEntry, UserId, Wallet},
    money::validate_amount,
    provisioner::WalletProvisioner,
};
use crate::db::{LedgerStore, UnitOfWork, timeouts::with_timeout};

/// Progress of a transfer's unit of work.
///
/// Callers only ever observe `Committed` or an error; the intermediate stages
/// exist for diagnostics on abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    Started,
    SenderLocked,
    Validated,
    ReceiverProvisioned,
    BalancesUpdated,
    EntryRecorded,
    Committed,
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransferStage::Started => "started",
            TransferStage::SenderLocked => "sender_locked",
            TransferStage::Validated => "validated",
            TransferStage::ReceiverProvisioned => "receiver_provisioned",
            TransferStage::BalancesUpdated => "balances_updated",
            TransferStage::EntryRecorded => "entry_recorded",
            TransferStage::Committed => "committed",
        };
        f.write_str(name)
    }
}

/// Wallet manager
#[derive(Clone)]
pub struct WalletManager {
    store: Arc<dyn LedgerStore>,
    provisioner: WalletProvisioner,
    events: Arc<dyn EventSink>,
    config: LedgerConfig,
}

impl WalletManager {
    /// Create a new wallet manager
    ///
    /// # Arguments
    ///
    /// * `store` - Ledger store every operation runs against
    /// * `config` - Lock and unit-of-work time bounds
    pub fn new(store: Arc<dyn LedgerStore>, config: LedgerConfig) -> Self {
        Self {
            provisioner: WalletProvisioner::new(Arc::clone(&store)),
            store,
            events: Arc::new(NoopEventSink),
            config,
        }
    }

    /// Publish post-commit events to `sink`
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Get wallet for a user, provisioning an empty one on first access
    ///
    /// This is the one read with a side effect: a user with no wallet gets a
    /// zero-balance wallet committed. Use
    /// [`get_wallet_if_exists`](Self::get_wallet_if_exists) to look without
    /// provisioning.
    pub async fn get_wallet(&self, user_id: UserId) -> LedgerResult<Wallet> {
        with_timeout(
            self.config.query_timeout,
            self.provisioner.ensure_wallet(user_id),
        )
        .await
    }

    /// Get wallet for a user without provisioning
    pub async fn get_wallet_if_exists(&self, user_id: UserId) -> LedgerResult<Option<Wallet>> {
        with_timeout(self.config.query_timeout, self.store.find_wallet(user_id)).await
    }

    /// Add funds to a user's wallet
    ///
    /// # Arguments
    ///
    /// * `user_id` - User ID
    /// * `amount` - Amount to add, positive with at most two decimal places
    ///
    /// # Returns
    ///
    /// * `LedgerResult<Decimal>` - New wallet balance or error
    ///
    /// # Errors
    ///
    /// * `LedgerError::InvalidAmount` - Amount not positive or malformed
    pub async fn deposit(&self, user_id: UserId, amount: Decimal) -> LedgerResult<Decimal> {
        let amount = validate_amount(amount)?;

        let staged = with_timeout(self.config.transaction_timeout, async {
            let mut uow = self.store.begin(self.config.lock_timeout).await?;
            let staged = self.stage_deposit(uow.as_mut(), user_id, amount).await;
            keep_or_rollback(uow, staged).await
        })
        .await;
        let result = commit_staged(staged).await;

        let (entry, new_balance) = log_outcome("deposit", user_id, result)?;
        log::info!(
            "Deposited {} to user {} (entry {}, balance {})",
            amount,
            user_id,
            entry.id,
            new_balance
        );
        self.events
            .publish(LedgerEvent::Deposited { entry, new_balance });

        Ok(new_balance)
    }

    /// Remove funds from a user's wallet
    ///
    /// # Returns
    ///
    /// * `LedgerResult<Decimal>` - New wallet balance or error
    ///
    /// # Errors
    ///
    /// * `LedgerError::InvalidAmount` - Amount not positive or malformed
    /// * `LedgerError::WalletNotFound` - User has no wallet
    /// * `LedgerError::InsufficientFunds` - Balance lower than amount
    pub async fn withdraw(&self, user_id: UserId, amount: Decimal) -> LedgerResult<Decimal> {
        let amount = validate_amount(amount)?;

        let staged = with_timeout(self.config.transaction_timeout, async {
            let mut uow = self.store.begin(self.config.lock_timeout).await?;
            let staged = self.stage_withdrawal(uow.as_mut(), user_id, amount).await;
            keep_or_rollback(uow, staged).await
        })
        .await;
        let result = commit_staged(staged).await;

        let (entry, new_balance) = log_outcome("withdrawal", user_id, result)?;
        log::info!(
            "Withdrew {} from user {} (entry {}, balance {})",
            amount,
            user_id,
            entry.id,
            new_balance
        );
        self.events
            .publish(LedgerEvent::Withdrawn { entry, new_balance });

        Ok(new_balance)
    }

    /// Move funds from one user's wallet to another's
    ///
    /// The receiver's wallet is provisioned if it doesn't exist yet. Either
    /// both balances change and one `completed` entry is recorded, or nothing
    /// changes at all.
    ///
    /// # Arguments
    ///
    /// * `sender_id` - Paying user
    /// * `receiver_id` - Receiving user
    /// * `amount` - Amount to move
    /// * `description` - Optional free-text note stored on the entry
    ///
    /// # Errors
    ///
    /// * `LedgerError::InvalidAmount` - Amount not positive or malformed
    /// * `LedgerError::SelfTransfer` - Sender and receiver are the same user
    /// * `LedgerError::WalletNotFound` - Sender has no wallet
    /// * `LedgerError::InsufficientFunds` - Sender balance lower than amount
    pub async fn transfer(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        amount: Decimal,
        description: Option<String>,
    ) -> LedgerResult<LedgerEntry> {
        let amount = validate_amount(amount)?;
        guard::check_distinct(sender_id, receiver_id)?;

        let mut stage = TransferStage::Started;
        let staged = with_timeout(self.config.transaction_timeout, async {
            let mut uow = self.store.begin(self.config.lock_timeout).await?;
            let staged = self
                .stage_transfer(
                    uow.as_mut(),
                    &mut stage,
                    sender_id,
                    receiver_id,
                    amount,
                    description,
                )
                .await;
            keep_or_rollback(uow, staged).await
        })
        .await;
        let result = commit_staged(staged).await;

        let entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                if e.is_retryable() {
                    log::warn!(
                        "Transfer {} -> {} aborted after stage '{}': {}",
                        sender_id,
                        receiver_id,
                        stage,
                        e
                    );
                } else {
                    log::debug!(
                        "Transfer {} -> {} rejected after stage '{}': {}",
                        sender_id,
                        receiver_id,
                        stage,
                        e
                    );
                }
                return Err(e);
            }
        };
        stage = TransferStage::Committed;
        log::debug!("Transfer {} -> {} {}", sender_id, receiver_id, stage);

        log::info!(
            "Transferred {} from user {} to user {} (entry {})",
            amount,
            sender_id,
            receiver_id,
            entry.id
        );
        self.events.publish(LedgerEvent::Transferred {
            entry: entry.clone(),
        });

        Ok(entry)
    }

    /// Credit a (possibly new) wallet and record the deposit entry
    async fn stage_deposit(
        &self,
        uow: &mut dyn UnitOfWork,
        user_id: UserId,
        amount: Decimal,
    ) -> LedgerResult<(LedgerEntry, Decimal)> {
        self.provisioner.ensure_within(uow, user_id).await?;
        let new_balance = uow.credit(user_id, amount).await?;
        let entry = uow.append_entry(NewEntry::deposit(user_id, amount)).await?;
        Ok((entry, new_balance))
    }

    async fn stage_withdrawal(
        &self,
        uow: &mut dyn UnitOfWork,
        user_id: UserId,
        amount: Decimal,
    ) -> LedgerResult<(LedgerEntry, Decimal)> {
        let wallet = uow
            .lock_wallet(user_id)
            .await?
            .ok_or(LedgerError::WalletNotFound(user_id))?;
        guard::check_funds(user_id, wallet.balance, amount)?;

        let new_balance = uow.debit(user_id, amount).await?;
        let entry = uow
            .append_entry(NewEntry::withdrawal(user_id, amount))
            .await?;
        Ok((entry, new_balance))
    }

    /// Every transfer step up to, but not including, commit
    async fn stage_transfer(
        &self,
        uow: &mut dyn UnitOfWork,
        stage: &mut TransferStage,
        sender_id: UserId,
        receiver_id: UserId,
        amount: Decimal,
        description: Option<String>,
    ) -> LedgerResult<LedgerEntry> {
        // Lock the sender before reading its balance
        let sender = uow
            .lock_wallet(sender_id)
            .await?
            .ok_or(LedgerError::WalletNotFound(sender_id))?;
        *stage = TransferStage::SenderLocked;

        guard::check_funds(sender_id, sender.balance, amount)?;
        *stage = TransferStage::Validated;

        self.provisioner.ensure_within(uow, receiver_id).await?;
        *stage = TransferStage::ReceiverProvisioned;

        uow.debit(sender_id, amount).await?;
        uow.credit(receiver_id, amount).await?;
        *stage = TransferStage::BalancesUpdated;

        let entry = uow
            .append_entry(NewEntry::transfer(
                sender_id,
                receiver_id,
                amount,
                description,
            ))
            .await?;
        *stage = TransferStage::EntryRecorded;

        Ok(entry)
    }

    /// All entries where the user is sender or receiver, newest first
    ///
    /// Returns an empty vector when the user has no entries.
    pub async fn list_transactions(&self, user_id: UserId) -> LedgerResult<Vec<LedgerEntry>> {
        with_timeout(
            self.config.query_timeout,
            self.store.list_entries(user_id, None),
        )
        .await
    }

    /// The user's `limit` most recent entries, newest first
    pub async fn recent_transactions(
        &self,
        user_id: UserId,
        limit: i64,
    ) -> LedgerResult<Vec<LedgerEntry>> {
        if limit <= 0 {
            return Ok(Vec::new());
        }
        with_timeout(
            self.config.query_timeout,
            self.store.list_entries(user_id, Some(limit)),
        )
        .await
    }

    /// Get a single entry, visible only to its sender or receiver
    ///
    /// # Errors
    ///
    /// * `LedgerError::TransactionNotFound` - No such entry, or the user is
    ///   not a party to it (the two cases are indistinguishable on purpose)
    pub async fn get_transaction(
        &self,
        user_id: UserId,
        entry_id: EntryId,
    ) -> LedgerResult<LedgerEntry> {
        with_timeout(
            self.config.query_timeout,
            self.store.find_entry(user_id, entry_id),
        )
        .await?
        .ok_or(LedgerError::TransactionNotFound(entry_id))
    }

    /// Check that the underlying store is reachable
    pub async fn health_check(&self) -> LedgerResult<()> {
        with_timeout(self.config.query_timeout, self.store.health_check()).await
    }
}

/// Hand a fully staged unit on for commit, or roll it back if staging failed
async fn keep_or_rollback<T>(
    uow: Box<dyn UnitOfWork>,
    staged: LedgerResult<T>,
) -> LedgerResult<(Box<dyn UnitOfWork>, T)> {
    match staged {
        Ok(value) => Ok((uow, value)),
        Err(e) => {
            if let Err(rollback_err) = uow.rollback().await {
                log::warn!("Rollback after '{}' failed: {}", e, rollback_err);
            }
            Err(e)
        }
    }
}

/// Commit a staged unit of work
///
/// Runs outside the transaction timeout: once a commit has been issued its
/// outcome is reported as-is, never as a retryable timeout.
async fn commit_staged<T>(staged: LedgerResult<(Box<dyn UnitOfWork>, T)>) -> LedgerResult<T> {
    let (uow, value) = staged?;
    uow.commit().await?;
    Ok(value)
}

/// Log an aborted single-wallet unit of work and pass the result through
fn log_outcome<T>(operation: &str, user_id: UserId, result: LedgerResult<T>) -> LedgerResult<T> {
    if let Err(e) = &result {
        if e.is_retryable() {
            log::warn!("{} for user {} aborted: {}", operation, user_id, e);
        } else {
            log::debug!("{} for user {} rejected: {}", operation, user_id, e);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{FaultPoint, MemoryLedgerStore};
    use crate::wallet::{ChannelEventSink, EntryStatus, EntryType, ErrorKind};
    use std::time::Duration;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn manager() -> (WalletManager, MemoryLedgerStore) {
        let store = MemoryLedgerStore::new();
        let config = LedgerConfig {
            lock_timeout: Duration::from_millis(500),
            transaction_timeout: Duration::from_secs(2),
            query_timeout: Duration::from_secs(1),
        };
        (WalletManager::new(Arc::new(store.clone()), config), store)
    }

    #[tokio::test]
    async fn test_deposit_provisions_and_records_entry() {
        let (manager, store) = manager();

        let balance = manager.deposit(1, dec("100")).await.unwrap();
        assert_eq!(balance, dec("100.00"));

        let entries = manager.list_transactions(1).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].transaction_type, EntryType::Deposit);
        assert_eq!(entries[0].sender_id, 1);
        assert_eq!(entries[0].receiver_id, 1);
        assert_eq!(
            entries[0].description.as_deref(),
            Some("Added funds to wallet")
        );
        assert_eq!(store.snapshot().await.balance_of(1), Some(dec("100.00")));
    }

    #[tokio::test]
    async fn test_withdraw_without_wallet_is_not_found() {
        let (manager, store) = manager();

        let err = manager.withdraw(9, dec("1.00")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(store.snapshot().await.wallets.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_amount_checked_first() {
        let (manager, _) = manager();

        for amount in ["0", "-1", "0.001"] {
            let err = manager.deposit(1, dec(amount)).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidAmount);
        }

        // Before the self-transfer check
        let err = manager.transfer(1, 1, dec("0"), None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAmount);
    }

    #[tokio::test]
    async fn test_transfer_to_self_without_wallet() {
        let (manager, _) = manager();

        let err = manager.transfer(3, 3, dec("10.00"), None).await.unwrap_err();
        assert!(matches!(err, LedgerError::SelfTransfer(3)));
    }

    #[tokio::test]
    async fn test_transfer_from_missing_wallet() {
        let (manager, store) = manager();

        let err = manager.transfer(1, 2, dec("1.00"), None).await.unwrap_err();
        assert!(matches!(err, LedgerError::WalletNotFound(1)));
        // Receiver must not have been provisioned
        assert!(store.snapshot().await.wallets.is_empty());
    }

    #[tokio::test]
    async fn test_transfer_records_completed_entry() {
        let (manager, _) = manager();
        manager.deposit(1, dec("50.00")).await.unwrap();

        let entry = manager
            .transfer(1, 2, dec("20.00"), Some("rent".to_string()))
            .await
            .unwrap();

        assert_eq!(entry.status, EntryStatus::Completed);
        assert_eq!(entry.transaction_type, EntryType::Transfer);
        assert_eq!(entry.description.as_deref(), Some("rent"));
        assert_eq!(manager.get_transaction(2, entry.id).await.unwrap(), entry);
    }

    #[tokio::test]
    async fn test_store_fault_is_retryable_and_rolls_back() {
        let (manager, store) = manager();
        manager.deposit(1, dec("50.00")).await.unwrap();
        let before = store.snapshot().await;

        store.inject_fault(FaultPoint::AppendEntry).await;
        let err = manager.transfer(1, 2, dec("20.00"), None).await.unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(store.snapshot().await, before);

        // Retry succeeds once the fault has cleared
        manager.transfer(1, 2, dec("20.00"), None).await.unwrap();
    }

    #[tokio::test]
    async fn test_events_published_after_commit_only() {
        let (manager, store) = manager();
        let (sink, mut events) = ChannelEventSink::channel(8);
        let manager = manager.with_event_sink(Arc::new(sink));

        manager.deposit(1, dec("10.00")).await.unwrap();
        store.inject_fault(FaultPoint::Commit).await;
        assert!(manager.withdraw(1, dec("5.00")).await.is_err());
        manager.withdraw(1, dec("4.00")).await.unwrap();

        let first = events.recv().await.unwrap();
        assert!(matches!(first, LedgerEvent::Deposited { .. }));
        let second = events.recv().await.unwrap();
        match second {
            LedgerEvent::Withdrawn { entry, new_balance } => {
                assert_eq!(entry.amount, dec("4.00"));
                assert_eq!(new_balance, dec("6.00"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_recent_transactions_limit() {
        let (manager, _) = manager();
        for _ in 0..3 {
            manager.deposit(1, dec("1.00")).await.unwrap();
        }

        assert_eq!(manager.recent_transactions(1, 2).await.unwrap().len(), 2);
        assert!(manager.recent_transactions(1, 0).await.unwrap().is_empty());
        assert!(manager.recent_transactions(1, -5).await.unwrap().is_empty());
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(TransferStage::Started.to_string(), "started");
        assert_eq!(
            TransferStage::ReceiverProvisioned.to_string(),
            "receiver_provisioned"
        );
    }
}
