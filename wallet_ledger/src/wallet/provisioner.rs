//! Lazy wallet provisioning.

use std::sync::Arc;

use super::{
    errors::LedgerResult,
    models::{UserId, Wallet},
};
use crate::db::{LedgerStore, Provisioned, UnitOfWork};

/// Materializes a zero-balance wallet the first time a user is referenced.
///
/// Always goes through the store's atomic insert-if-absent primitive, never
/// check-then-insert, so concurrent first references can't create two wallets.
#[derive(Clone)]
pub struct WalletProvisioner {
    store: Arc<dyn LedgerStore>,
}

impl WalletProvisioner {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Return the user's wallet, creating an empty one if absent (committed immediately)
    pub async fn ensure_wallet(&self, user_id: UserId) -> LedgerResult<Wallet> {
        let provisioned = self.store.ensure_wallet(user_id).await?;
        Ok(log_provisioned(provisioned))
    }

    /// Same as [`ensure_wallet`](Self::ensure_wallet), but inside `uow`: the
    /// wallet is created only if the unit commits
    pub async fn ensure_within(
        &self,
        uow: &mut dyn UnitOfWork,
        user_id: UserId,
    ) -> LedgerResult<Wallet> {
        let provisioned = uow.ensure_wallet(user_id).await?;
        Ok(log_provisioned(provisioned))
    }
}

fn log_provisioned(provisioned: Provisioned) -> Wallet {
    if provisioned.created {
        log::debug!("Provisioned wallet for user {}", provisioned.wallet.user_id);
    }
    provisioned.wallet
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryLedgerStore;
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_first_references_create_one_wallet() {
        let store = MemoryLedgerStore::new();
        let provisioner = WalletProvisioner::new(Arc::new(store.clone()));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let provisioner = provisioner.clone();
                tokio::spawn(async move { provisioner.ensure_wallet(77).await })
            })
            .collect();

        for handle in handles {
            let wallet = handle.await.unwrap().unwrap();
            assert_eq!(wallet.user_id, 77);
            assert!(wallet.balance.is_zero());
        }

        assert_eq!(store.snapshot().await.wallets.len(), 1);
    }

    #[tokio::test]
    async fn test_provisioning_inside_aborted_unit_leaves_no_wallet() {
        let store = MemoryLedgerStore::new();
        let provisioner = WalletProvisioner::new(Arc::new(store.clone()));

        let mut uow = store.begin(Duration::from_secs(1)).await.unwrap();
        let wallet = provisioner.ensure_within(uow.as_mut(), 5).await.unwrap();
        assert_eq!(wallet.user_id, 5);
        uow.rollback().await.unwrap();

        assert!(store.find_wallet(5).await.unwrap().is_none());
    }
}
