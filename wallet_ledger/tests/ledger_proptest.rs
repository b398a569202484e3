//! Property-based tests for the wallet ledger.
//!
//! Random sequences of deposits, withdrawals and transfers are run against
//! the in-memory store and checked against a simple balance model.

use proptest::prelude::*;
use rust_decimal::Decimal;
use std::{collections::HashMap, sync::Arc};
use wallet_ledger::{ErrorKind, LedgerConfig, MemoryLedgerStore, WalletManager};

#[derive(Debug, Clone)]
enum Op {
    Deposit(i64, i64),
    Withdraw(i64, i64),
    Transfer(i64, i64, i64),
}

fn user() -> impl Strategy<Value = i64> {
    1i64..=4
}

fn cents() -> impl Strategy<Value = i64> {
    1i64..=20_000
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (user(), cents()).prop_map(|(u, c)| Op::Deposit(u, c)),
        (user(), cents()).prop_map(|(u, c)| Op::Withdraw(u, c)),
        (user(), user(), cents()).prop_map(|(from, to, c)| Op::Transfer(from, to, c)),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every operation succeeds or fails exactly as the model predicts, and
    /// committed balances always match it
    #[test]
    fn test_operations_match_balance_model(ops in prop::collection::vec(op(), 1..40)) {
        let rt = runtime();
        rt.block_on(async {
            let store = MemoryLedgerStore::new();
            let wallets = WalletManager::new(Arc::new(store.clone()), LedgerConfig::default());
            let mut model: HashMap<i64, Decimal> = HashMap::new();

            for op in &ops {
                match *op {
                    Op::Deposit(user, c) => {
                        let amount = Decimal::new(c, 2);
                        let balance = wallets.deposit(user, amount).await.unwrap();
                        let expected = model.entry(user).or_insert(Decimal::ZERO);
                        *expected += amount;
                        prop_assert_eq!(balance, *expected);
                    }
                    Op::Withdraw(user, c) => {
                        let amount = Decimal::new(c, 2);
                        let result = wallets.withdraw(user, amount).await;
                        match model.get_mut(&user) {
                            None => {
                                prop_assert_eq!(result.unwrap_err().kind(), ErrorKind::NotFound);
                            }
                            Some(balance) if *balance < amount => {
                                prop_assert_eq!(result.unwrap_err().kind(), ErrorKind::InsufficientFunds);
                            }
                            Some(balance) => {
                                *balance -= amount;
                                prop_assert_eq!(result.unwrap(), *balance);
                            }
                        }
                    }
                    Op::Transfer(from, to, c) => {
                        let amount = Decimal::new(c, 2);
                        let result = wallets.transfer(from, to, amount, None).await;
                        if from == to {
                            prop_assert_eq!(result.unwrap_err().kind(), ErrorKind::SelfTransfer);
                            continue;
                        }
                        match model.get(&from).copied() {
                            None => {
                                prop_assert_eq!(result.unwrap_err().kind(), ErrorKind::NotFound);
                            }
                            Some(balance) if balance < amount => {
                                prop_assert_eq!(result.unwrap_err().kind(), ErrorKind::InsufficientFunds);
                            }
                            Some(_) => {
                                let entry = result.unwrap();
                                prop_assert_eq!(entry.amount, amount);
                                *model.entry(from).or_insert(Decimal::ZERO) -= amount;
                                *model.entry(to).or_insert(Decimal::ZERO) += amount;
                            }
                        }
                    }
                }

                let snapshot = store.snapshot().await;
                for wallet in snapshot.wallets.values() {
                    prop_assert!(wallet.balance >= Decimal::ZERO);
                }
            }

            let snapshot = store.snapshot().await;
            prop_assert_eq!(snapshot.wallets.len(), model.len());
            for (user, balance) in &model {
                prop_assert_eq!(snapshot.balance_of(*user), Some(*balance));
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// Transfers only ever move money around
    #[test]
    fn test_transfers_conserve_total(
        seed in prop::collection::vec(cents(), 4),
        transfers in prop::collection::vec((user(), user(), cents()), 1..30),
    ) {
        let rt = runtime();
        rt.block_on(async {
            let store = MemoryLedgerStore::new();
            let wallets = WalletManager::new(Arc::new(store.clone()), LedgerConfig::default());

            for (i, c) in seed.iter().enumerate() {
                wallets.deposit(i as i64 + 1, Decimal::new(*c, 2)).await.unwrap();
            }
            let total = store.snapshot().await.total_balance();

            for (from, to, c) in &transfers {
                let _ = wallets.transfer(*from, *to, Decimal::new(*c, 2), None).await;
                prop_assert_eq!(store.snapshot().await.total_balance(), total);
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// Amounts with more than two decimal places are always rejected
    #[test]
    fn test_sub_cent_amounts_rejected(mills in 1i64..1_000_000) {
        prop_assume!(mills % 10 != 0);
        let rt = runtime();
        rt.block_on(async {
            let store = MemoryLedgerStore::new();
            let wallets = WalletManager::new(Arc::new(store.clone()), LedgerConfig::default());

            let err = wallets.deposit(1, Decimal::new(mills, 3)).await.unwrap_err();
            prop_assert_eq!(err.kind(), ErrorKind::InvalidAmount);
            prop_assert!(store.snapshot().await.wallets.is_empty());
            Ok::<(), TestCaseError>(())
        })?;
    }
}
