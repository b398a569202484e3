//! Subcommand parsing and execution.

use anyhow::{Error, bail};
use pico_args::Arguments;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use wallet_ledger::{
    LedgerResult, WalletManager,
    wallet::{EntryId, UserId, money::parse_amount},
};

/// What the command line asked for
///
/// Schema migration needs the database handle rather than a wallet manager, so
/// it is kept apart from the ledger commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Migrate,
    Ledger(Command),
}

/// One ledger operation requested on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Health,
    Balance {
        user_id: UserId,
    },
    Deposit {
        user_id: UserId,
        amount: Decimal,
    },
    Withdraw {
        user_id: UserId,
        amount: Decimal,
    },
    Transfer {
        sender_id: UserId,
        receiver_id: UserId,
        amount: Decimal,
        description: Option<String>,
    },
    History {
        user_id: UserId,
        limit: Option<i64>,
    },
    Show {
        user_id: UserId,
        entry_id: EntryId,
    },
}

impl Invocation {
    /// Parse the subcommand and its arguments, rejecting anything left over
    ///
    /// Options must be consumed before positionals, so `--description` and
    /// `--limit` are read first.
    pub fn parse(mut pargs: Arguments) -> Result<Self, Error> {
        let Some(name) = pargs.subcommand()? else {
            bail!("missing command (try --help)");
        };

        let command = match name.as_str() {
            "migrate" => Invocation::Migrate,
            "health" => Invocation::Ledger(Command::Health),
            "balance" => Invocation::Ledger(Command::Balance {
                user_id: pargs.free_from_str()?,
            }),
            "deposit" => Invocation::Ledger(Command::Deposit {
                user_id: pargs.free_from_str()?,
                amount: pargs.free_from_fn(parse_amount)?,
            }),
            "withdraw" => Invocation::Ledger(Command::Withdraw {
                user_id: pargs.free_from_str()?,
                amount: pargs.free_from_fn(parse_amount)?,
            }),
            "transfer" => {
                let description = pargs.opt_value_from_str("--description")?;
                Invocation::Ledger(Command::Transfer {
                    sender_id: pargs.free_from_str()?,
                    receiver_id: pargs.free_from_str()?,
                    amount: pargs.free_from_fn(parse_amount)?,
                    description,
                })
            }
            "history" => {
                let limit = pargs.opt_value_from_str("--limit")?;
                Invocation::Ledger(Command::History {
                    user_id: pargs.free_from_str()?,
                    limit,
                })
            }
            "show" => Invocation::Ledger(Command::Show {
                user_id: pargs.free_from_str()?,
                entry_id: pargs.free_from_str()?,
            }),
            other => bail!("unknown command '{other}' (try --help)"),
        };

        let rest = pargs.finish();
        if !rest.is_empty() {
            bail!("unexpected arguments: {rest:?}");
        }

        Ok(command)
    }
}

impl Command {
    /// Whether the command changes balances
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Command::Deposit { .. } | Command::Withdraw { .. } | Command::Transfer { .. }
        )
    }

    /// Run a ledger command and render its result as JSON
    pub async fn execute(self, wallets: &WalletManager) -> LedgerResult<Value> {
        match self {
            Command::Health => {
                wallets.health_check().await?;
                Ok(json!({ "healthy": true }))
            }
            Command::Balance { user_id } => Ok(json!(wallets.get_wallet(user_id).await?)),
            Command::Deposit { user_id, amount } => {
                let balance = wallets.deposit(user_id, amount).await?;
                Ok(json!({ "user_id": user_id, "balance": balance }))
            }
            Command::Withdraw { user_id, amount } => {
                let balance = wallets.withdraw(user_id, amount).await?;
                Ok(json!({ "user_id": user_id, "balance": balance }))
            }
            Command::Transfer {
                sender_id,
                receiver_id,
                amount,
                description,
            } => Ok(json!(
                wallets
                    .transfer(sender_id, receiver_id, amount, description)
                    .await?
            )),
            Command::History { user_id, limit } => {
                let entries = match limit {
                    Some(limit) => wallets.recent_transactions(user_id, limit).await?,
                    None => wallets.list_transactions(user_id).await?,
                };
                Ok(json!(entries))
            }
            Command::Show { user_id, entry_id } => {
                Ok(json!(wallets.get_transaction(user_id, entry_id).await?))
            }
        }
    }
}
