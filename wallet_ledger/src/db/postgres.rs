//! PostgreSQL implementation of the ledger store.
#![allow(clippy::needless_raw_string_hashes)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use std::time::Duration;

use super::repository::{LedgerStore, Provisioned, UnitOfWork};
use crate::wallet::{
    EntryId, EntryStatus, LedgerEntry, LedgerError, LedgerResult, NewEntry, UserId, Wallet,
};

/// SQLSTATE raised when a value doesn't fit `NUMERIC(15,2)`
const NUMERIC_VALUE_OUT_OF_RANGE: &str = "22003";

const WALLET_COLUMNS: &str = "user_id, balance, created_at, updated_at";

const ENTRY_COLUMNS: &str = "id, sender_id, receiver_id, amount, status, description, \
                             transaction_type, created_at, updated_at";

/// Default PostgreSQL implementation of `LedgerStore`
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn wallet_from_row(row: &PgRow) -> LedgerResult<Wallet> {
    Ok(Wallet {
        user_id: row.try_get("user_id")?,
        balance: row.try_get("balance")?,
        created_at: row
            .try_get::<chrono::NaiveDateTime, _>("created_at")?
            .and_utc(),
        updated_at: row
            .try_get::<chrono::NaiveDateTime, _>("updated_at")?
            .and_utc(),
    })
}

fn entry_from_row(row: &PgRow) -> LedgerResult<LedgerEntry> {
    let status: String = row.try_get("status")?;
    let transaction_type: String = row.try_get("transaction_type")?;

    Ok(LedgerEntry {
        id: row.try_get("id")?,
        sender_id: row.try_get("sender_id")?,
        receiver_id: row.try_get("receiver_id")?,
        amount: row.try_get("amount")?,
        status: status.parse().map_err(LedgerError::StoreUnavailable)?,
        transaction_type: transaction_type
            .parse()
            .map_err(LedgerError::StoreUnavailable)?,
        description: row.try_get("description")?,
        created_at: row
            .try_get::<chrono::NaiveDateTime, _>("created_at")?
            .and_utc(),
        updated_at: row
            .try_get::<chrono::NaiveDateTime, _>("updated_at")?
            .and_utc(),
    })
}

/// Map numeric overflow to a typed error; everything else stays a store fault
fn credit_error(user_id: UserId, err: sqlx::Error) -> LedgerError {
    let overflow = err
        .as_database_error()
        .and_then(|db_err| db_err.code())
        .is_some_and(|code| code == NUMERIC_VALUE_OUT_OF_RANGE);

    if overflow {
        LedgerError::BalanceOverflow(user_id)
    } else {
        LedgerError::Database(err)
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self, lock_timeout: Duration) -> LedgerResult<Box<dyn UnitOfWork>> {
        let mut tx = self.pool.begin().await?;

        // Transaction-local: `FOR UPDATE` waits past this fail with SQLSTATE 55P03
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await?;

        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn find_wallet(&self, user_id: UserId) -> LedgerResult<Option<Wallet>> {
        let row = sqlx::query(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(wallet_from_row).transpose()
    }

    async fn ensure_wallet(&self, user_id: UserId) -> LedgerResult<Provisioned> {
        let mut conn = self.pool.acquire().await?;
        provision(&mut *conn, user_id).await
    }

    async fn list_entries(
        &self,
        user_id: UserId,
        limit: Option<i64>,
    ) -> LedgerResult<Vec<LedgerEntry>> {
        // LIMIT NULL means no limit
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM transactions
            WHERE sender_id = $1 OR receiver_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    async fn find_entry(
        &self,
        user_id: UserId,
        entry_id: EntryId,
    ) -> LedgerResult<Option<LedgerEntry>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM transactions
            WHERE id = $1 AND (sender_id = $2 OR receiver_id = $2)
            "#
        ))
        .bind(entry_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(entry_from_row).transpose()
    }

    async fn health_check(&self) -> LedgerResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Insert-if-absent followed by a fetch.
///
/// `ON CONFLICT DO NOTHING` waits for any concurrent uncommitted insert of the
/// same user, so the follow-up SELECT always sees exactly one row.
async fn provision(conn: &mut sqlx::PgConnection, user_id: UserId) -> LedgerResult<Provisioned> {
    let inserted = sqlx::query(&format!(
        r#"
        INSERT INTO wallets (user_id, balance)
        VALUES ($1, 0.00)
        ON CONFLICT (user_id) DO NOTHING
        RETURNING {WALLET_COLUMNS}
        "#
    ))
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(row) = inserted {
        return Ok(Provisioned {
            wallet: wallet_from_row(&row)?,
            created: true,
        });
    }

    let row = sqlx::query(&format!(
        "SELECT {WALLET_COLUMNS} FROM wallets WHERE user_id = $1"
    ))
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(LedgerError::WalletNotFound(user_id))?;

    Ok(Provisioned {
        wallet: wallet_from_row(&row)?,
        created: false,
    })
}

/// Unit of work backed by a database transaction
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn lock_wallet(&mut self, user_id: UserId) -> LedgerResult<Option<Wallet>> {
        let row = sqlx::query(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets WHERE user_id = $1 FOR UPDATE"
        ))
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(wallet_from_row).transpose()
    }

    async fn ensure_wallet(&mut self, user_id: UserId) -> LedgerResult<Provisioned> {
        provision(&mut *self.tx, user_id).await
    }

    async fn credit(&mut self, user_id: UserId, amount: Decimal) -> LedgerResult<Decimal> {
        let row = sqlx::query(
            "UPDATE wallets
             SET balance = balance + $1, updated_at = NOW()
             WHERE user_id = $2
             RETURNING balance",
        )
        .bind(amount)
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| credit_error(user_id, e))?
        .ok_or(LedgerError::WalletNotFound(user_id))?;

        Ok(row.try_get("balance")?)
    }

    async fn debit(&mut self, user_id: UserId, amount: Decimal) -> LedgerResult<Decimal> {
        // Check and update in one statement; the CHECK constraint is the backstop
        let row = sqlx::query(
            "UPDATE wallets
             SET balance = balance - $1, updated_at = NOW()
             WHERE user_id = $2 AND balance >= $1
             RETURNING balance",
        )
        .bind(amount)
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => Ok(row.try_get("balance")?),
            None => {
                // Either wallet doesn't exist or insufficient balance
                let check = sqlx::query("SELECT balance FROM wallets WHERE user_id = $1")
                    .bind(user_id)
                    .fetch_optional(&mut *self.tx)
                    .await?;

                match check {
                    Some(row) => Err(LedgerError::InsufficientFunds {
                        user_id,
                        available: row.try_get("balance")?,
                        required: amount,
                    }),
                    None => Err(LedgerError::WalletNotFound(user_id)),
                }
            }
        }
    }

    async fn append_entry(&mut self, entry: NewEntry) -> LedgerResult<LedgerEntry> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO transactions (sender_id, receiver_id, amount, status, transaction_type, description)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {ENTRY_COLUMNS}
            "#
        ))
        .bind(entry.sender_id)
        .bind(entry.receiver_id)
        .bind(entry.amount)
        .bind(EntryStatus::Completed.to_string())
        .bind(entry.transaction_type.to_string())
        .bind(entry.description)
        .fetch_one(&mut *self.tx)
        .await?;

        entry_from_row(&row)
    }

    async fn commit(self: Box<Self>) -> LedgerResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> LedgerResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
