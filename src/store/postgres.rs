//! PostgreSQL store
//!
//! Each [`UnitOfWork`] wraps one sqlx transaction. Account rows are locked
//! with `SELECT ... FOR UPDATE`; schedule and savings claims use
//! `FOR UPDATE SKIP LOCKED` so concurrent runs never process the same row.
//! Whenever both an account row and its savings row are locked, the account
//! row is locked first.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction as SqlxTransaction};
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use super::{Store, StoreError, UnitOfWork, schema};
use crate::account::{Account, AccountId};
use crate::ledger::{NewTransaction, Transaction, TransactionId};
use crate::savings::SavingsAccount;
use crate::schedule::{NewScheduledTransfer, ScheduleId, ScheduledTransfer};

const ACCOUNT_COLUMNS: &str = "account_id, owner_id, currency, balance, status, created_at";

const TRANSACTION_COLUMNS: &str = "transaction_id, created_at, status, source_account_id, \
     destination_account_id, source_currency, destination_currency, amount, converted_amount, \
     description";

const SCHEDULE_COLUMNS: &str = "schedule_id, source_account_id, destination_account_id, amount, \
     description, frequency, start_date, end_date, next_occurrence_date, created_at, updated_at";

const SAVINGS_COLUMNS: &str = "account_id, goal_name, goal_amount, min_balance, interest_rate, \
     interest_period, next_interest_date, is_first_deposit, opened_on";

/// Due predicate with `today` bound at placeholder `param`
fn schedule_due(param: &str) -> String {
    format!(
        "next_occurrence_date IS NOT NULL AND next_occurrence_date <= {param} \
         AND start_date <= {param} AND (end_date IS NULL OR end_date >= {param})"
    )
}

/// PostgreSQL [`Store`]
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        tracing::info!("PostgreSQL connection pool established");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables and indexes if missing
    pub async fn migrate(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for statement in schema::MIGRATIONS {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        tracing::info!(statements = schema::MIGRATIONS.len(), "Schema migrated");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Insert an account row; used by fixtures and the account-opening flow
    pub async fn create_account(&self, account: &Account) -> Result<Account, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO accounts (owner_id, currency, balance, status, created_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(account.owner_id)
        .bind(account.currency.code())
        .bind(account.balance)
        .bind(account.status.as_str())
        .bind(account.created_at)
        .fetch_one(&self.pool)
        .await?;
        account_from_row(&row)
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn parse<T>(table: &'static str, value: &str) -> Result<T, StoreError>
where
    T: FromStr,
    T::Err: Display,
{
    value.parse().map_err(|e: T::Err| StoreError::Corrupt {
        table,
        detail: e.to_string(),
    })
}

fn account_from_row(row: &PgRow) -> Result<Account, StoreError> {
    Ok(Account {
        account_id: AccountId(row.try_get("account_id")?),
        owner_id: row.try_get("owner_id")?,
        currency: parse("accounts", row.try_get("currency")?)?,
        balance: row.try_get("balance")?,
        status: parse("accounts", row.try_get("status")?)?,
        created_at: row.try_get("created_at")?,
    })
}

fn transaction_from_row(row: &PgRow) -> Result<Transaction, StoreError> {
    Ok(Transaction {
        transaction_id: TransactionId(row.try_get("transaction_id")?),
        created_at: row.try_get("created_at")?,
        status: parse("transactions", row.try_get("status")?)?,
        source: AccountId(row.try_get("source_account_id")?),
        destination: AccountId(row.try_get("destination_account_id")?),
        source_currency: parse("transactions", row.try_get("source_currency")?)?,
        destination_currency: parse("transactions", row.try_get("destination_currency")?)?,
        amount: row.try_get("amount")?,
        converted_amount: row.try_get("converted_amount")?,
        description: row.try_get("description")?,
    })
}

fn schedule_from_row(row: &PgRow) -> Result<ScheduledTransfer, StoreError> {
    Ok(ScheduledTransfer {
        schedule_id: ScheduleId(row.try_get("schedule_id")?),
        source: AccountId(row.try_get("source_account_id")?),
        destination: AccountId(row.try_get("destination_account_id")?),
        amount: row.try_get("amount")?,
        description: row.try_get("description")?,
        frequency: parse("scheduled_transfers", row.try_get("frequency")?)?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        next_occurrence_date: row.try_get("next_occurrence_date")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn savings_from_row(row: &PgRow) -> Result<SavingsAccount, StoreError> {
    Ok(SavingsAccount {
        account_id: AccountId(row.try_get("account_id")?),
        goal_name: row.try_get("goal_name")?,
        goal_amount: row.try_get("goal_amount")?,
        min_balance: row.try_get("min_balance")?,
        interest_rate: row.try_get("interest_rate")?,
        interest_period: parse("savings_accounts", row.try_get("interest_period")?)?,
        next_interest_date: row.try_get("next_interest_date")?,
        is_first_deposit: row.try_get("is_first_deposit")?,
        opened_on: row.try_get("opened_on")?,
    })
}

/// Balance check violations surface as integrity errors, not database errors
fn map_balance_error(id: AccountId, err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.constraint() == Some("balance_not_negative") => {
            StoreError::Integrity(format!("balance_not_negative violated for account {}", id))
        }
        _ => StoreError::Database(err),
    }
}

// ============================================================================
// Store
// ============================================================================

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnit { tx }))
    }

    async fn account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE account_id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn transactions_for(
        &self,
        accounts: &[AccountId],
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<Transaction>, StoreError> {
        let ids: Vec<i64> = accounts.iter().map(|a| a.0).collect();
        let rows = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions
             WHERE (source_account_id = ANY($1) OR destination_account_id = ANY($1))
               AND ($2::timestamptz IS NULL OR created_at >= $2)
               AND ($3::timestamptz IS NULL OR created_at < $3)
             ORDER BY created_at, transaction_id"
        ))
        .bind(ids)
        .bind(since)
        .bind(until)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(transaction_from_row).collect()
    }

    async fn create_schedule(
        &self,
        new: NewScheduledTransfer,
    ) -> Result<ScheduledTransfer, StoreError> {
        let description = new.description();
        let row = sqlx::query(&format!(
            "INSERT INTO scheduled_transfers
                 (source_account_id, destination_account_id, amount, description,
                  frequency, start_date, end_date, next_occurrence_date)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $6)
             RETURNING {SCHEDULE_COLUMNS}"
        ))
        .bind(new.source.0)
        .bind(new.destination.0)
        .bind(new.amount)
        .bind(description)
        .bind(new.frequency.as_str())
        .bind(new.start_date)
        .bind(new.end_date)
        .fetch_one(&self.pool)
        .await?;
        schedule_from_row(&row)
    }

    async fn schedule(&self, id: ScheduleId) -> Result<Option<ScheduledTransfer>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM scheduled_transfers WHERE schedule_id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(schedule_from_row).transpose()
    }

    async fn cancel_schedule(&self, id: ScheduleId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM scheduled_transfers WHERE schedule_id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn due_schedule_ids(&self, today: NaiveDate) -> Result<Vec<ScheduleId>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT schedule_id FROM scheduled_transfers
             WHERE {}
             ORDER BY next_occurrence_date, start_date, schedule_id",
            schedule_due("$1")
        ))
        .bind(today)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| -> Result<ScheduleId, StoreError> { Ok(ScheduleId(r.try_get("schedule_id")?)) })
            .collect()
    }

    async fn create_savings(&self, savings: &SavingsAccount) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO savings_accounts ({SAVINGS_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        ))
        .bind(savings.account_id.0)
        .bind(&savings.goal_name)
        .bind(savings.goal_amount)
        .bind(savings.min_balance)
        .bind(savings.interest_rate)
        .bind(savings.interest_period.as_str())
        .bind(savings.next_interest_date)
        .bind(savings.is_first_deposit)
        .bind(savings.opened_on)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn savings_account(&self, id: AccountId) -> Result<Option<SavingsAccount>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {SAVINGS_COLUMNS} FROM savings_accounts WHERE account_id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(savings_from_row).transpose()
    }

    async fn due_savings_ids(&self, today: NaiveDate) -> Result<Vec<AccountId>, StoreError> {
        let rows = sqlx::query(
            "SELECT s.account_id FROM savings_accounts s
             JOIN accounts a ON a.account_id = s.account_id
             WHERE s.next_interest_date = $1 AND a.status IN ('active', 'frozen')
             ORDER BY s.account_id",
        )
        .bind(today)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| -> Result<AccountId, StoreError> { Ok(AccountId(r.try_get("account_id")?)) })
            .collect()
    }
}

// ============================================================================
// Unit of work
// ============================================================================

struct PgUnit {
    tx: SqlxTransaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnit {
    async fn lock_account(&mut self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE account_id = $1 FOR UPDATE"
        ))
        .bind(id.0)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn set_balance(&mut self, id: AccountId, balance: Decimal) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE accounts SET balance = $1 WHERE account_id = $2")
            .bind(balance)
            .bind(id.0)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_balance_error(id, e))?;
        if result.rows_affected() != 1 {
            return Err(StoreError::Integrity(format!("account {} vanished", id)));
        }
        Ok(())
    }

    async fn insert_transaction(
        &mut self,
        new: &NewTransaction,
    ) -> Result<Transaction, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO transactions
                 (status, source_account_id, destination_account_id, source_currency,
                  destination_currency, amount, converted_amount, description)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {TRANSACTION_COLUMNS}"
        ))
        .bind(new.status.as_str())
        .bind(new.source.0)
        .bind(new.destination.0)
        .bind(new.source_currency.code())
        .bind(new.destination_currency.code())
        .bind(new.amount)
        .bind(new.converted_amount)
        .bind(&new.description)
        .fetch_one(&mut *self.tx)
        .await?;
        transaction_from_row(&row)
    }

    async fn claim_due_schedule(
        &mut self,
        id: ScheduleId,
        today: NaiveDate,
    ) -> Result<Option<ScheduledTransfer>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM scheduled_transfers
             WHERE schedule_id = $1 AND {}
             FOR UPDATE SKIP LOCKED",
            schedule_due("$2")
        ))
        .bind(id.0)
        .bind(today)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(schedule_from_row).transpose()
    }

    async fn set_next_occurrence(
        &mut self,
        id: ScheduleId,
        next: Option<NaiveDate>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE scheduled_transfers SET next_occurrence_date = $1, updated_at = now()
             WHERE schedule_id = $2",
        )
        .bind(next)
        .bind(id.0)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_schedule(&mut self, id: ScheduleId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM scheduled_transfers WHERE schedule_id = $1")
            .bind(id.0)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn track_min_balance(
        &mut self,
        id: AccountId,
        balance: Decimal,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE savings_accounts SET min_balance = LEAST(min_balance, $1)
             WHERE account_id = $2",
        )
        .bind(balance)
        .bind(id.0)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn claim_due_savings(
        &mut self,
        id: AccountId,
        today: NaiveDate,
    ) -> Result<Option<(SavingsAccount, Account)>, StoreError> {
        let Some(account) = self.lock_account(id).await? else {
            return Ok(None);
        };
        if !account.status.accrues_interest() {
            return Ok(None);
        }

        // SKIP LOCKED only ever skips a concurrent accrual run
        let row = sqlx::query(&format!(
            "SELECT {SAVINGS_COLUMNS} FROM savings_accounts
             WHERE account_id = $1 AND next_interest_date = $2
             FOR UPDATE SKIP LOCKED"
        ))
        .bind(id.0)
        .bind(today)
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => Ok(Some((savings_from_row(&row)?, account))),
            None => Ok(None),
        }
    }

    async fn update_savings(&mut self, savings: &SavingsAccount) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE savings_accounts
             SET min_balance = $1, next_interest_date = $2, is_first_deposit = $3
             WHERE account_id = $4",
        )
        .bind(savings.min_balance)
        .bind(savings.next_interest_date)
        .bind(savings.is_first_deposit)
        .bind(savings.account_id.0)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let PgUnit { tx } = *self;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let PgUnit { tx } = *self;
        tx.rollback().await?;
        Ok(())
    }
}
