//! PostgreSQL schema
//!
//! Applied idempotently by [`super::PgStore::migrate`]. Money columns are
//! `NUMERIC(15, 2)`; enum-like columns are stored as text and parsed on read.

pub const CREATE_ACCOUNTS: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    account_id  BIGSERIAL PRIMARY KEY,
    owner_id    BIGINT NOT NULL,
    currency    VARCHAR(3) NOT NULL,
    balance     NUMERIC(15, 2) NOT NULL DEFAULT 0,
    status      VARCHAR(16) NOT NULL DEFAULT 'active',
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT balance_not_negative CHECK (balance >= 0)
)"#;

pub const CREATE_TRANSACTIONS: &str = r#"
CREATE TABLE IF NOT EXISTS transactions (
    transaction_id        BIGSERIAL PRIMARY KEY,
    created_at            TIMESTAMPTZ NOT NULL DEFAULT now(),
    status                VARCHAR(16) NOT NULL,
    source_account_id     BIGINT NOT NULL REFERENCES accounts(account_id),
    destination_account_id BIGINT NOT NULL REFERENCES accounts(account_id),
    source_currency       VARCHAR(3) NOT NULL,
    destination_currency  VARCHAR(3) NOT NULL,
    amount                NUMERIC(15, 2) NOT NULL CHECK (amount > 0),
    converted_amount      NUMERIC(15, 2) NOT NULL,
    description           TEXT NOT NULL
)"#;

pub const CREATE_TRANSACTIONS_SOURCE_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_transactions_source
    ON transactions (source_account_id, created_at)"#;

pub const CREATE_TRANSACTIONS_DESTINATION_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_transactions_destination
    ON transactions (destination_account_id, created_at)"#;

pub const CREATE_SCHEDULED_TRANSFERS: &str = r#"
CREATE TABLE IF NOT EXISTS scheduled_transfers (
    schedule_id            BIGSERIAL PRIMARY KEY,
    source_account_id      BIGINT NOT NULL REFERENCES accounts(account_id),
    destination_account_id BIGINT NOT NULL REFERENCES accounts(account_id),
    amount                 NUMERIC(15, 2) NOT NULL CHECK (amount > 0),
    description            TEXT NOT NULL,
    frequency              VARCHAR(16) NOT NULL,
    start_date             DATE NOT NULL,
    end_date               DATE,
    next_occurrence_date   DATE,
    created_at             TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at             TIMESTAMPTZ NOT NULL DEFAULT now()
)"#;

pub const CREATE_SCHEDULED_TRANSFERS_DUE_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_scheduled_transfers_due
    ON scheduled_transfers (next_occurrence_date)
    WHERE next_occurrence_date IS NOT NULL"#;

pub const CREATE_SAVINGS_ACCOUNTS: &str = r#"
CREATE TABLE IF NOT EXISTS savings_accounts (
    account_id         BIGINT PRIMARY KEY REFERENCES accounts(account_id),
    goal_name          TEXT NOT NULL,
    goal_amount        NUMERIC(15, 2) NOT NULL,
    min_balance        NUMERIC(15, 2) NOT NULL DEFAULT 0,
    interest_rate      NUMERIC(6, 4) NOT NULL,
    interest_period    VARCHAR(16) NOT NULL,
    next_interest_date DATE,
    is_first_deposit   BOOLEAN NOT NULL DEFAULT TRUE,
    opened_on          DATE NOT NULL
)"#;

/// All statements, in dependency order
pub const MIGRATIONS: &[&str] = &[
    CREATE_ACCOUNTS,
    CREATE_TRANSACTIONS,
    CREATE_TRANSACTIONS_SOURCE_INDEX,
    CREATE_TRANSACTIONS_DESTINATION_INDEX,
    CREATE_SCHEDULED_TRANSFERS,
    CREATE_SCHEDULED_TRANSFERS_DUE_INDEX,
    CREATE_SAVINGS_ACCOUNTS,
];
