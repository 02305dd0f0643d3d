//! Ledger Engine
//!
//! Executes one transfer as a single unit of work:
//!
//! ```text
//! lock both accounts (ascending id) -> guard -> convert -> record -> debit/credit -> commit
//! ```
//!
//! A debit also lowers the tracked minimum of savings terms on the source
//! account, so interest is never paid on money withdrawn mid-cycle.
//!
//! The balance check and the balance write happen under the same row locks,
//! so two concurrent transfers can never jointly overdraw an account.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::error::LedgerError;
use super::events::{EventBus, LedgerEvent};
use super::guard;
use super::types::{NewTransaction, Transaction, TransactionStatus, TransferPreview, TransferRequest};
use crate::account::{Account, AccountId};
use crate::converter::CurrencyConverter;
use crate::money;
use crate::store::{Store, UnitOfWork};

pub struct LedgerEngine {
    store: Arc<dyn Store>,
    converter: Arc<CurrencyConverter>,
    events: EventBus,
}

impl LedgerEngine {
    pub fn new(store: Arc<dyn Store>, converter: Arc<CurrencyConverter>, events: EventBus) -> Self {
        Self {
            store,
            converter,
            events,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Execute a transfer in its own unit of work and publish it after commit
    pub async fn create_transaction(
        &self,
        request: &TransferRequest,
    ) -> Result<Transaction, LedgerError> {
        let mut uow = self.store.begin().await?;

        let tx = match self.transfer_in(uow.as_mut(), request).await {
            Ok(tx) => tx,
            Err(e) => {
                if let Err(rollback_err) = uow.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed after rejected transfer");
                }
                return Err(e);
            }
        };

        uow.commit().await?;

        info!(
            transaction_id = %tx.transaction_id,
            source = %tx.source,
            destination = %tx.destination,
            amount = %tx.amount,
            converted_amount = %tx.converted_amount,
            "Transfer committed"
        );
        self.events
            .publish(LedgerEvent::TransactionCommitted(tx.clone()));
        Ok(tx)
    }

    /// Execute a transfer inside a caller-owned unit of work
    ///
    /// Nothing is committed or published; the caller does both. On error the
    /// caller must roll the unit back.
    pub async fn transfer_in(
        &self,
        uow: &mut dyn UnitOfWork,
        request: &TransferRequest,
    ) -> Result<Transaction, LedgerError> {
        if !money::is_valid_amount(request.amount) {
            return Err(LedgerError::InvalidAmount);
        }

        let (source, destination) =
            lock_pair(uow, request.source, request.destination).await?;

        guard::validate(&source, &destination, request.amount)?;

        let converted_amount = self
            .converter
            .convert(source.currency, destination.currency, request.amount)
            .await?;
        // Rounding can eat the whole amount on a cross-currency transfer
        if converted_amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }

        let new_source_balance = source
            .balance
            .checked_sub(request.amount)
            .ok_or(LedgerError::Overflow(source.account_id))?;
        let new_destination_balance = destination
            .balance
            .checked_add(converted_amount)
            .ok_or(LedgerError::Overflow(destination.account_id))?;

        let tx = uow
            .insert_transaction(&NewTransaction {
                status: TransactionStatus::Completed,
                source: source.account_id,
                destination: destination.account_id,
                source_currency: source.currency,
                destination_currency: destination.currency,
                amount: request.amount,
                converted_amount,
                description: request.description(),
            })
            .await?;

        uow.set_balance(source.account_id, new_source_balance).await?;
        uow.set_balance(destination.account_id, new_destination_balance)
            .await?;
        uow.track_min_balance(source.account_id, new_source_balance)
            .await?;

        debug!(
            transaction_id = %tx.transaction_id,
            source_balance = %new_source_balance,
            destination_balance = %new_destination_balance,
            "Balances updated"
        );
        Ok(tx)
    }

    /// Dry run: what the destination would receive, without locking or writing
    pub async fn preview(&self, request: &TransferRequest) -> Result<TransferPreview, LedgerError> {
        if !money::is_valid_amount(request.amount) {
            return Err(LedgerError::InvalidAmount);
        }

        let source = self.load(request.source).await?;
        let destination = self.load(request.destination).await?;
        if source.account_id == destination.account_id {
            return Err(guard::Violation::SameAccount.into());
        }

        let converted_amount = self
            .converter
            .convert(source.currency, destination.currency, request.amount)
            .await?;
        // Rounding can eat the whole amount on a cross-currency transfer
        if converted_amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }

        Ok(TransferPreview {
            source: source.account_id,
            destination: destination.account_id,
            source_currency: source.currency,
            destination_currency: destination.currency,
            amount: request.amount,
            converted_amount,
        })
    }

    async fn load(&self, id: AccountId) -> Result<Account, LedgerError> {
        self.store
            .account(id)
            .await?
            .ok_or(LedgerError::AccountNotFound(id))
    }
}

/// Lock both accounts in ascending id order and return them as (source, destination)
async fn lock_pair(
    uow: &mut dyn UnitOfWork,
    source: AccountId,
    destination: AccountId,
) -> Result<(Account, Account), LedgerError> {
    let mut ids = [source, destination];
    ids.sort();

    let mut locked: Vec<Account> = Vec::with_capacity(2);
    for (i, id) in ids.iter().enumerate() {
        if i > 0 && ids[i - 1] == *id {
            continue;
        }
        let account = uow
            .lock_account(*id)
            .await?
            .ok_or(LedgerError::AccountNotFound(*id))?;
        locked.push(account);
    }

    let find = |id: AccountId| {
        locked
            .iter()
            .find(|a| a.account_id == id)
            .cloned()
            .ok_or(LedgerError::AccountNotFound(id))
    };
    Ok((find(source)?, find(destination)?))
}
