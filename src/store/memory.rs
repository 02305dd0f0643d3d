//! In-memory store
//!
//! A single async mutex guards the whole state. A unit of work holds the
//! lock from `begin()` until commit/rollback and mutates a private copy,
//! which replaces the shared state only on commit. Units are therefore
//! serialized and a rolled-back unit leaves no trace.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{Store, StoreError, UnitOfWork};
use crate::account::{Account, AccountId};
use crate::ledger::{NewTransaction, Transaction, TransactionId};
use crate::savings::SavingsAccount;
use crate::schedule::{NewScheduledTransfer, ScheduleId, ScheduledTransfer};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    accounts: BTreeMap<AccountId, Account>,
    transactions: Vec<Transaction>,
    schedules: BTreeMap<ScheduleId, ScheduledTransfer>,
    savings: BTreeMap<AccountId, SavingsAccount>,
    next_transaction_id: i64,
    next_schedule_id: i64,
    /// Account lock acquisition order, for deadlock-order assertions
    lock_log: Vec<AccountId>,
}

/// In-memory [`Store`]
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    fail_commit: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or replace an account row
    pub async fn insert_account(&self, account: Account) {
        let mut state = self.state.lock().await;
        state.accounts.insert(account.account_id, account);
    }

    /// Seed a schedule row verbatim (tests use this to set up degraded rows)
    pub async fn insert_schedule(&self, schedule: ScheduledTransfer) {
        let mut state = self.state.lock().await;
        state.next_schedule_id = state.next_schedule_id.max(schedule.schedule_id.0);
        state.schedules.insert(schedule.schedule_id, schedule);
    }

    pub async fn transactions(&self) -> Vec<Transaction> {
        self.state.lock().await.transactions.clone()
    }

    pub async fn balance(&self, id: AccountId) -> Option<Decimal> {
        self.state
            .lock()
            .await
            .accounts
            .get(&id)
            .map(|a| a.balance)
    }

    /// Account ids in the order units of work locked them
    pub async fn lock_log(&self) -> Vec<AccountId> {
        self.state.lock().await.lock_log.clone()
    }

    /// Make every subsequent commit fail, simulating a persistence outage
    pub fn set_fail_commit(&self, fail: bool) {
        self.fail_commit.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let working = (*guard).clone();
        Ok(Box::new(MemoryUnit {
            guard,
            working,
            fail_commit: self.fail_commit.clone(),
        }))
    }

    async fn account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.state.lock().await.accounts.get(&id).cloned())
    }

    async fn transactions_for(
        &self,
        accounts: &[AccountId],
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<Transaction>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .iter()
            .filter(|t| accounts.contains(&t.source) || accounts.contains(&t.destination))
            .filter(|t| since.is_none_or(|s| t.created_at >= s))
            .filter(|t| until.is_none_or(|u| t.created_at < u))
            .cloned()
            .collect())
    }

    async fn create_schedule(
        &self,
        new: NewScheduledTransfer,
    ) -> Result<ScheduledTransfer, StoreError> {
        let mut state = self.state.lock().await;
        state.next_schedule_id += 1;
        let schedule = new.into_schedule(ScheduleId(state.next_schedule_id), Utc::now());
        state.schedules.insert(schedule.schedule_id, schedule.clone());
        Ok(schedule)
    }

    async fn schedule(&self, id: ScheduleId) -> Result<Option<ScheduledTransfer>, StoreError> {
        Ok(self.state.lock().await.schedules.get(&id).cloned())
    }

    async fn cancel_schedule(&self, id: ScheduleId) -> Result<bool, StoreError> {
        Ok(self.state.lock().await.schedules.remove(&id).is_some())
    }

    async fn due_schedule_ids(&self, today: NaiveDate) -> Result<Vec<ScheduleId>, StoreError> {
        let state = self.state.lock().await;
        let mut due: Vec<&ScheduledTransfer> = state
            .schedules
            .values()
            .filter(|s| s.is_due(today))
            .collect();
        due.sort_by_key(|s| (s.next_occurrence_date, s.start_date, s.schedule_id));
        Ok(due.into_iter().map(|s| s.schedule_id).collect())
    }

    async fn create_savings(&self, savings: &SavingsAccount) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if !state.accounts.contains_key(&savings.account_id) {
            return Err(StoreError::Integrity(format!(
                "savings terms for unknown account {}",
                savings.account_id
            )));
        }
        if state.savings.contains_key(&savings.account_id) {
            return Err(StoreError::Integrity(format!(
                "account {} already has savings terms",
                savings.account_id
            )));
        }
        state.savings.insert(savings.account_id, savings.clone());
        Ok(())
    }

    async fn savings_account(&self, id: AccountId) -> Result<Option<SavingsAccount>, StoreError> {
        Ok(self.state.lock().await.savings.get(&id).cloned())
    }

    async fn due_savings_ids(&self, today: NaiveDate) -> Result<Vec<AccountId>, StoreError> {
        let state = self.state.lock().await;
        Ok(due_savings(&state, today).collect())
    }
}

fn due_savings(state: &MemoryState, today: NaiveDate) -> impl Iterator<Item = AccountId> + '_ {
    state
        .savings
        .values()
        .filter(move |s| s.next_interest_date == Some(today))
        .filter(move |s| {
            state
                .accounts
                .get(&s.account_id)
                .is_some_and(|a| a.status.accrues_interest())
        })
        .map(|s| s.account_id)
}

struct MemoryUnit {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    fail_commit: Arc<AtomicBool>,
}

#[async_trait]
impl UnitOfWork for MemoryUnit {
    async fn lock_account(&mut self, id: AccountId) -> Result<Option<Account>, StoreError> {
        self.working.lock_log.push(id);
        Ok(self.working.accounts.get(&id).cloned())
    }

    async fn set_balance(&mut self, id: AccountId, balance: Decimal) -> Result<(), StoreError> {
        if balance < Decimal::ZERO {
            return Err(StoreError::Integrity(format!(
                "balance_not_negative violated for account {}",
                id
            )));
        }
        let account = self
            .working
            .accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::Integrity(format!("account {} vanished", id)))?;
        account.balance = balance;
        Ok(())
    }

    async fn insert_transaction(
        &mut self,
        new: &NewTransaction,
    ) -> Result<Transaction, StoreError> {
        self.working.next_transaction_id += 1;
        let tx = Transaction {
            transaction_id: TransactionId(self.working.next_transaction_id),
            created_at: Utc::now(),
            status: new.status,
            source: new.source,
            destination: new.destination,
            source_currency: new.source_currency,
            destination_currency: new.destination_currency,
            amount: new.amount,
            converted_amount: new.converted_amount,
            description: new.description.clone(),
        };
        self.working.transactions.push(tx.clone());
        Ok(tx)
    }

    async fn claim_due_schedule(
        &mut self,
        id: ScheduleId,
        today: NaiveDate,
    ) -> Result<Option<ScheduledTransfer>, StoreError> {
        Ok(self
            .working
            .schedules
            .get(&id)
            .filter(|s| s.is_due(today))
            .cloned())
    }

    async fn set_next_occurrence(
        &mut self,
        id: ScheduleId,
        next: Option<NaiveDate>,
    ) -> Result<(), StoreError> {
        let schedule = self
            .working
            .schedules
            .get_mut(&id)
            .ok_or_else(|| StoreError::Integrity(format!("schedule {} vanished", id)))?;
        schedule.next_occurrence_date = next;
        schedule.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_schedule(&mut self, id: ScheduleId) -> Result<(), StoreError> {
        self.working.schedules.remove(&id);
        Ok(())
    }

    async fn track_min_balance(
        &mut self,
        id: AccountId,
        balance: Decimal,
    ) -> Result<(), StoreError> {
        if let Some(savings) = self.working.savings.get_mut(&id) {
            savings.min_balance = savings.min_balance.min(balance);
        }
        Ok(())
    }

    async fn claim_due_savings(
        &mut self,
        id: AccountId,
        today: NaiveDate,
    ) -> Result<Option<(SavingsAccount, Account)>, StoreError> {
        if !due_savings(&self.working, today).any(|due| due == id) {
            return Ok(None);
        }
        let savings = self.working.savings.get(&id).cloned();
        let account = self.lock_account(id).await?;
        Ok(savings.zip(account))
    }

    async fn update_savings(&mut self, savings: &SavingsAccount) -> Result<(), StoreError> {
        match self.working.savings.get_mut(&savings.account_id) {
            Some(row) => {
                *row = savings.clone();
                Ok(())
            }
            None => Err(StoreError::Integrity(format!(
                "savings account {} vanished",
                savings.account_id
            ))),
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(StoreError::Integrity("injected commit failure".to_string()));
        }
        let MemoryUnit {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
