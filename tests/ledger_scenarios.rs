//! End-to-end ledger, schedule and savings scenarios over the in-memory store

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use family_ledger::account::{Account, AccountId, AccountStatus};
use family_ledger::converter::{ConversionError, CurrencyConverter, RateProvider};
use family_ledger::ledger::history::account_statement;
use family_ledger::ledger::{
    Direction, EventBus, LedgerEngine, LedgerError, Period, TransferRequest, Violation,
};
use family_ledger::money::Currency;
use family_ledger::savings::{InterestPeriod, InterestRates, SavingsAccount, SavingsInterestProcessor};
use family_ledger::schedule::{
    FailurePolicy, Frequency, NewScheduledTransfer, ScheduledTransferProcessor,
};
use family_ledger::store::{MemoryStore, Store};

// ============================================================================
// Fixtures
// ============================================================================

/// Fixed-rate provider that counts calls
struct FixedRates {
    rate: Decimal,
    calls: AtomicUsize,
}

impl FixedRates {
    fn new(rate: &str) -> Self {
        Self {
            rate: d(rate),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RateProvider for FixedRates {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn rate(&self, _base: Currency, _quote: Currency) -> Result<Decimal, ConversionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.rate)
    }
}

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn date(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn account(id: i64, currency: Currency, balance: &str) -> Account {
    Account {
        account_id: AccountId(id),
        owner_id: 1,
        currency,
        balance: d(balance),
        status: AccountStatus::Active,
        created_at: Utc::now(),
    }
}

struct Harness {
    store: MemoryStore,
    rates: Arc<FixedRates>,
    ledger: Arc<LedgerEngine>,
}

async fn harness(accounts: Vec<Account>) -> Harness {
    let store = MemoryStore::new();
    for a in accounts {
        store.insert_account(a).await;
    }
    let rates = Arc::new(FixedRates::new("0.5"));
    let ledger = Arc::new(LedgerEngine::new(
        Arc::new(store.clone()),
        Arc::new(CurrencyConverter::new(rates.clone())),
        EventBus::default(),
    ));
    Harness {
        store,
        rates,
        ledger,
    }
}

// ============================================================================
// Ledger
// ============================================================================

#[tokio::test]
async fn test_full_balance_rub_transfer() {
    let h = harness(vec![
        account(1, Currency::Rub, "1000"),
        account(2, Currency::Rub, "250"),
    ])
    .await;

    let tx = h
        .ledger
        .create_transaction(&TransferRequest::new(AccountId(1), AccountId(2), d("1000")))
        .await
        .unwrap();

    assert_eq!(h.store.balance(AccountId(1)).await, Some(d("0")));
    assert_eq!(h.store.balance(AccountId(2)).await, Some(d("1250")));
    let rows = h.store.transactions().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0], tx);
    assert_eq!(tx.amount, d("1000"));
    assert_eq!(tx.converted_amount, d("1000"));
    assert_eq!(h.rates.calls(), 0);
}

#[tokio::test]
async fn test_concurrent_drain_allows_exactly_one() {
    let h = harness(vec![
        account(1, Currency::Rub, "100"),
        account(2, Currency::Rub, "0"),
        account(3, Currency::Rub, "0"),
    ])
    .await;

    let first = TransferRequest::new(AccountId(1), AccountId(2), d("60"));
    let second = TransferRequest::new(AccountId(1), AccountId(3), d("60"));
    let (a, b) = tokio::join!(
        h.ledger.create_transaction(&first),
        h.ledger.create_transaction(&second)
    );

    let results = [a, b];
    let ok = results.iter().filter(|r| r.is_ok()).count();
    let drained = results
        .iter()
        .filter(|r| {
            matches!(
                r,
                Err(LedgerError::Rejected(Violation::InsufficientFunds { .. }))
            )
        })
        .count();
    assert_eq!(ok, 1);
    assert_eq!(drained, 1);
    assert_eq!(h.store.balance(AccountId(1)).await, Some(d("40")));
    assert_eq!(h.store.transactions().await.len(), 1);
}

#[tokio::test]
async fn test_opposite_transfers_conserve_money() {
    let h = harness(vec![
        account(1, Currency::Rub, "500"),
        account(2, Currency::Rub, "500"),
    ])
    .await;

    let mut handles = Vec::new();
    for i in 0..20 {
        let ledger = h.ledger.clone();
        let (from, to) = if i % 2 == 0 { (1, 2) } else { (2, 1) };
        handles.push(tokio::spawn(async move {
            ledger
                .create_transaction(&TransferRequest::new(AccountId(from), AccountId(to), d("10")))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let total = h.store.balance(AccountId(1)).await.unwrap() + h.store.balance(AccountId(2)).await.unwrap();
    assert_eq!(total, d("1000"));
    assert_eq!(h.store.transactions().await.len(), 20);
}

#[tokio::test]
async fn test_cross_currency_uses_converter_once() {
    let h = harness(vec![
        account(1, Currency::Eur, "100"),
        account(2, Currency::Usd, "0"),
    ])
    .await;

    let tx = h
        .ledger
        .create_transaction(&TransferRequest::new(AccountId(1), AccountId(2), d("33.33")))
        .await
        .unwrap();

    // 33.33 * 0.5 = 16.665 -> 16.66 (banker's rounding)
    assert_eq!(tx.converted_amount, d("16.66"));
    assert_eq!(h.rates.calls(), 1);
    assert_eq!(h.store.balance(AccountId(1)).await, Some(d("66.67")));
    assert_eq!(h.store.balance(AccountId(2)).await, Some(d("16.66")));
}

#[tokio::test]
async fn test_statement_for_both_sides() {
    let h = harness(vec![
        account(1, Currency::Rub, "100"),
        account(2, Currency::Rub, "0"),
    ])
    .await;
    h.ledger
        .create_transaction(&TransferRequest::new(AccountId(1), AccountId(2), d("30")))
        .await
        .unwrap();

    let statement = account_statement(
        &h.store,
        &[AccountId(1), AccountId(2)],
        Direction::All,
        Period::Today,
        Utc::now(),
    )
    .await
    .unwrap();

    assert_eq!(statement.count, 2);
    assert_eq!(statement.total_income.get(&Currency::Rub), Some(&d("30")));
    assert_eq!(statement.total_outcome.get(&Currency::Rub), Some(&d("30")));
}

// ============================================================================
// Scheduled transfers
// ============================================================================

fn schedule(frequency: Frequency, start: NaiveDate, amount: &str) -> NewScheduledTransfer {
    NewScheduledTransfer {
        source: AccountId(1),
        destination: AccountId(2),
        amount: d(amount),
        description: None,
        frequency,
        start_date: start,
        end_date: None,
    }
}

#[tokio::test]
async fn test_once_schedule_lifecycle() {
    let h = harness(vec![
        account(1, Currency::Rub, "100"),
        account(2, Currency::Rub, "0"),
    ])
    .await;
    let processor = ScheduledTransferProcessor::new(h.ledger.clone(), FailurePolicy::default());
    let today = date(2024, 7, 15);

    let created = h
        .store
        .create_schedule(schedule(Frequency::Once, today, "40"))
        .await
        .unwrap();
    assert_eq!(created.next_occurrence_date, Some(today));

    let report = processor.run(today).await.unwrap();
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.retired, 1);
    assert!(h.store.schedule(created.schedule_id).await.unwrap().is_none());

    let again = processor.run(today).await.unwrap();
    assert_eq!(again.due, 0);
    assert_eq!(h.store.balance(AccountId(2)).await, Some(d("40")));
}

#[tokio::test]
async fn test_month_end_anchor_survives_short_months() {
    let h = harness(vec![
        account(1, Currency::Rub, "1000"),
        account(2, Currency::Rub, "0"),
    ])
    .await;
    let processor = ScheduledTransferProcessor::new(h.ledger.clone(), FailurePolicy::default());
    let created = h
        .store
        .create_schedule(schedule(Frequency::Monthly, date(2023, 1, 31), "10"))
        .await
        .unwrap();

    let mut seen = Vec::new();
    let mut today = date(2023, 1, 31);
    for _ in 0..4 {
        processor.run(today).await.unwrap();
        let next = h
            .store
            .schedule(created.schedule_id)
            .await
            .unwrap()
            .and_then(|s| s.next_occurrence_date)
            .unwrap();
        seen.push(next);
        today = next;
    }

    assert_eq!(
        seen,
        vec![
            date(2023, 2, 28),
            date(2023, 3, 31),
            date(2023, 4, 30),
            date(2023, 5, 31)
        ]
    );
    assert_eq!(h.store.balance(AccountId(2)).await, Some(d("40")));
}

#[tokio::test]
async fn test_end_date_retires_series() {
    let h = harness(vec![
        account(1, Currency::Rub, "1000"),
        account(2, Currency::Rub, "0"),
    ])
    .await;
    let processor = ScheduledTransferProcessor::new(h.ledger.clone(), FailurePolicy::default());
    let mut new = schedule(Frequency::Weekly, date(2024, 1, 1), "5");
    new.end_date = Some(date(2024, 1, 10));
    let created = h.store.create_schedule(new).await.unwrap();

    processor.run(date(2024, 1, 1)).await.unwrap();
    let report = processor.run(date(2024, 1, 8)).await.unwrap();

    assert_eq!(report.retired, 1);
    assert!(h.store.schedule(created.schedule_id).await.unwrap().is_none());
    assert_eq!(h.store.transactions().await.len(), 2);
}

#[tokio::test]
async fn test_cancelled_schedule_never_runs() {
    let h = harness(vec![
        account(1, Currency::Rub, "1000"),
        account(2, Currency::Rub, "0"),
    ])
    .await;
    let processor = ScheduledTransferProcessor::new(h.ledger.clone(), FailurePolicy::default());
    let created = h
        .store
        .create_schedule(schedule(Frequency::Daily, date(2024, 1, 1), "5"))
        .await
        .unwrap();

    assert!(h.store.cancel_schedule(created.schedule_id).await.unwrap());
    assert!(!h.store.cancel_schedule(created.schedule_id).await.unwrap());
    assert_eq!(processor.run(date(2024, 1, 1)).await.unwrap().due, 0);
}

// ============================================================================
// Savings
// ============================================================================

#[tokio::test]
async fn test_interest_cycles_with_cap() {
    let store = MemoryStore::new();
    let mut savings_account = account(7, Currency::Rub, "150000");
    savings_account.created_at = Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap();
    store.insert_account(savings_account.clone()).await;

    let rates = InterestRates {
        monthly: d("0.01"),
        yearly: d("0.12"),
    };
    let terms = SavingsAccount::open(
        &savings_account,
        "House",
        d("1000000"),
        InterestPeriod::Monthly,
        &rates,
    );
    store.create_savings(&terms).await.unwrap();

    let processor =
        SavingsInterestProcessor::new(Arc::new(store.clone()), EventBus::default(), d("100000"));

    // Grace cycle: baseline only
    let report = processor.run(date(2024, 2, 15)).await.unwrap();
    assert_eq!(report.baselined, 1);
    assert_eq!(store.balance(AccountId(7)).await, Some(d("150000")));

    // Capped: interest on 100000, not 150000
    let report = processor.run(date(2024, 3, 15)).await.unwrap();
    assert_eq!(report.total_interest, d("1000"));
    assert_eq!(store.balance(AccountId(7)).await, Some(d("151000")));

    let terms = store.savings_account(AccountId(7)).await.unwrap().unwrap();
    assert_eq!(terms.min_balance, d("100000"));
    assert_eq!(terms.next_interest_date, Some(date(2024, 4, 15)));

    // Not due in between
    assert_eq!(processor.run(date(2024, 3, 16)).await.unwrap().due, 0);
}

#[tokio::test]
async fn test_withdrawal_between_cycles_earns_nothing() {
    let mut savings_account = account(7, Currency::Rub, "5000");
    savings_account.created_at = Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap();
    let h = harness(vec![savings_account.clone(), account(8, Currency::Rub, "0")]).await;

    let rates = InterestRates {
        monthly: d("0.01"),
        yearly: d("0.12"),
    };
    let terms = SavingsAccount::open(
        &savings_account,
        "Bike",
        d("50000"),
        InterestPeriod::Monthly,
        &rates,
    );
    h.store.create_savings(&terms).await.unwrap();
    let processor =
        SavingsInterestProcessor::new(Arc::new(h.store.clone()), EventBus::default(), d("100000"));

    let report = processor.run(date(2024, 2, 15)).await.unwrap();
    assert_eq!(report.baselined, 1);

    h.ledger
        .create_transaction(&TransferRequest::new(AccountId(7), AccountId(8), d("5000")))
        .await
        .unwrap();
    let terms = h.store.savings_account(AccountId(7)).await.unwrap().unwrap();
    assert_eq!(terms.min_balance, d("0"));

    let report = processor.run(date(2024, 3, 15)).await.unwrap();
    assert_eq!(report.zero, 1);
    assert_eq!(report.total_interest, Decimal::ZERO);
    assert_eq!(h.store.balance(AccountId(7)).await, Some(d("0")));
}
