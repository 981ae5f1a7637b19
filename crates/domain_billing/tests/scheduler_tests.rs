//! Tests for billing scheduler gating and lifecycle

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal_macros::dec;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use core_kernel::{Currency, CustomerId, DomainPort, InvoiceId, Money, PortError};

use domain_billing::{
    BatchCursor, BillingConfig, BillingEngine, BillingError, BillingPass, BillingPassReport,
    BillingScheduler, BillingTrigger, InMemoryInvoiceRepository, Invoice, InvoiceRepository,
    InvoiceService, InvoiceStatus, InvoiceUpdate, PaymentGateway,
};

#[derive(Default)]
struct CountingTrigger {
    initial: AtomicUsize,
    retry: AtomicUsize,
    fail: bool,
}

impl CountingTrigger {
    fn outcome(&self, pass: BillingPass) -> Result<BillingPassReport, BillingError> {
        if self.fail {
            return Err(BillingError::Repository(PortError::connection("refused")));
        }
        Ok(BillingPassReport::new(Uuid::now_v7(), pass))
    }
}

#[async_trait]
impl BillingTrigger for CountingTrigger {
    async fn run_initial_pass(&self) -> Result<BillingPassReport, BillingError> {
        self.initial.fetch_add(1, Ordering::SeqCst);
        self.outcome(BillingPass::Initial)
    }

    async fn run_retry_pass(&self) -> Result<BillingPassReport, BillingError> {
        self.retry.fetch_add(1, Ordering::SeqCst);
        self.outcome(BillingPass::Retry { retry_frequency_days: 1 })
    }
}

/// In-memory store whose updates report some rows as gone
#[derive(Default)]
struct VanishingRepository {
    inner: InMemoryInvoiceRepository,
    missing_on_update: HashSet<InvoiceId>,
}

impl DomainPort for VanishingRepository {}

#[async_trait]
impl InvoiceRepository for VanishingRepository {
    async fn fetch_invoice(&self, id: InvoiceId) -> Result<Option<Invoice>, PortError> {
        self.inner.fetch_invoice(id).await
    }

    async fn fetch_invoices(&self) -> Result<Vec<Invoice>, PortError> {
        self.inner.fetch_invoices().await
    }

    async fn fetch_pending_batch(
        &self,
        after: BatchCursor,
        limit: u32,
    ) -> Result<Vec<Invoice>, PortError> {
        self.inner.fetch_pending_batch(after, limit).await
    }

    async fn fetch_retry_batch(
        &self,
        after: BatchCursor,
        limit: u32,
        attempted_before: DateTime<Utc>,
    ) -> Result<Vec<Invoice>, PortError> {
        self.inner.fetch_retry_batch(after, limit, attempted_before).await
    }

    async fn update_invoice(
        &self,
        id: InvoiceId,
        update: InvoiceUpdate,
    ) -> Result<Option<Invoice>, PortError> {
        if self.missing_on_update.contains(&id) {
            return Ok(None);
        }
        self.inner.update_invoice(id, update).await
    }

    async fn create_invoice(
        &self,
        amount: Money,
        customer_id: CustomerId,
        status: InvoiceStatus,
    ) -> Result<Invoice, PortError> {
        self.inner.create_invoice(amount, customer_id, status).await
    }
}

struct ApprovingGateway;

impl DomainPort for ApprovingGateway {}

#[async_trait]
impl PaymentGateway for ApprovingGateway {
    async fn charge(&self, _invoice: &Invoice) -> Result<bool, PortError> {
        Ok(true)
    }
}

fn invoice(id: i64) -> Invoice {
    Invoice::new(
        InvoiceId::new(id),
        CustomerId::new(1),
        Money::new(dec!(20), Currency::EUR),
    )
}

fn engine_scheduler(repository: Arc<VanishingRepository>) -> BillingScheduler {
    let config = BillingConfig {
        billing_day_of_month: 1,
        batch_size: 2,
        ..Default::default()
    };
    let engine = BillingEngine::new(
        InvoiceService::new(repository),
        Arc::new(ApprovingGateway),
        config.clone(),
    )
    .unwrap();
    BillingScheduler::new(Arc::new(engine), &config)
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
}

fn scheduler(trigger: Arc<CountingTrigger>, billing_day_of_month: u32) -> BillingScheduler {
    let config = BillingConfig {
        billing_day_of_month,
        ..Default::default()
    };
    BillingScheduler::new(trigger, &config)
}

#[tokio::test]
async fn test_initial_pass_runs_on_billing_day() {
    let trigger = Arc::new(CountingTrigger::default());
    let scheduler = scheduler(trigger.clone(), 1);

    let report = scheduler.on_initial_tick(date(1)).await;

    assert!(report.is_some());
    assert_eq!(trigger.initial.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_initial_pass_skipped_on_other_days() {
    let trigger = Arc::new(CountingTrigger::default());
    let scheduler = scheduler(trigger.clone(), 15);

    for day in [1, 14, 16, 28] {
        assert!(scheduler.on_initial_tick(date(day)).await.is_none());
    }
    assert!(scheduler.on_initial_tick(date(15)).await.is_some());
    assert_eq!(trigger.initial.load(Ordering::SeqCst), 1);
    assert_eq!(trigger.retry.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_retry_tick_is_not_gated() {
    let trigger = Arc::new(CountingTrigger::default());
    let scheduler = scheduler(trigger.clone(), 1);

    assert!(scheduler.on_retry_tick().await.is_some());
    assert!(scheduler.on_retry_tick().await.is_some());
    assert_eq!(trigger.retry.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_failed_pass_is_swallowed() {
    let trigger = Arc::new(CountingTrigger {
        fail: true,
        ..Default::default()
    });
    let scheduler = scheduler(trigger.clone(), 1);

    assert!(scheduler.on_initial_tick(date(1)).await.is_none());
    assert!(scheduler.on_retry_tick().await.is_none());
    assert_eq!(trigger.initial.load(Ordering::SeqCst), 1);
    assert_eq!(trigger.retry.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_start_ticks_immediately_and_shuts_down() {
    let trigger = Arc::new(CountingTrigger::default());
    let scheduler = Arc::new(scheduler(trigger.clone(), 1));

    let handle = scheduler.start();
    for _ in 0..100 {
        if trigger.retry.load(Ordering::SeqCst) > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
        .await
        .unwrap();
    assert_eq!(trigger.retry.load(Ordering::SeqCst), 1);
}

mod with_engine {
    use super::*;

    #[tokio::test]
    async fn test_initial_tick_contains_vanished_invoice() {
        let repository = Arc::new(VanishingRepository {
            inner: InMemoryInvoiceRepository::with_invoices(vec![
                invoice(1),
                invoice(2),
                invoice(3),
            ])
            .await,
            missing_on_update: HashSet::from([InvoiceId::new(2)]),
        });
        let scheduler = engine_scheduler(repository.clone());

        let report = scheduler.on_initial_tick(date(1)).await.unwrap();

        assert_eq!(report.pass, BillingPass::Initial);
        assert_eq!(report.fetched, 3);
        assert_eq!(report.paid, 2);
        assert_eq!(report.not_found, 1);
        for id in [1, 3] {
            let stored = repository.inner.fetch_invoice(InvoiceId::new(id)).await.unwrap().unwrap();
            assert_eq!(stored.status, InvoiceStatus::Paid);
            assert_eq!(stored.attempt_count, 1);
        }
        let untouched = repository.inner.fetch_invoice(InvoiceId::new(2)).await.unwrap().unwrap();
        assert_eq!(untouched.status, InvoiceStatus::Pending);
    }

    #[tokio::test]
    async fn test_retry_tick_charges_cooled_down_invoices() {
        let three_days_ago = Utc::now() - chrono::Duration::days(3);
        let repository = Arc::new(VanishingRepository {
            inner: InMemoryInvoiceRepository::with_invoices(vec![
                invoice(1)
                    .with_status(InvoiceStatus::Retry)
                    .with_attempts(1, three_days_ago),
                invoice(2)
                    .with_status(InvoiceStatus::Retry)
                    .with_attempts(2, three_days_ago),
                invoice(3).with_status(InvoiceStatus::Retry).with_attempts(1, Utc::now()),
            ])
            .await,
            ..Default::default()
        });
        let scheduler = engine_scheduler(repository.clone());

        let report = scheduler.on_retry_tick().await.unwrap();

        assert_eq!(report.pass, BillingPass::Retry { retry_frequency_days: 1 });
        assert_eq!(report.fetched, 2);
        assert_eq!(report.paid, 2);
        let stored = repository.inner.fetch_invoice(InvoiceId::new(2)).await.unwrap().unwrap();
        assert_eq!(stored.status, InvoiceStatus::Paid);
        assert_eq!(stored.attempt_count, 3);
        let waiting = repository.inner.fetch_invoice(InvoiceId::new(3)).await.unwrap().unwrap();
        assert_eq!(waiting.status, InvoiceStatus::Retry);
    }
}
