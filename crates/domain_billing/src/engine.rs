//! Billing engine
//!
//! Walks the eligible invoices in id-ordered batches, charges every invoice of
//! a batch with bounded concurrency, classifies each result through the
//! [`RetryPolicy`] and writes the new state back.
//!
//! # Batch loop
//!
//! ```text
//! cursor = start
//! loop {
//!     batch = fetch(cursor, batch_size)      // status-filtered, id > cursor
//!     if batch is empty: stop
//!     process every invoice, wait for all
//!     cursor = highest id in batch
//! }
//! ```
//!
//! The cursor is an id, never an offset, so invoices that leave the queried
//! status during the run cannot shift later pages.
//!
//! # Failure containment
//!
//! Gateway errors, missing rows and status mismatches are confined to the
//! invoice they occur on and reported as an [`InvoiceOutcome`]. Only a failed
//! batch fetch ends a pass early.

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use core_kernel::InvoiceId;

use crate::config::BillingConfig;
use crate::error::BillingError;
use crate::invoice::{BatchCursor, Invoice, InvoiceStatus};
use crate::ports::PaymentGateway;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::service::InvoiceService;

/// Which set of invoices a pass works through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BillingPass {
    /// Pending invoices, charged for the first time
    Initial,
    /// Invoices in retry whose cool-down has elapsed
    Retry { retry_frequency_days: u32 },
}

impl fmt::Display for BillingPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BillingPass::Initial => f.write_str("initial"),
            BillingPass::Retry { .. } => f.write_str("retry"),
        }
    }
}

/// What happened to a single invoice
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InvoiceOutcome {
    /// Invoice was already in a terminal status; the gateway was not contacted
    Skipped {
        invoice_id: InvoiceId,
        status: InvoiceStatus,
    },
    /// Attempt made and the new state persisted
    Recorded {
        invoice_id: InvoiceId,
        decision: RetryDecision,
        gateway_failure: Option<String>,
    },
    /// Attempt made but the invoice no longer exists in the store
    NotFound {
        invoice_id: InvoiceId,
        decision: RetryDecision,
        gateway_failure: Option<String>,
    },
    /// Attempt made and written, but the store reports another status
    StatusMismatch {
        invoice_id: InvoiceId,
        requested: InvoiceStatus,
        persisted: InvoiceStatus,
        gateway_failure: Option<String>,
    },
    /// Attempt made but the write failed for another reason
    PersistFailed {
        invoice_id: InvoiceId,
        decision: RetryDecision,
        gateway_failure: Option<String>,
        reason: String,
    },
}

impl InvoiceOutcome {
    /// The gateway error that was treated as a declined charge, if any
    pub fn gateway_failure(&self) -> Option<&str> {
        match self {
            InvoiceOutcome::Skipped { .. } => None,
            InvoiceOutcome::Recorded { gateway_failure, .. }
            | InvoiceOutcome::NotFound { gateway_failure, .. }
            | InvoiceOutcome::StatusMismatch { gateway_failure, .. }
            | InvoiceOutcome::PersistFailed { gateway_failure, .. } => gateway_failure.as_deref(),
        }
    }
}

/// Counts gathered over one pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BillingPassReport {
    pub run_id: Uuid,
    pub pass: BillingPass,
    /// Non-empty batches processed
    pub batches: usize,
    /// Invoices received across all batches
    pub fetched: usize,
    pub paid: usize,
    pub retried: usize,
    pub failed: usize,
    /// Invoices skipped because they were already terminal
    pub skipped: usize,
    pub not_found: usize,
    pub status_mismatches: usize,
    pub gateway_failures: usize,
    pub persist_failures: usize,
}

impl BillingPassReport {
    pub fn new(run_id: Uuid, pass: BillingPass) -> Self {
        Self {
            run_id,
            pass,
            batches: 0,
            fetched: 0,
            paid: 0,
            retried: 0,
            failed: 0,
            skipped: 0,
            not_found: 0,
            status_mismatches: 0,
            gateway_failures: 0,
            persist_failures: 0,
        }
    }

    /// Folds one invoice outcome into the counts
    pub fn record(&mut self, outcome: &InvoiceOutcome) {
        if outcome.gateway_failure().is_some() {
            self.gateway_failures += 1;
        }
        match outcome {
            InvoiceOutcome::Skipped { .. } => self.skipped += 1,
            InvoiceOutcome::Recorded { decision, .. } => match decision.status {
                InvoiceStatus::Paid => self.paid += 1,
                InvoiceStatus::Retry => self.retried += 1,
                InvoiceStatus::Failed => self.failed += 1,
                InvoiceStatus::Pending => {}
            },
            InvoiceOutcome::NotFound { .. } => self.not_found += 1,
            InvoiceOutcome::StatusMismatch { .. } => self.status_mismatches += 1,
            InvoiceOutcome::PersistFailed { .. } => self.persist_failures += 1,
        }
    }

    /// Invoices for which a charge was attempted
    pub fn attempted(&self) -> usize {
        self.fetched - self.skipped
    }
}

/// Orchestrates billing passes over stored invoices
pub struct BillingEngine {
    invoices: InvoiceService,
    gateway: Arc<dyn PaymentGateway>,
    policy: RetryPolicy,
    config: BillingConfig,
}

impl BillingEngine {
    /// Creates an engine
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidConfiguration` if `config` does not validate
    pub fn new(
        invoices: InvoiceService,
        gateway: Arc<dyn PaymentGateway>,
        config: BillingConfig,
    ) -> Result<Self, BillingError> {
        config.validate()?;
        Ok(Self {
            invoices,
            gateway,
            policy: RetryPolicy::new(config.max_attempts),
            config,
        })
    }

    /// Charges every pending invoice using the configured batch size
    pub async fn run_initial_billing_pass(&self) -> Result<BillingPassReport, BillingError> {
        self.run_initial_billing_pass_with(self.config.batch_size).await
    }

    /// Charges every pending invoice, `batch_size` at a time
    pub async fn run_initial_billing_pass_with(
        &self,
        batch_size: u32,
    ) -> Result<BillingPassReport, BillingError> {
        self.run_pass(BillingPass::Initial, batch_size).await
    }

    /// Re-charges invoices in retry using the configured batch size and cool-down
    pub async fn run_retry_billing_pass(&self) -> Result<BillingPassReport, BillingError> {
        self.run_retry_billing_pass_with(self.config.batch_size, self.config.retry_frequency_days)
            .await
    }

    /// Re-charges invoices in retry whose last attempt is at least
    /// `retry_frequency_days` old, `batch_size` at a time
    pub async fn run_retry_billing_pass_with(
        &self,
        batch_size: u32,
        retry_frequency_days: u32,
    ) -> Result<BillingPassReport, BillingError> {
        self.run_pass(BillingPass::Retry { retry_frequency_days }, batch_size)
            .await
    }

    #[instrument(skip(self), fields(run_id))]
    async fn run_pass(
        &self,
        pass: BillingPass,
        batch_size: u32,
    ) -> Result<BillingPassReport, BillingError> {
        if batch_size == 0 {
            return Err(BillingError::InvalidConfiguration(
                "batch_size must be at least 1".to_string(),
            ));
        }

        let run_id = Uuid::now_v7();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        info!("Billing pass started");

        let mut report = BillingPassReport::new(run_id, pass);
        let mut cursor = BatchCursor::Start;

        loop {
            let batch = match self.fetch_batch(pass, cursor, batch_size).await {
                Ok(batch) => batch,
                Err(e) => {
                    error!(cursor = %cursor, error = %e, "Failed to fetch invoice batch, ending pass");
                    return Err(e);
                }
            };
            if batch.is_empty() {
                break;
            }

            report.batches += 1;
            report.fetched += batch.len();
            cursor.advance_past(&batch);

            for outcome in self.process_batch(&batch).await {
                report.record(&outcome);
            }
            debug!(batch = report.batches, cursor = %cursor, "Batch processed");
        }

        info!(
            batches = report.batches,
            fetched = report.fetched,
            attempted = report.attempted(),
            paid = report.paid,
            retried = report.retried,
            failed = report.failed,
            skipped = report.skipped,
            not_found = report.not_found,
            status_mismatches = report.status_mismatches,
            gateway_failures = report.gateway_failures,
            persist_failures = report.persist_failures,
            "Billing pass finished"
        );
        Ok(report)
    }

    async fn fetch_batch(
        &self,
        pass: BillingPass,
        cursor: BatchCursor,
        batch_size: u32,
    ) -> Result<Vec<Invoice>, BillingError> {
        match pass {
            BillingPass::Initial => self.invoices.fetch_pending_batch(cursor, batch_size).await,
            BillingPass::Retry { retry_frequency_days } => {
                self.invoices
                    .fetch_retry_batch(cursor, batch_size, retry_frequency_days)
                    .await
            }
        }
    }

    /// Processes every invoice of a batch, at most `max_concurrency` at once,
    /// and returns once all of them have finished
    async fn process_batch(&self, batch: &[Invoice]) -> Vec<InvoiceOutcome> {
        // Streams owned invoices; borrowed items break the `Send` bound on
        // `BillingTrigger` futures
        stream::iter(batch.iter().cloned())
            .map(|invoice| async move { self.process_invoice(&invoice).await })
            .buffer_unordered(self.config.max_concurrency)
            .collect()
            .await
    }

    /// Makes one payment attempt on `invoice` and persists the result
    ///
    /// Never fails: every problem is reported in the returned outcome.
    pub async fn process_invoice(&self, invoice: &Invoice) -> InvoiceOutcome {
        let invoice_id = invoice.id;

        if invoice.status.is_terminal() {
            debug!(invoice_id = %invoice_id, status = %invoice.status, "Invoice already settled, skipping");
            return InvoiceOutcome::Skipped {
                invoice_id,
                status: invoice.status,
            };
        }

        let (charged, gateway_failure) = match self.gateway.charge(invoice).await {
            Ok(charged) => (charged, None),
            Err(e) => {
                let failure = BillingError::PaymentGatewayFailure {
                    id: invoice_id,
                    reason: e.to_string(),
                };
                warn!(invoice_id = %invoice_id, error = %failure, "Treating gateway failure as declined charge");
                (false, Some(e.to_string()))
            }
        };

        let decision = self.policy.classify(invoice.attempt_count, charged);
        debug!(
            invoice_id = %invoice_id,
            charged,
            status = %decision.status,
            attempt_count = decision.attempt_count,
            "Charge attempt classified"
        );

        let stored = self
            .invoices
            .update_status(invoice_id, decision.status, Utc::now(), decision.attempt_count)
            .await;

        match stored {
            Ok(stored) if stored.status == decision.status => InvoiceOutcome::Recorded {
                invoice_id,
                decision,
                gateway_failure,
            },
            Ok(stored) => {
                let mismatch = BillingError::InvoiceStatusUpdateFailed {
                    id: invoice_id,
                    requested: decision.status,
                    persisted: stored.status,
                };
                warn!(invoice_id = %invoice_id, error = %mismatch, "Stored status differs from requested status");
                InvoiceOutcome::StatusMismatch {
                    invoice_id,
                    requested: decision.status,
                    persisted: stored.status,
                    gateway_failure,
                }
            }
            Err(BillingError::InvoiceNotFound(_)) => {
                warn!(invoice_id = %invoice_id, "Invoice disappeared before its status could be recorded");
                InvoiceOutcome::NotFound {
                    invoice_id,
                    decision,
                    gateway_failure,
                }
            }
            Err(e) => {
                error!(invoice_id = %invoice_id, error = %e, "Failed to record charge attempt");
                InvoiceOutcome::PersistFailed {
                    invoice_id,
                    decision,
                    gateway_failure,
                    reason: e.to_string(),
                }
            }
        }
    }
}

/// Entry points fired by the scheduler
#[async_trait]
pub trait BillingTrigger: Send + Sync + 'static {
    async fn run_initial_pass(&self) -> Result<BillingPassReport, BillingError>;

    async fn run_retry_pass(&self) -> Result<BillingPassReport, BillingError>;
}

#[async_trait]
impl BillingTrigger for BillingEngine {
    async fn run_initial_pass(&self) -> Result<BillingPassReport, BillingError> {
        self.run_initial_billing_pass().await
    }

    async fn run_retry_pass(&self) -> Result<BillingPassReport, BillingError> {
        self.run_retry_billing_pass().await
    }
}
