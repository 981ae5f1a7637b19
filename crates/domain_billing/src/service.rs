//! Invoice query service
//!
//! A thin façade over [`InvoiceRepository`] that speaks in billing terms and
//! turns missing rows into [`BillingError::InvoiceNotFound`].

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::debug;

use core_kernel::{CustomerId, InvoiceId, Money};

use crate::error::BillingError;
use crate::invoice::{BatchCursor, Invoice, InvoiceStatus, InvoiceUpdate};
use crate::ports::InvoiceRepository;

/// Domain-shaped access to stored invoices
#[derive(Clone)]
pub struct InvoiceService {
    repository: Arc<dyn InvoiceRepository>,
}

impl InvoiceService {
    pub fn new(repository: Arc<dyn InvoiceRepository>) -> Self {
        Self { repository }
    }

    /// Lists every invoice
    pub async fn fetch_all(&self) -> Result<Vec<Invoice>, BillingError> {
        Ok(self.repository.fetch_invoices().await?)
    }

    /// Retrieves a single invoice
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvoiceNotFound` if no invoice has `id`
    pub async fn fetch(&self, id: InvoiceId) -> Result<Invoice, BillingError> {
        self.repository
            .fetch_invoice(id)
            .await
            .map_err(|e| BillingError::from_port(id, e))?
            .ok_or(BillingError::InvoiceNotFound(id))
    }

    /// Next page of pending invoices beyond `after`, ascending by id
    pub async fn fetch_pending_batch(
        &self,
        after: BatchCursor,
        limit: u32,
    ) -> Result<Vec<Invoice>, BillingError> {
        debug!(cursor = %after, limit, "Fetching pending invoice batch");
        Ok(self.repository.fetch_pending_batch(after, limit).await?)
    }

    /// Next page of retry invoices beyond `after` whose cool-down of
    /// `retry_frequency_days` has elapsed
    pub async fn fetch_retry_batch(
        &self,
        after: BatchCursor,
        limit: u32,
        retry_frequency_days: u32,
    ) -> Result<Vec<Invoice>, BillingError> {
        self.fetch_retry_batch_as_of(after, limit, retry_frequency_days, Utc::now())
            .await
    }

    /// [`fetch_retry_batch`](Self::fetch_retry_batch) evaluated at `now`
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidConfiguration` if the cut-off falls
    /// outside the representable date range
    pub async fn fetch_retry_batch_as_of(
        &self,
        after: BatchCursor,
        limit: u32,
        retry_frequency_days: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<Invoice>, BillingError> {
        let attempted_before = now
            .checked_sub_signed(Duration::days(i64::from(retry_frequency_days)))
            .ok_or_else(|| {
                BillingError::InvalidConfiguration(format!(
                    "retry_frequency_days of {retry_frequency_days} reaches past the earliest date"
                ))
            })?;
        debug!(
            cursor = %after,
            limit,
            %attempted_before,
            "Fetching retry invoice batch"
        );
        Ok(self
            .repository
            .fetch_retry_batch(after, limit, attempted_before)
            .await?)
    }

    /// Persists the outcome of a charge attempt
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvoiceNotFound` if the invoice no longer exists
    pub async fn update_status(
        &self,
        id: InvoiceId,
        status: InvoiceStatus,
        payment_timestamp: DateTime<Utc>,
        attempt_count: u32,
    ) -> Result<Invoice, BillingError> {
        let update = InvoiceUpdate {
            status,
            last_payment_date: payment_timestamp,
            attempt_count,
        };
        self.repository
            .update_invoice(id, update)
            .await
            .map_err(|e| BillingError::from_port(id, e))?
            .ok_or(BillingError::InvoiceNotFound(id))
    }

    /// Stores a new pending invoice
    pub async fn create(
        &self,
        amount: Money,
        customer_id: CustomerId,
    ) -> Result<Invoice, BillingError> {
        Ok(self
            .repository
            .create_invoice(amount, customer_id, InvoiceStatus::Pending)
            .await?)
    }
}
