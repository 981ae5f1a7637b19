//! In-memory invoice repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use core_kernel::{
    AdapterHealth, CustomerId, DomainPort, HealthCheckResult, HealthCheckable, InvoiceId, Money,
    PortError,
};

use crate::invoice::{BatchCursor, Invoice, InvoiceStatus, InvoiceUpdate};
use crate::ports::InvoiceRepository;

#[derive(Debug, Default)]
struct Store {
    invoices: BTreeMap<InvoiceId, Invoice>,
    last_id: i64,
}

/// Invoice store backed by an ordered map
///
/// Ids are assigned sequentially from 1. Each operation holds the lock for its
/// whole duration, so updates are atomic per row.
#[derive(Debug, Default)]
pub struct InMemoryInvoiceRepository {
    store: RwLock<Store>,
}

impl InMemoryInvoiceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populates with invoices, keeping their ids
    pub async fn with_invoices(invoices: Vec<Invoice>) -> Self {
        let repository = Self::new();
        {
            let mut store = repository.store.write().await;
            for invoice in invoices {
                store.last_id = store.last_id.max(invoice.id.value());
                store.invoices.insert(invoice.id, invoice);
            }
        }
        repository
    }

    /// Removes an invoice, returning it if it existed
    pub async fn remove(&self, id: InvoiceId) -> Option<Invoice> {
        self.store.write().await.invoices.remove(&id)
    }

    async fn fetch_batch_where<F>(&self, after: BatchCursor, limit: u32, filter: F) -> Vec<Invoice>
    where
        F: Fn(&Invoice) -> bool,
    {
        let store = self.store.read().await;
        store
            .invoices
            .values()
            .filter(|invoice| after.admits(invoice.id))
            .filter(|invoice| filter(invoice))
            .take(limit as usize)
            .cloned()
            .collect()
    }
}

impl DomainPort for InMemoryInvoiceRepository {}

#[async_trait]
impl HealthCheckable for InMemoryInvoiceRepository {
    async fn health_check(&self) -> HealthCheckResult {
        let count = self.store.read().await.invoices.len();
        HealthCheckResult {
            adapter_id: "in-memory-invoices".to_string(),
            status: AdapterHealth::Healthy,
            latency_ms: 0,
            message: Some(format!("{} invoices held in memory", count)),
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl InvoiceRepository for InMemoryInvoiceRepository {
    async fn fetch_invoice(&self, id: InvoiceId) -> Result<Option<Invoice>, PortError> {
        Ok(self.store.read().await.invoices.get(&id).cloned())
    }

    async fn fetch_invoices(&self) -> Result<Vec<Invoice>, PortError> {
        Ok(self.store.read().await.invoices.values().cloned().collect())
    }

    async fn fetch_pending_batch(
        &self,
        after: BatchCursor,
        limit: u32,
    ) -> Result<Vec<Invoice>, PortError> {
        Ok(self
            .fetch_batch_where(after, limit, |invoice| {
                invoice.status == InvoiceStatus::Pending
            })
            .await)
    }

    async fn fetch_retry_batch(
        &self,
        after: BatchCursor,
        limit: u32,
        attempted_before: DateTime<Utc>,
    ) -> Result<Vec<Invoice>, PortError> {
        Ok(self
            .fetch_batch_where(after, limit, |invoice| {
                invoice.status == InvoiceStatus::Retry
                    && invoice.cooled_down_since(attempted_before)
            })
            .await)
    }

    async fn update_invoice(
        &self,
        id: InvoiceId,
        update: InvoiceUpdate,
    ) -> Result<Option<Invoice>, PortError> {
        let mut store = self.store.write().await;
        Ok(store.invoices.get_mut(&id).map(|invoice| {
            invoice.apply(&update);
            invoice.clone()
        }))
    }

    async fn create_invoice(
        &self,
        amount: Money,
        customer_id: CustomerId,
        status: InvoiceStatus,
    ) -> Result<Invoice, PortError> {
        let mut store = self.store.write().await;
        store.last_id += 1;
        let invoice =
            Invoice::new(InvoiceId::new(store.last_id), customer_id, amount).with_status(status);
        store.invoices.insert(invoice.id, invoice.clone());
        Ok(invoice)
    }
}
