//! Billing Domain Ports
//!
//! The billing engine depends on two collaborators it does not own:
//!
//! - **InvoiceRepository**: durable invoice storage with status-filtered,
//!   cursor-paginated reads and single-row updates
//! - **PaymentGateway**: the payment provider that charges an invoice
//!
//! Application wiring picks the adapters:
//!
//! ```rust,ignore
//! let repository: Arc<dyn InvoiceRepository> = Arc::new(PostgresInvoiceRepository::new(pool));
//! let gateway: Arc<dyn PaymentGateway> = Arc::new(provider);
//! let engine = BillingEngine::new(InvoiceService::new(repository), gateway, config)?;
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use core_kernel::{CustomerId, DomainPort, InvoiceId, Money, PortError};

use crate::invoice::{BatchCursor, Invoice, InvoiceStatus, InvoiceUpdate};

/// Storage port for invoices
///
/// Batch reads return invoices in ascending id order, strictly beyond the
/// cursor, filtered by status at query time.
#[async_trait]
pub trait InvoiceRepository: DomainPort {
    /// Retrieves an invoice by id, `None` if it does not exist
    async fn fetch_invoice(&self, id: InvoiceId) -> Result<Option<Invoice>, PortError>;

    /// Retrieves every invoice
    async fn fetch_invoices(&self) -> Result<Vec<Invoice>, PortError>;

    /// Retrieves up to `limit` pending invoices beyond `after`
    async fn fetch_pending_batch(
        &self,
        after: BatchCursor,
        limit: u32,
    ) -> Result<Vec<Invoice>, PortError>;

    /// Retrieves up to `limit` invoices in retry beyond `after` whose last
    /// attempt happened at or before `attempted_before`
    async fn fetch_retry_batch(
        &self,
        after: BatchCursor,
        limit: u32,
        attempted_before: DateTime<Utc>,
    ) -> Result<Vec<Invoice>, PortError>;

    /// Writes status, last payment date and attempt count together.
    ///
    /// Returns the stored row after the write, or `None` if no row has `id`.
    async fn update_invoice(
        &self,
        id: InvoiceId,
        update: InvoiceUpdate,
    ) -> Result<Option<Invoice>, PortError>;

    /// Stores a new invoice with no attempts and returns it
    async fn create_invoice(
        &self,
        amount: Money,
        customer_id: CustomerId,
        status: InvoiceStatus,
    ) -> Result<Invoice, PortError>;
}

/// Payment provider port
#[async_trait]
pub trait PaymentGateway: DomainPort {
    /// Attempts to charge the invoice amount to the customer's account.
    ///
    /// `Ok(false)` is a declined charge; `Err` is a transport or provider
    /// failure, which the engine also treats as declined.
    async fn charge(&self, invoice: &Invoice) -> Result<bool, PortError>;
}
