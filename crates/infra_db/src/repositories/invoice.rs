//! PostgreSQL invoice repository
//!
//! Implements the billing domain's `InvoiceRepository` port against the
//! `invoices` table. Batch reads page by id with an exclusive lower bound and
//! filter by status in the query, so rows that change status mid-pass never
//! shift a later page.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use tracing::{debug, instrument};

use core_kernel::{
    AdapterHealth, CoreError, Currency, CustomerId, DomainPort, HealthCheckResult,
    HealthCheckable, InvoiceId, Money, PortError,
};
use domain_billing::{BatchCursor, Invoice, InvoiceRepository, InvoiceStatus, InvoiceUpdate};

use crate::error::DatabaseError;

const SELECT_INVOICE: &str = r#"
    SELECT id, customer_id, value, currency, status, last_payment_date, payment_attempts
    FROM invoices
    WHERE id = $1
"#;

const SELECT_ALL_INVOICES: &str = r#"
    SELECT id, customer_id, value, currency, status, last_payment_date, payment_attempts
    FROM invoices
    ORDER BY id
"#;

const SELECT_PENDING_BATCH: &str = r#"
    SELECT id, customer_id, value, currency, status, last_payment_date, payment_attempts
    FROM invoices
    WHERE status = $1
      AND ($2::BIGINT IS NULL OR id > $2)
    ORDER BY id
    LIMIT $3
"#;

const SELECT_RETRY_BATCH: &str = r#"
    SELECT id, customer_id, value, currency, status, last_payment_date, payment_attempts
    FROM invoices
    WHERE status = $1
      AND ($2::BIGINT IS NULL OR id > $2)
      AND (last_payment_date IS NULL OR last_payment_date <= $4)
    ORDER BY id
    LIMIT $3
"#;

const UPDATE_INVOICE: &str = r#"
    UPDATE invoices
    SET status = $2, last_payment_date = $3, payment_attempts = $4
    WHERE id = $1
    RETURNING id, customer_id, value, currency, status, last_payment_date, payment_attempts
"#;

const INSERT_INVOICE: &str = r#"
    INSERT INTO invoices (customer_id, value, currency, status, payment_attempts)
    VALUES ($1, $2, $3, $4, 0)
    RETURNING id, customer_id, value, currency, status, last_payment_date, payment_attempts
"#;

/// Database row for an invoice
#[derive(Debug, Clone, FromRow)]
pub struct InvoiceRow {
    pub id: i64,
    pub customer_id: i64,
    pub value: Decimal,
    pub currency: String,
    pub status: String,
    pub last_payment_date: Option<DateTime<Utc>>,
    pub payment_attempts: i32,
}

/// PostgreSQL-backed implementation of the `InvoiceRepository` port
///
/// # Error Handling
///
/// SQLx errors go through [`DatabaseError`] into `PortError`. Rows holding a
/// status, currency or attempt count the domain cannot represent surface as
/// `PortError::Transformation`.
#[derive(Debug, Clone)]
pub struct PostgresInvoiceRepository {
    pool: PgPool,
}

impl PostgresInvoiceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_rows(
        &self,
        sql: &'static str,
        status: InvoiceStatus,
        after: BatchCursor,
        limit: u32,
        attempted_before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Invoice>, PortError> {
        let mut query = sqlx::query_as::<_, InvoiceRow>(sql)
            .bind(status.as_str())
            .bind(after.lower_bound().map(|id| id.value()))
            .bind(i64::from(limit));
        if let Some(cutoff) = attempted_before {
            query = query.bind(cutoff);
        }

        let rows = query.fetch_all(&self.pool).await.map_err(port_error)?;
        debug!(rows = rows.len(), "Fetched invoice batch");
        rows.into_iter().map(row_to_invoice).collect()
    }
}

impl DomainPort for PostgresInvoiceRepository {}

#[async_trait]
impl HealthCheckable for PostgresInvoiceRepository {
    /// Runs `SELECT 1` against the pool
    async fn health_check(&self) -> HealthCheckResult {
        let start = std::time::Instant::now();

        let result = sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await;

        let latency_ms = start.elapsed().as_millis() as u64;

        let (status, message) = match result {
            Ok(_) => (AdapterHealth::Healthy, None),
            Err(e) => (
                AdapterHealth::Unhealthy,
                Some(format!("Database error: {}", e)),
            ),
        };
        HealthCheckResult {
            adapter_id: "postgres-invoice-repository".to_string(),
            status,
            latency_ms,
            message,
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl InvoiceRepository for PostgresInvoiceRepository {
    #[instrument(skip(self), fields(invoice_id = %id))]
    async fn fetch_invoice(&self, id: InvoiceId) -> Result<Option<Invoice>, PortError> {
        sqlx::query_as::<_, InvoiceRow>(SELECT_INVOICE)
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(port_error)?
            .map(row_to_invoice)
            .transpose()
    }

    #[instrument(skip(self))]
    async fn fetch_invoices(&self) -> Result<Vec<Invoice>, PortError> {
        let rows = sqlx::query_as::<_, InvoiceRow>(SELECT_ALL_INVOICES)
            .fetch_all(&self.pool)
            .await
            .map_err(port_error)?;
        rows.into_iter().map(row_to_invoice).collect()
    }

    #[instrument(skip(self), fields(cursor = %after))]
    async fn fetch_pending_batch(
        &self,
        after: BatchCursor,
        limit: u32,
    ) -> Result<Vec<Invoice>, PortError> {
        self.fetch_rows(SELECT_PENDING_BATCH, InvoiceStatus::Pending, after, limit, None)
            .await
    }

    #[instrument(skip(self), fields(cursor = %after))]
    async fn fetch_retry_batch(
        &self,
        after: BatchCursor,
        limit: u32,
        attempted_before: DateTime<Utc>,
    ) -> Result<Vec<Invoice>, PortError> {
        self.fetch_rows(
            SELECT_RETRY_BATCH,
            InvoiceStatus::Retry,
            after,
            limit,
            Some(attempted_before),
        )
        .await
    }

    #[instrument(skip(self, update), fields(invoice_id = %id, status = %update.status))]
    async fn update_invoice(
        &self,
        id: InvoiceId,
        update: InvoiceUpdate,
    ) -> Result<Option<Invoice>, PortError> {
        let attempts = i32::try_from(update.attempt_count).map_err(|_| {
            PortError::transformation(format!(
                "attempt count {} does not fit the payment_attempts column",
                update.attempt_count
            ))
        })?;

        let row = sqlx::query_as::<_, InvoiceRow>(UPDATE_INVOICE)
            .bind(id.value())
            .bind(update.status.as_str())
            .bind(update.last_payment_date)
            .bind(attempts)
            .fetch_optional(&self.pool)
            .await
            .map_err(port_error)?;

        if row.is_none() {
            debug!("No invoice row matched the update");
        }
        row.map(row_to_invoice).transpose()
    }

    #[instrument(skip(self), fields(customer_id = %customer_id))]
    async fn create_invoice(
        &self,
        amount: Money,
        customer_id: CustomerId,
        status: InvoiceStatus,
    ) -> Result<Invoice, PortError> {
        let row = sqlx::query_as::<_, InvoiceRow>(INSERT_INVOICE)
            .bind(customer_id.value())
            .bind(amount.amount())
            .bind(amount.currency().code())
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(port_error)?;

        debug!(invoice_id = row.id, "Invoice created");
        row_to_invoice(row)
    }
}

fn port_error(error: sqlx::Error) -> PortError {
    DatabaseError::from(&error).into()
}

/// Converts a database row to a domain invoice
fn row_to_invoice(row: InvoiceRow) -> Result<Invoice, PortError> {
    parse_row(row).map_err(|e| PortError::transformation(e.to_string()))
}

fn parse_row(row: InvoiceRow) -> Result<Invoice, CoreError> {
    let currency: Currency = row.currency.parse()?;
    let status: InvoiceStatus = row.status.parse()?;
    let attempt_count = u32::try_from(row.payment_attempts).map_err(|_| {
        CoreError::validation(format!(
            "invoice {} has negative payment attempts ({})",
            row.id, row.payment_attempts
        ))
    })?;

    Ok(Invoice {
        id: InvoiceId::new(row.id),
        customer_id: CustomerId::new(row.customer_id),
        amount: Money::new(row.value, currency),
        status,
        last_payment_date: row.last_payment_date,
        attempt_count,
    })
}
