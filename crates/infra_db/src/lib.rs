//! Infrastructure Database Layer
//!
//! PostgreSQL storage for the billing workspace, built on SQLx.
//!
//! # Architecture
//!
//! The crate implements the domain's [`InvoiceRepository`] port. Batch reads
//! filter by status at query time and page by id, backed by an index on
//! `(status, id)`, so every pass query is a bounded index range scan.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresInvoiceRepository};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/billing")).await?;
//! run_migrations(&pool).await?;
//! let repository = PostgresInvoiceRepository::new(pool);
//! ```
//!
//! [`InvoiceRepository`]: domain_billing::InvoiceRepository

pub mod pool;
pub mod error;
pub mod repositories;

pub use pool::{DatabasePool, DatabaseConfig, create_pool, run_migrations};
pub use error::DatabaseError;
pub use repositories::PostgresInvoiceRepository;
