//! Repository implementations for domain entities
//!
//! Each repository owns its SQL and maps between database rows and domain
//! types. Queries are runtime-checked so the crate builds without a live
//! database.

pub mod invoice;

pub use invoice::PostgresInvoiceRepository;
