//! Adapters for billing domain ports
//!
//! - **InMemoryInvoiceRepository**: process-local invoice store for tests and
//!   embedding; the worker always runs against PostgreSQL
//!
//! The PostgreSQL adapter lives in `infra_db`.

pub mod in_memory;

pub use in_memory::InMemoryInvoiceRepository;
