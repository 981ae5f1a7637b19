//! Billing Domain - Invoice Collection Engine
//!
//! This crate collects payment for outstanding invoices. It finds invoices
//! eligible for a charge, attempts each one through a payment gateway, and
//! advances a per-invoice retry state machine:
//!
//! - **Initial pass**: every `PENDING` invoice gets its first charge attempt
//! - **Retry pass**: every `RETRY` invoice whose cool-down has elapsed is
//!   charged again until it is paid or runs out of attempts
//!
//! Both passes page through the store by invoice id, charge each page with
//! bounded concurrency, and never let one invoice's failure affect another.
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_billing::{BillingConfig, BillingEngine, BillingScheduler, InvoiceService};
//!
//! let invoices = InvoiceService::new(repository);
//! let engine = Arc::new(BillingEngine::new(invoices, gateway, config.clone())?);
//!
//! // Run a pass directly
//! let report = engine.run_initial_billing_pass().await?;
//!
//! // Or on a schedule
//! let handle = Arc::new(BillingScheduler::new(engine, &config)).start();
//! ```

pub mod invoice;
pub mod retry;
pub mod config;
pub mod ports;
pub mod service;
pub mod engine;
pub mod scheduler;
pub mod adapters;
pub mod error;

pub use invoice::{Invoice, InvoiceStatus, InvoiceUpdate, BatchCursor};
pub use retry::{RetryPolicy, RetryDecision};
pub use config::BillingConfig;
pub use ports::{InvoiceRepository, PaymentGateway};
pub use service::InvoiceService;
pub use engine::{BillingEngine, BillingPass, BillingPassReport, BillingTrigger, InvoiceOutcome};
pub use scheduler::{BillingScheduler, SchedulerHandle};
pub use adapters::InMemoryInvoiceRepository;
pub use error::BillingError;
