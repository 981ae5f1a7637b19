//! Core Kernel - Foundational types shared by the billing workspace
//!
//! This crate provides the building blocks used by every other crate:
//! - Money types with precise decimal arithmetic
//! - Typed, ordered identifiers for invoices and customers
//! - Port error and health-check vocabulary for adapters

pub mod money;
pub mod identifiers;
pub mod ports;
pub mod error;

pub use money::{Money, Currency, MoneyError};
pub use identifiers::{InvoiceId, CustomerId};
pub use ports::{PortError, DomainPort, AdapterHealth, HealthCheckResult, HealthCheckable};
pub use error::CoreError;
