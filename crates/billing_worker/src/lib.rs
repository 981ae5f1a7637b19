//! Billing Worker
//!
//! Runtime wiring for the invoice collection engine: configuration loading and
//! the payment provider adapter used by the `billing-worker` binary.

pub mod config;
pub mod gateway;

pub use config::WorkerConfig;
pub use gateway::SimulatedPaymentGateway;
