//! Billing domain errors

use thiserror::Error;

use core_kernel::{InvoiceId, PortError};

use crate::invoice::InvoiceStatus;

/// Errors that can occur in the billing domain
///
/// Only `Repository` failures raised while fetching a batch leave the engine;
/// the per-invoice variants are recorded on the pass report and logged.
#[derive(Debug, Error)]
pub enum BillingError {
    /// Invoice not found
    #[error("Invoice not found: {0}")]
    InvoiceNotFound(InvoiceId),

    /// The stored status differs from the one just written
    #[error("Failed to update invoice '{id}' status to '{requested}', store reports '{persisted}'")]
    InvoiceStatusUpdateFailed {
        id: InvoiceId,
        requested: InvoiceStatus,
        persisted: InvoiceStatus,
    },

    /// The payment gateway raised an error instead of answering
    #[error("Payment gateway failed while charging invoice '{id}': {reason}")]
    PaymentGatewayFailure {
        id: InvoiceId,
        reason: String,
    },

    /// The invoice store failed
    #[error("Repository error: {0}")]
    Repository(#[from] PortError),

    /// Configuration is unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl BillingError {
    /// Maps a port error for a single-row operation, surfacing not-found as
    /// [`BillingError::InvoiceNotFound`]
    pub fn from_port(id: InvoiceId, error: PortError) -> Self {
        if error.is_not_found() {
            BillingError::InvoiceNotFound(id)
        } else {
            BillingError::Repository(error)
        }
    }
}
