//! Simulated payment provider
//!
//! Stands in for a real provider until one is wired up. Whether an invoice is
//! approved depends only on its id, so reruns of a pass see the same answers.

use async_trait::async_trait;
use tracing::debug;

use core_kernel::{DomainPort, PortError};
use domain_billing::{Invoice, PaymentGateway};

/// Spreads consecutive ids evenly over the 100 approval buckets
const BUCKET_MULTIPLIER: u64 = 2_654_435_761;

/// Approves a fixed share of charges, chosen by invoice id
#[derive(Debug, Clone, Copy)]
pub struct SimulatedPaymentGateway {
    approval_percent: u8,
}

impl SimulatedPaymentGateway {
    /// Creates a gateway approving `approval_percent` of invoices, capped at 100
    pub fn new(approval_percent: u8) -> Self {
        Self {
            approval_percent: approval_percent.min(100),
        }
    }

    pub fn approval_percent(&self) -> u8 {
        self.approval_percent
    }

    fn bucket(invoice: &Invoice) -> u64 {
        invoice
            .id
            .value()
            .unsigned_abs()
            .wrapping_mul(BUCKET_MULTIPLIER)
            % 100
    }
}

impl DomainPort for SimulatedPaymentGateway {}

#[async_trait]
impl PaymentGateway for SimulatedPaymentGateway {
    async fn charge(&self, invoice: &Invoice) -> Result<bool, PortError> {
        let approved = Self::bucket(invoice) < u64::from(self.approval_percent);
        debug!(
            invoice_id = %invoice.id,
            amount = %invoice.amount,
            approved,
            "Simulated charge"
        );
        Ok(approved)
    }
}
