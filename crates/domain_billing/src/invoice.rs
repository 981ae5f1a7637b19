//! Invoice model
//!
//! An invoice moves through a small state machine driven exclusively by the
//! billing engine:
//!
//! ```text
//! PENDING ──► PAID | RETRY | FAILED
//! RETRY   ──► PAID | RETRY | FAILED
//! PAID, FAILED: terminal
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{CoreError, CustomerId, InvoiceId, Money};

/// Invoice status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InvoiceStatus {
    /// Created and never charged
    Pending,
    /// At least one charge attempt was declined; eligible again after the cool-down
    Retry,
    /// Charged successfully
    Paid,
    /// Declined on the final permitted attempt
    Failed,
}

impl InvoiceStatus {
    /// Returns the storage representation of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "PENDING",
            InvoiceStatus::Retry => "RETRY",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Failed => "FAILED",
        }
    }

    /// Terminal statuses admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceStatus::Paid | InvoiceStatus::Failed)
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(InvoiceStatus::Pending),
            "RETRY" => Ok(InvoiceStatus::Retry),
            "PAID" => Ok(InvoiceStatus::Paid),
            "FAILED" => Ok(InvoiceStatus::Failed),
            other => Err(CoreError::validation(format!(
                "Unknown invoice status '{}'",
                other
            ))),
        }
    }
}

/// An invoice awaiting or having received a payment attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    /// Storage-assigned identifier
    pub id: InvoiceId,
    /// Customer being billed
    pub customer_id: CustomerId,
    /// Amount to collect
    pub amount: Money,
    /// Current status
    pub status: InvoiceStatus,
    /// When the most recent charge attempt was made
    pub last_payment_date: Option<DateTime<Utc>>,
    /// Number of charge attempts made so far
    pub attempt_count: u32,
}

impl Invoice {
    /// Creates a never-charged invoice
    pub fn new(id: InvoiceId, customer_id: CustomerId, amount: Money) -> Self {
        Self {
            id,
            customer_id,
            amount,
            status: InvoiceStatus::Pending,
            last_payment_date: None,
            attempt_count: 0,
        }
    }

    /// Sets the status
    pub fn with_status(mut self, status: InvoiceStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets the attempt history
    pub fn with_attempts(mut self, attempt_count: u32, last_payment_date: DateTime<Utc>) -> Self {
        self.attempt_count = attempt_count;
        self.last_payment_date = Some(last_payment_date);
        self
    }

    /// Returns true if the last attempt happened at or before `cutoff`.
    ///
    /// An invoice that was never attempted has no cool-down to wait out.
    pub fn cooled_down_since(&self, cutoff: DateTime<Utc>) -> bool {
        self.last_payment_date.map_or(true, |last| last <= cutoff)
    }

    /// Applies an update in place
    pub fn apply(&mut self, update: &InvoiceUpdate) {
        self.status = update.status;
        self.last_payment_date = Some(update.last_payment_date);
        self.attempt_count = update.attempt_count;
    }
}

/// The complete set of fields written back after a charge attempt
///
/// Repositories must persist all three fields together or not at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceUpdate {
    pub status: InvoiceStatus,
    pub last_payment_date: DateTime<Utc>,
    pub attempt_count: u32,
}

/// Exclusive lower bound for paginated invoice reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchCursor {
    /// Read from the lowest id
    #[default]
    Start,
    /// Read ids strictly greater than this one
    After(InvoiceId),
}

impl BatchCursor {
    /// Returns true if `id` lies beyond the cursor
    pub fn admits(&self, id: InvoiceId) -> bool {
        match self {
            BatchCursor::Start => true,
            BatchCursor::After(after) => id > *after,
        }
    }

    /// Returns the bound as an optional id
    pub fn lower_bound(&self) -> Option<InvoiceId> {
        match self {
            BatchCursor::Start => None,
            BatchCursor::After(id) => Some(*id),
        }
    }

    /// Moves the cursor past the highest id in `batch`.
    ///
    /// Leaves the cursor unchanged for an empty batch.
    pub fn advance_past(&mut self, batch: &[Invoice]) {
        if let Some(max) = batch.iter().map(|invoice| invoice.id).max() {
            *self = BatchCursor::After(max);
        }
    }
}

impl fmt::Display for BatchCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchCursor::Start => f.write_str("start"),
            BatchCursor::After(id) => write!(f, "after {}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use core_kernel::Currency;
    use rust_decimal_macros::dec;

    fn invoice(id: i64) -> Invoice {
        Invoice::new(
            InvoiceId::new(id),
            CustomerId::new(1),
            Money::new(dec!(10), Currency::EUR),
        )
    }

    #[test]
    fn test_new_invoice_is_pending_and_untouched() {
        let inv = invoice(1);
        assert_eq!(inv.status, InvoiceStatus::Pending);
        assert_eq!(inv.attempt_count, 0);
        assert!(inv.last_payment_date.is_none());
    }

    #[test]
    fn test_status_text_round_trip() {
        for status in [
            InvoiceStatus::Pending,
            InvoiceStatus::Retry,
            InvoiceStatus::Paid,
            InvoiceStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<InvoiceStatus>().unwrap(), status);
        }
        assert!("paid".parse::<InvoiceStatus>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(InvoiceStatus::Paid.is_terminal());
        assert!(InvoiceStatus::Failed.is_terminal());
        assert!(!InvoiceStatus::Pending.is_terminal());
        assert!(!InvoiceStatus::Retry.is_terminal());
    }

    #[test]
    fn test_cool_down() {
        let now = Utc::now();
        let inv = invoice(1).with_attempts(1, now - Duration::days(3));

        assert!(inv.cooled_down_since(now - Duration::days(2)));
        assert!(!inv.cooled_down_since(now - Duration::days(4)));
        assert!(invoice(2).cooled_down_since(now));
    }

    #[test]
    fn test_cursor_advances_to_highest_id() {
        let mut cursor = BatchCursor::Start;
        assert!(cursor.admits(InvoiceId::new(1)));

        cursor.advance_past(&[invoice(4), invoice(9), invoice(6)]);
        assert_eq!(cursor, BatchCursor::After(InvoiceId::new(9)));
        assert!(!cursor.admits(InvoiceId::new(9)));
        assert!(cursor.admits(InvoiceId::new(10)));

        cursor.advance_past(&[]);
        assert_eq!(cursor.lower_bound(), Some(InvoiceId::new(9)));
    }

    #[test]
    fn test_apply_update() {
        let mut inv = invoice(3);
        let at = Utc::now();
        inv.apply(&InvoiceUpdate {
            status: InvoiceStatus::Retry,
            last_payment_date: at,
            attempt_count: 1,
        });

        assert_eq!(inv.status, InvoiceStatus::Retry);
        assert_eq!(inv.attempt_count, 1);
        assert_eq!(inv.last_payment_date, Some(at));
    }
}
