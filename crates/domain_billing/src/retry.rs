//! Retry policy
//!
//! Decides where an invoice goes after a charge attempt. Every attempt counts,
//! successful or not, and the ceiling is checked against the incremented count.

use serde::{Deserialize, Serialize};

use crate::invoice::InvoiceStatus;

/// The status and attempt count to persist after a charge attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryDecision {
    pub status: InvoiceStatus,
    pub attempt_count: u32,
}

/// Ceiling on charge attempts per invoice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    /// Classifies an attempt made on an invoice that had `attempts_before`
    /// prior attempts
    pub fn classify(&self, attempts_before: u32, charge_succeeded: bool) -> RetryDecision {
        classify(attempts_before, self.max_attempts, charge_succeeded)
    }
}

/// Pure form of [`RetryPolicy::classify`]
pub fn classify(attempts_before: u32, max_attempts: u32, charge_succeeded: bool) -> RetryDecision {
    let attempt_count = attempts_before.saturating_add(1);

    let status = if charge_succeeded {
        InvoiceStatus::Paid
    } else if attempt_count >= max_attempts {
        InvoiceStatus::Failed
    } else {
        InvoiceStatus::Retry
    };

    RetryDecision { status, attempt_count }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_is_paid() {
        let decision = classify(0, 3, true);
        assert_eq!(decision.status, InvoiceStatus::Paid);
        assert_eq!(decision.attempt_count, 1);
    }

    #[test]
    fn test_last_permitted_attempt_fails() {
        let decision = RetryPolicy::new(3).classify(2, false);
        assert_eq!(decision.status, InvoiceStatus::Failed);
        assert_eq!(decision.attempt_count, 3);
    }

    #[test]
    fn test_under_ceiling_retries() {
        let decision = RetryPolicy::new(4).classify(2, false);
        assert_eq!(decision.status, InvoiceStatus::Retry);
        assert_eq!(decision.attempt_count, 3);
    }

    #[test]
    fn test_single_attempt_policy_fails_immediately() {
        assert_eq!(classify(0, 1, false).status, InvoiceStatus::Failed);
    }
}
