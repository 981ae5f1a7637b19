//! Billing engine configuration

use serde::Deserialize;
use std::time::Duration;

use crate::error::BillingError;

/// Longest accepted cool-down between retry attempts
pub const MAX_RETRY_FREQUENCY_DAYS: u32 = 3650;

/// Longest accepted initial-pass interval; a longer tick could step over the
/// billing day
pub const MAX_INITIAL_PASS_INTERVAL_SECS: u64 = 86_400;

/// Tunables for the billing engine and its scheduler
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    /// Invoices fetched per batch
    pub batch_size: u32,
    /// Charge attempts allowed before an invoice is marked failed
    pub max_attempts: u32,
    /// Days an invoice in retry must wait after its last attempt
    pub retry_frequency_days: u32,
    /// Day of the month on which the initial billing pass runs
    pub billing_day_of_month: u32,
    /// Seconds between initial-pass ticks
    pub initial_pass_interval_secs: u64,
    /// Seconds between retry-pass ticks
    pub retry_pass_interval_secs: u64,
    /// Invoices charged concurrently within one batch
    pub max_concurrency: usize,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_attempts: 3,
            retry_frequency_days: 1,
            billing_day_of_month: 1,
            initial_pass_interval_secs: 3600,
            retry_pass_interval_secs: 3600,
            max_concurrency: 8,
        }
    }
}

impl BillingConfig {
    /// Checks that every value is usable
    ///
    /// The billing day is capped at 28 so that the anchor exists in every month.
    pub fn validate(&self) -> Result<(), BillingError> {
        if self.batch_size == 0 {
            return Err(invalid("batch_size must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(invalid("max_attempts must be at least 1"));
        }
        if !(1..=28).contains(&self.billing_day_of_month) {
            return Err(invalid("billing_day_of_month must be between 1 and 28"));
        }
        if self.retry_frequency_days > MAX_RETRY_FREQUENCY_DAYS {
            return Err(invalid("retry_frequency_days must be at most 3650"));
        }
        if self.initial_pass_interval_secs == 0 || self.retry_pass_interval_secs == 0 {
            return Err(invalid("scheduler intervals must be at least one second"));
        }
        if self.initial_pass_interval_secs > MAX_INITIAL_PASS_INTERVAL_SECS {
            return Err(invalid("initial_pass_interval_secs must be at most 86400"));
        }
        if self.max_concurrency == 0 {
            return Err(invalid("max_concurrency must be at least 1"));
        }
        Ok(())
    }

    pub fn initial_pass_interval(&self) -> Duration {
        Duration::from_secs(self.initial_pass_interval_secs)
    }

    pub fn retry_pass_interval(&self) -> Duration {
        Duration::from_secs(self.retry_pass_interval_secs)
    }
}

fn invalid(message: &str) -> BillingError {
    BillingError::InvalidConfiguration(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(BillingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_values() {
        let cases = [
            BillingConfig { batch_size: 0, ..Default::default() },
            BillingConfig { max_attempts: 0, ..Default::default() },
            BillingConfig { max_concurrency: 0, ..Default::default() },
            BillingConfig { retry_pass_interval_secs: 0, ..Default::default() },
        ];
        for config in cases {
            assert!(matches!(
                config.validate(),
                Err(BillingError::InvalidConfiguration(_))
            ));
        }
    }

    #[test]
    fn test_billing_day_bounds() {
        let late = BillingConfig { billing_day_of_month: 31, ..Default::default() };
        assert!(late.validate().is_err());

        let zero = BillingConfig { billing_day_of_month: 0, ..Default::default() };
        assert!(zero.validate().is_err());

        let ok = BillingConfig { billing_day_of_month: 28, ..Default::default() };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_upper_bounds() {
        let slow_retry = BillingConfig { retry_frequency_days: 200_000_000, ..Default::default() };
        assert!(matches!(
            slow_retry.validate(),
            Err(BillingError::InvalidConfiguration(_))
        ));

        let daily_tick = BillingConfig {
            initial_pass_interval_secs: MAX_INITIAL_PASS_INTERVAL_SECS,
            retry_frequency_days: MAX_RETRY_FREQUENCY_DAYS,
            ..Default::default()
        };
        assert!(daily_tick.validate().is_ok());

        let two_day_tick = BillingConfig {
            initial_pass_interval_secs: 2 * MAX_INITIAL_PASS_INTERVAL_SECS,
            ..Default::default()
        };
        assert!(two_day_tick.validate().is_err());
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let config: BillingConfig =
            serde_json::from_str(r#"{"batch_size": 25, "max_attempts": 4}"#).unwrap();
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.max_attempts, 4);
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.retry_pass_interval(), Duration::from_secs(3600));
    }
}
