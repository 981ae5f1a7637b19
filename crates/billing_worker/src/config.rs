//! Worker configuration

use serde::Deserialize;

use domain_billing::{BillingConfig, BillingError};

/// Worker configuration, read from `BILLING_`-prefixed environment variables
///
/// `BILLING_DATABASE_URL=postgres://db/billing BILLING_BATCH_SIZE=500` and so
/// on; unset keys keep their defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Database URL
    pub database_url: String,
    pub database_max_connections: u32,
    /// Seconds a query waits for a pooled connection
    pub database_acquire_timeout_secs: u64,
    /// Log level, used when `RUST_LOG` is unset
    pub log_level: String,
    /// Share of charges the simulated provider approves, 0 to 100
    pub gateway_approval_percent: u8,
    pub batch_size: u32,
    pub max_attempts: u32,
    pub retry_frequency_days: u32,
    pub billing_day_of_month: u32,
    pub initial_pass_interval_secs: u64,
    pub retry_pass_interval_secs: u64,
    pub max_concurrency: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let billing = BillingConfig::default();
        Self {
            database_url: "postgres://localhost/billing".to_string(),
            database_max_connections: 10,
            database_acquire_timeout_secs: 30,
            log_level: "info".to_string(),
            gateway_approval_percent: 80,
            batch_size: billing.batch_size,
            max_attempts: billing.max_attempts,
            retry_frequency_days: billing.retry_frequency_days,
            billing_day_of_month: billing.billing_day_of_month,
            initial_pass_interval_secs: billing.initial_pass_interval_secs,
            retry_pass_interval_secs: billing.retry_pass_interval_secs,
            max_concurrency: billing.max_concurrency,
        }
    }
}

impl WorkerConfig {
    /// Loads configuration from the process environment
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_environment(config::Environment::with_prefix("BILLING"))
    }

    /// Loads configuration from an explicit environment source
    pub fn from_environment(environment: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(environment.try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// The engine and scheduler settings
    pub fn billing(&self) -> BillingConfig {
        BillingConfig {
            batch_size: self.batch_size,
            max_attempts: self.max_attempts,
            retry_frequency_days: self.retry_frequency_days,
            billing_day_of_month: self.billing_day_of_month,
            initial_pass_interval_secs: self.initial_pass_interval_secs,
            retry_pass_interval_secs: self.retry_pass_interval_secs,
            max_concurrency: self.max_concurrency,
        }
    }

    /// Checks worker settings and the billing settings they carry
    pub fn validate(&self) -> Result<(), BillingError> {
        if self.gateway_approval_percent > 100 {
            return Err(BillingError::InvalidConfiguration(format!(
                "gateway_approval_percent must be at most 100, got {}",
                self.gateway_approval_percent
            )));
        }
        if self.database_max_connections == 0 {
            return Err(BillingError::InvalidConfiguration(
                "database_max_connections must be at least 1".to_string(),
            ));
        }
        if self.database_acquire_timeout_secs == 0 {
            return Err(BillingError::InvalidConfiguration(
                "database_acquire_timeout_secs must be at least 1".to_string(),
            ));
        }
        self.billing().validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<WorkerConfig, config::ConfigError> {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_environment(
            config::Environment::with_prefix("BILLING").source(Some(source)),
        )
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let config = load(&[]).unwrap();
        assert_eq!(config, WorkerConfig::default());
        assert_eq!(config.billing(), BillingConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides_from_environment() {
        let config = load(&[
            ("BILLING_DATABASE_URL", "postgres://db:5432/invoices"),
            ("BILLING_BATCH_SIZE", "250"),
            ("BILLING_MAX_ATTEMPTS", "4"),
            ("BILLING_BILLING_DAY_OF_MONTH", "15"),
            ("BILLING_GATEWAY_APPROVAL_PERCENT", "100"),
            ("BILLING_DATABASE_ACQUIRE_TIMEOUT_SECS", "5"),
        ])
        .unwrap();

        assert_eq!(config.database_url, "postgres://db:5432/invoices");
        let billing = config.billing();
        assert_eq!(billing.batch_size, 250);
        assert_eq!(billing.max_attempts, 4);
        assert_eq!(billing.billing_day_of_month, 15);
        assert_eq!(billing.retry_frequency_days, 1);
        assert_eq!(config.gateway_approval_percent, 100);
        assert_eq!(config.database_acquire_timeout_secs, 5);
    }

    #[test]
    fn test_validation() {
        let config = WorkerConfig {
            gateway_approval_percent: 101,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = WorkerConfig {
            database_acquire_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = WorkerConfig {
            billing_day_of_month: 31,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(BillingError::InvalidConfiguration(_))
        ));
    }
}
