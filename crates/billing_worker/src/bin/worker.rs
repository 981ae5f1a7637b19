//! Billing Worker Binary
//!
//! Connects to PostgreSQL, applies migrations and runs the billing scheduler
//! until Ctrl+C or SIGTERM.
//!
//! # Usage
//!
//! ```bash
//! BILLING_DATABASE_URL=postgres://localhost/billing cargo run --bin billing-worker
//! ```
//!
//! # Environment Variables
//!
//! * `BILLING_DATABASE_URL` - PostgreSQL connection string
//! * `BILLING_DATABASE_MAX_CONNECTIONS` - Pool size (default: 10)
//! * `BILLING_DATABASE_ACQUIRE_TIMEOUT_SECS` - Wait for a pooled connection (default: 30)
//! * `BILLING_LOG_LEVEL` - Log level when `RUST_LOG` is unset (default: info)
//! * `BILLING_GATEWAY_APPROVAL_PERCENT` - Simulated approval share (default: 80)
//! * `BILLING_BATCH_SIZE` - Invoices per batch (default: 100)
//! * `BILLING_MAX_ATTEMPTS` - Attempts before an invoice fails (default: 3)
//! * `BILLING_RETRY_FREQUENCY_DAYS` - Cool-down between attempts (default: 1)
//! * `BILLING_BILLING_DAY_OF_MONTH` - Day of the initial pass, 1 to 28 (default: 1)
//! * `BILLING_INITIAL_PASS_INTERVAL_SECS` / `BILLING_RETRY_PASS_INTERVAL_SECS` -
//!   Scheduler tick intervals (default: 3600)
//! * `BILLING_MAX_CONCURRENCY` - Concurrent charges per batch (default: 8)

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use billing_worker::{SimulatedPaymentGateway, WorkerConfig};
use core_kernel::{AdapterHealth, HealthCheckable};
use domain_billing::{BillingEngine, BillingScheduler, InvoiceService};
use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresInvoiceRepository};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let config = WorkerConfig::from_env().context("failed to load worker configuration")?;
    init_tracing(&config.log_level);
    config.validate()?;

    let billing = config.billing();
    info!(
        batch_size = billing.batch_size,
        max_attempts = billing.max_attempts,
        billing_day = billing.billing_day_of_month,
        max_concurrency = billing.max_concurrency,
        "Starting billing worker"
    );

    let pool = create_pool(
        DatabaseConfig::new(config.database_url.as_str())
            .max_connections(config.database_max_connections)
            .acquire_timeout(Duration::from_secs(config.database_acquire_timeout_secs)),
    )
    .await?;
    run_migrations(&pool).await?;

    let repository = Arc::new(PostgresInvoiceRepository::new(pool.clone()));
    let health = repository.health_check().await;
    match health.status {
        AdapterHealth::Healthy => {
            info!(adapter = %health.adapter_id, latency_ms = health.latency_ms, "Invoice store healthy")
        }
        AdapterHealth::Unhealthy => warn!(
            adapter = %health.adapter_id,
            status = ?health.status,
            message = ?health.message,
            "Invoice store not healthy"
        ),
    }

    let gateway = Arc::new(SimulatedPaymentGateway::new(config.gateway_approval_percent));
    info!(approval_percent = gateway.approval_percent(), "Using simulated payment provider");
    let engine = Arc::new(BillingEngine::new(
        InvoiceService::new(repository),
        gateway,
        billing.clone(),
    )?);

    let handle = Arc::new(BillingScheduler::new(engine, &billing)).start();

    shutdown_signal().await;
    handle.shutdown().await;
    pool.close().await;

    info!("Billing worker stopped");
    Ok(())
}

/// Initializes the tracing subscriber, preferring `RUST_LOG` over `log_level`
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Waits for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, finishing in-flight passes");
        }
        _ = terminate => {
            info!("Received SIGTERM, finishing in-flight passes");
        }
    }
}
