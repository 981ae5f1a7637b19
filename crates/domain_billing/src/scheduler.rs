//! Recurring billing triggers
//!
//! The scheduler owns no billing logic. Each tick asks a [`BillingTrigger`] to
//! run a pass; the initial pass is additionally gated to the billing day of
//! the month. The tick handlers can be called directly, and [`start`] merely
//! drives them from two independent interval loops.
//!
//! [`start`]: BillingScheduler::start

use chrono::{Datelike, NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::config::BillingConfig;
use crate::engine::{BillingPassReport, BillingTrigger};

/// Fires billing passes on a cadence
pub struct BillingScheduler {
    trigger: Arc<dyn BillingTrigger>,
    billing_day_of_month: u32,
    initial_interval: Duration,
    retry_interval: Duration,
}

impl BillingScheduler {
    pub fn new(trigger: Arc<dyn BillingTrigger>, config: &BillingConfig) -> Self {
        Self {
            trigger,
            billing_day_of_month: config.billing_day_of_month,
            initial_interval: config.initial_pass_interval(),
            retry_interval: config.retry_pass_interval(),
        }
    }

    /// Returns true if `date` is the billing cycle anchor
    pub fn is_billing_day(&self, date: NaiveDate) -> bool {
        date.day() == self.billing_day_of_month
    }

    /// Handles one initial-pass tick for `today`
    ///
    /// Returns the pass report when a pass ran and completed. Pass errors are
    /// logged and swallowed so the schedule keeps running.
    pub async fn on_initial_tick(&self, today: NaiveDate) -> Option<BillingPassReport> {
        if !self.is_billing_day(today) {
            debug!(%today, billing_day = self.billing_day_of_month, "Not a billing day, skipping initial pass");
            return None;
        }
        match self.trigger.run_initial_pass().await {
            Ok(report) => Some(report),
            Err(e) => {
                error!(error = %e, "Initial billing pass aborted");
                None
            }
        }
    }

    /// Handles one retry-pass tick
    pub async fn on_retry_tick(&self) -> Option<BillingPassReport> {
        match self.trigger.run_retry_pass().await {
            Ok(report) => Some(report),
            Err(e) => {
                error!(error = %e, "Retry billing pass aborted");
                None
            }
        }
    }

    /// Spawns the initial-pass and retry-pass loops
    ///
    /// Both loops tick immediately, then on their configured intervals. A pass
    /// that overruns its interval delays the next tick rather than stacking.
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let initial = {
            let scheduler = Arc::clone(&self);
            let mut shutdown_rx = shutdown_rx.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(scheduler.initial_interval);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                info!(every = ?scheduler.initial_interval, "Initial billing loop started");

                loop {
                    tokio::select! {
                        _ = shutdown_rx.changed() => break,
                        _ = interval.tick() => {
                            scheduler.on_initial_tick(Utc::now().date_naive()).await;
                        }
                    }
                }
                info!("Initial billing loop stopped");
            })
        };

        let retry = {
            let scheduler = Arc::clone(&self);
            let mut shutdown_rx = shutdown_rx;
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(scheduler.retry_interval);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                info!(every = ?scheduler.retry_interval, "Retry billing loop started");

                loop {
                    tokio::select! {
                        _ = shutdown_rx.changed() => break,
                        _ = interval.tick() => {
                            scheduler.on_retry_tick().await;
                        }
                    }
                }
                info!("Retry billing loop stopped");
            })
        };

        SchedulerHandle {
            shutdown_tx,
            tasks: vec![initial, retry],
        }
    }
}

/// Handle to the running scheduler loops
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stops both loops, letting a pass already in flight finish first
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
    }
}
