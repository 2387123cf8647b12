//! Fixed-rate cycle scheduler.
//!
//! Drives the keeper at a fixed period measured start-to-start. Cycles are
//! serialized: when a cycle overruns the period, the next one starts
//! immediately afterwards instead of running concurrently. Shutdown lets an
//! in-flight cycle finish before the loop exits, so a message is never left
//! mid-extension.

use crate::keeper::VisibilityKeeper;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::info;

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;

/// Periodic driver for the keeper's poll cycle
pub struct Scheduler {
    keeper: Arc<VisibilityKeeper>,
    period: Duration,
    shutdown: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(
        keeper: Arc<VisibilityKeeper>,
        period: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            keeper,
            period,
            shutdown,
        }
    }

    /// Run until shutdown is signalled.
    ///
    /// The first cycle runs immediately; subsequent cycles start one period
    /// after the previous cycle STARTED (fixed-rate). Shutdown is only
    /// observed between cycles.
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Burst);

        info!(
            queue_url = %self.keeper.queue_url(),
            period_ms = self.period.as_millis() as u64,
            "Scheduler started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.keeper.run_cycle().await;
                }
                result = self.shutdown.changed() => {
                    // A dropped sender also means shutdown
                    if result.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(
            queue_url = %self.keeper.queue_url(),
            "Scheduler stopped; in-flight cycle completed"
        );
    }
}
