//! Periodic reconciliation scheduler
//!
//! Runs the reconciliation engine on a fixed interval until stopped. A run
//! that overruns its tick skips the missed ticks instead of bursting.

use crate::reconciliation::ReconciliationEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Reconciliation scheduler
pub struct ReconciliationScheduler {
    engine: Arc<ReconciliationEngine>,
    interval: Duration,
}

/// Handle to a running scheduler
pub struct SchedulerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<u64>,
}

impl SchedulerHandle {
    /// Stop the loop and wait for it; returns the number of completed runs
    ///
    /// A run already in progress finishes first.
    pub async fn stop(self) -> u64 {
        let _ = self.stop.send(true);
        match self.task.await {
            Ok(runs) => runs,
            Err(e) => {
                warn!("Reconciliation scheduler task ended abnormally: {}", e);
                0
            }
        }
    }
}

impl ReconciliationScheduler {
    /// Create new scheduler
    pub fn new(engine: Arc<ReconciliationEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Spawn the loop; the first run happens immediately
    pub fn start(self) -> SchedulerHandle {
        let (stop, mut stopped) = watch::channel(false);
        let task = tokio::spawn(async move {
            info!(interval = ?self.interval, "Starting reconciliation scheduler");

            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut runs = 0u64;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.engine.run().await {
                            Ok(result) => {
                                runs += 1;
                                if result.errors > 0 {
                                    warn!(
                                        run_id = %result.run_id,
                                        errors = result.errors,
                                        "Reconciliation run finished with provider errors"
                                    );
                                }
                            }
                            Err(e) => warn!("Reconciliation run failed: {}", e),
                        }
                    }
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    }
                }
            }

            info!(runs, "Reconciliation scheduler stopped");
            runs
        });

        SchedulerHandle { stop, task }
    }
}
