//! Background batch evaluation loop for `serve`.
//!
//! The scheduler serializes runs itself; a tick that lands while a run is
//! still going is skipped rather than queued.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use carewatch_rules::BatchScheduler;

/// Spawn the evaluation loop. Returns `None` when `interval_secs` is 0.
pub fn spawn(scheduler: Arc<BatchScheduler>, interval_secs: u64) -> Option<JoinHandle<()>> {
    if interval_secs == 0 {
        info!("periodic evaluation disabled; trigger runs via POST /evaluate");
        return None;
    }
    Some(tokio::spawn(run_loop(scheduler, Duration::from_secs(interval_secs))))
}

async fn run_loop(scheduler: Arc<BatchScheduler>, period: Duration) {
    info!(interval_secs = period.as_secs(), "periodic evaluation started");
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        match scheduler.evaluate_all().await {
            Ok(report) => info!(
                alerts_created = report.alerts_created,
                alerts_skipped = report.alerts_skipped,
                errors = report.errors,
                duration_ms = report.duration_ms,
                "periodic evaluation finished"
            ),
            // A failed run is retried on the next tick.
            Err(e) => error!(error = %e, "periodic evaluation failed"),
        }
    }
}
