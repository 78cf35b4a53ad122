use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::jobs::JobRunner;

/// Starts the detection and receipt loops on independent intervals. Each tick runs on the
/// blocking pool; a slow tick delays only its own loop.
pub(crate) fn spawn(
    runner: Arc<JobRunner>,
    detect_every: Duration,
    receipts_every: Duration,
) -> (JoinHandle<()>, JoinHandle<()>) {
    let detect_runner = runner.clone();
    let detect = tokio::spawn(async move {
        let mut ticker = interval(detect_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // first tick fires immediately; wait one full period after startup
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let runner = detect_runner.clone();
            match tokio::task::spawn_blocking(move || runner.detect_to(Utc::now())).await {
                Ok(report) => debug!(
                    events = report.detection.events_emitted,
                    deliveries = report.dispatch.deliveries_created,
                    "scheduled detect-to finished"
                ),
                Err(error) => warn!(%error, "scheduled detect-to aborted"),
            }
        }
    });

    let receipts = tokio::spawn(async move {
        let mut ticker = interval(receipts_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let runner = runner.clone();
            match tokio::task::spawn_blocking(move || runner.push_receipts(Utc::now())).await {
                Ok(report) => debug!(
                    checked = report.checked,
                    delivered = report.delivered,
                    "scheduled push-receipts finished"
                ),
                Err(error) => warn!(%error, "scheduled push-receipts aborted"),
            }
        }
    });

    (detect, receipts)
}
