//! Background task that runs the subscription poll on a fixed interval.

use std::sync::Arc;

use tokio::time::{Duration, Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

use crate::watcher::monitor::SubscriptionMonitor;

/// Start the subscription monitor background task.
///
/// The first cycle runs after `initial_delay`, then every `period`. A cycle
/// that overruns the period delays the next one instead of bunching up.
pub fn start_monitor(
    monitor: Arc<SubscriptionMonitor>,
    period: Duration,
    initial_delay: Duration,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + initial_delay, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        log::info!(
            "Subscription monitor started (interval: {}s, first check in {}s)",
            period.as_secs(),
            initial_delay.as_secs()
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                result = monitor.run_poll_cycle() => {
                    if let Err(e) = result {
                        log::error!("Subscription cycle failed: {}", e);
                    }
                }
            }
        }
        log::info!("Subscription monitor stopped");
    })
}
