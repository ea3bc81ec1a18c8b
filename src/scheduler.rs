//! Background timers: periodic task checks and pending-message sync.
//!
//! Each spawner returns a `JoinHandle` and a shutdown flag. Set the flag to
//! stop the loop at its next tick.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::engine::Relay;

/// Poll destinations for tasks every `interval`.
pub fn spawn_task_checker(
    relay: Arc<Relay>,
    interval: Duration,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!("Task checker started, checking every {}s", interval.as_secs());
        let mut tick = tokio::time::interval(interval);

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Task checker shutting down");
                return;
            }

            let cycle = relay.perform_task().await;
            if let Some(error) = cycle.last_error() {
                debug!(error = %error, "Task check finished with error");
            }
        }
    });

    (handle, shutdown_flag)
}

/// Re-attempt queued messages every `interval` while the service is on and
/// the device is online.
pub fn spawn_pending_sync(
    relay: Arc<Relay>,
    interval: Duration,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!("Pending sync started, syncing every {}s", interval.as_secs());
        let mut tick = tokio::time::interval(interval);

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Pending sync shutting down");
                return;
            }

            if !relay.settings().await.service_enabled {
                continue;
            }
            if !relay.is_connected().await {
                debug!("Offline, skipping pending sync");
                continue;
            }
            relay.sync_pending(None).await;
        }
    });

    (handle, shutdown_flag)
}
