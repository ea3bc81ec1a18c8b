use std::sync::Arc;
use std::sync::atomic::Ordering;

use sms_relay::activity::ActivityLog;
use sms_relay::client::HttpDeliveryClient;
use sms_relay::config::RelayConfig;
use sms_relay::device::{ConsoleDevice, TcpProbe};
use sms_relay::engine::{Relay, RelayDeps};
use sms_relay::store::{DestinationStore, LibSqlBackend};
use sms_relay::{logging, scheduler};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RelayConfig::from_env()?;
    let _logging = logging::init(config.log_dir.as_deref())?;

    eprintln!("📨 SMS Relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   Device: {}", config.settings.device_id);
    eprintln!("   Type `<from> <message>` and press Enter to receive an SMS.\n");

    // ── Database ─────────────────────────────────────────────────────────
    let db = Arc::new(LibSqlBackend::new_local(&config.db_path).await?);

    if let Some(seed) = &config.seed_destination {
        let existing = db.list_destinations(None).await?;
        if existing.iter().any(|d| d.url == seed.url) {
            info!(url = %seed.url, "Seed destination already registered");
        } else {
            let id = db.add_destination(seed).await?;
            info!(id, url = %seed.url, "Registered seed destination");
        }
    }

    // ── Engine ───────────────────────────────────────────────────────────
    let device = Arc::new(ConsoleDevice::new());
    let deps = RelayDeps {
        messages: db.clone(),
        destinations: db.clone(),
        filters: db.clone(),
        client: Arc::new(HttpDeliveryClient::new()?),
        sms: device.clone(),
        connectivity: Arc::new(TcpProbe::new(
            config.connectivity_probe.clone(),
            config.connectivity_timeout,
        )),
        activity: Arc::new(ActivityLog::new()),
    };
    let relay = Arc::new(Relay::new(config.settings.clone(), deps));

    // ── Background timers ────────────────────────────────────────────────
    let (task_handle, task_shutdown) =
        scheduler::spawn_task_checker(Arc::clone(&relay), config.task_check_interval);
    let (sync_handle, sync_shutdown) =
        scheduler::spawn_pending_sync(Arc::clone(&relay), config.pending_sync_interval);

    // ── Inbound loop ─────────────────────────────────────────────────────
    let mut inbound = device.start();
    loop {
        tokio::select! {
            Some(message) = inbound.recv() => {
                let uuid = message.uuid.clone();
                if !relay.route_inbound(message).await {
                    warn!(uuid = %uuid, "Inbound message not routed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            else => break,
        }
    }

    task_shutdown.store(true, Ordering::Relaxed);
    sync_shutdown.store(true, Ordering::Relaxed);
    task_handle.abort();
    sync_handle.abort();
    info!("SMS relay stopped");
    Ok(())
}
