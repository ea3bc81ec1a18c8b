//! Relay engine: routes inbound SMS to destinations and runs the task
//! polling protocol that brings outgoing SMS back.
//!
//! `router` owns inbound routing, pending-message sync and outgoing dispatch.
//! `task` owns the per-destination poll / confirm / dispatch cycle.
//!
//! The engine never holds a store transaction across a network call, and keeps
//! no per-destination state between calls: every poll result is returned to the
//! caller as a value.

pub mod router;
pub mod task;

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::activity::ActivityLog;
use crate::client::DeliveryClient;
use crate::config::RelaySettings;
use crate::device::{Connectivity, SmsGateway};
use crate::store::{DestinationStore, FilterStore, MessageStore};

pub use task::{TaskCycle, TaskOutcome, TaskReport};

/// Collaborators the engine is built from.
#[derive(Clone)]
pub struct RelayDeps {
    pub messages: Arc<dyn MessageStore>,
    pub destinations: Arc<dyn DestinationStore>,
    pub filters: Arc<dyn FilterStore>,
    pub client: Arc<dyn DeliveryClient>,
    pub sms: Arc<dyn SmsGateway>,
    pub connectivity: Arc<dyn Connectivity>,
    pub activity: Arc<ActivityLog>,
}

/// The routing/dispatch engine.
pub struct Relay {
    settings: RwLock<RelaySettings>,
    deps: RelayDeps,
}

impl Relay {
    pub fn new(settings: RelaySettings, deps: RelayDeps) -> Self {
        Self {
            settings: RwLock::new(settings),
            deps,
        }
    }

    /// Snapshot of the current settings. Each routing episode works from one
    /// snapshot so a concurrent update cannot change rules mid-episode.
    pub async fn settings(&self) -> RelaySettings {
        self.settings.read().await.clone()
    }

    pub async fn update_settings(&self, update: impl FnOnce(&mut RelaySettings)) {
        let mut settings = self.settings.write().await;
        update(&mut settings);
    }

    pub async fn is_connected(&self) -> bool {
        self.deps.connectivity.is_connected().await
    }
}
