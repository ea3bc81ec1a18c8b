//! Device-side collaborators: the SMS radio, the inbox, and network reachability.

pub mod console;
pub mod probe;

use async_trait::async_trait;

use crate::message::Message;

pub use console::ConsoleDevice;
pub use probe::TcpProbe;

/// Sends SMS and manages the device inbox.
#[async_trait]
pub trait SmsGateway: Send + Sync {
    /// Send `message.body` to `message.recipient()`. Returns whether the
    /// transport accepted it.
    async fn send(&self, message: &Message, suppress_delivery_report: bool) -> bool;

    /// Remove a relayed inbound message from the device inbox.
    async fn delete_from_inbox(&self, message: &Message);
}

/// Reports whether the network is reachable right now.
#[async_trait]
pub trait Connectivity: Send + Sync {
    async fn is_connected(&self) -> bool;
}
