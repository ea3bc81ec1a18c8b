//! Store traits the relay engine consumes.
//!
//! Each operation is a short, independent transaction. The engine never holds
//! one open across a network call.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::message::{Destination, DestinationStatus, FilterRule, ListKind, Message, MessageType};

/// Durable queue of messages, keyed by uuid.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Queue a message for a later delivery attempt.
    ///
    /// Stored as `Pending` with its uuid and retry count unchanged; an
    /// existing row with the same uuid is replaced.
    async fn enqueue(&self, message: &Message) -> Result<(), DatabaseError>;

    /// Insert or replace a message exactly as given.
    async fn save(&self, message: &Message) -> Result<(), DatabaseError>;

    async fn fetch_by_uuid(&self, uuid: &str) -> Result<Option<Message>, DatabaseError>;

    /// All messages of one type, oldest first.
    async fn fetch_all_by_type(
        &self,
        message_type: MessageType,
    ) -> Result<Vec<Message>, DatabaseError>;

    /// Remove a message. Returns whether a row existed.
    async fn delete(&self, uuid: &str) -> Result<bool, DatabaseError>;
}

/// Configured destinations.
#[async_trait]
pub trait DestinationStore: Send + Sync {
    /// Destinations in insertion order, optionally limited to one status.
    async fn list_destinations(
        &self,
        status: Option<DestinationStatus>,
    ) -> Result<Vec<Destination>, DatabaseError>;

    /// Insert a destination. Returns the assigned id.
    async fn add_destination(&self, destination: &Destination) -> Result<i64, DatabaseError>;
}

/// Whitelist/blacklist phone-number rules.
#[async_trait]
pub trait FilterStore: Send + Sync {
    async fn list_filters(&self, kind: Option<ListKind>) -> Result<Vec<FilterRule>, DatabaseError>;

    /// Insert a rule. Adding the same number to the same list twice is a no-op
    /// returning the existing id.
    async fn add_filter(&self, rule: &FilterRule) -> Result<i64, DatabaseError>;
}
