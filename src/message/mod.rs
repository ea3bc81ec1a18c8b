//! Relay domain model: messages, destinations, filter rules and the task
//! protocol's wire format.

pub mod types;
pub mod wire;

pub use types::{
    Destination, DestinationStatus, Dispatch, FilterRule, ListKind, Message, MessageType,
};
pub use wire::{AckResponse, PostReceipt, QueuedAck, TaskMessage, TaskPayload, TaskResponse};
