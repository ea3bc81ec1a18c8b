//! JSON shapes exchanged with destinations.
//!
//! Task poll and POST responses share one envelope:
//!
//! ```json
//! { "payload": { "task": "send", "secret": "...",
//!                "messages": [ { "uuid": "...", "to": "...", "message": "..." } ] } }
//! ```
//!
//! A missing `payload` means "no task".

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::types::Message;

/// Top-level response body from a destination.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResponse {
    #[serde(default)]
    pub payload: Option<TaskPayload>,
}

/// Command payload inside a [`TaskResponse`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPayload {
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub messages: Vec<TaskMessage>,
}

impl TaskPayload {
    pub fn task(&self) -> &str {
        self.task.as_deref().unwrap_or_default()
    }
}

/// One outgoing SMS a destination asks the device to send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    #[serde(default = "generate_uuid")]
    pub uuid: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub message: String,
}

fn generate_uuid() -> String {
    Uuid::new_v4().to_string()
}

impl TaskMessage {
    pub fn into_message(self) -> Message {
        Message::outgoing(self.uuid, self.to, self.message)
    }
}

/// Uuids the device asks a destination to confirm before sending.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueuedAck {
    pub messages: Vec<String>,
}

impl QueuedAck {
    pub fn from_messages(messages: &[Message]) -> Self {
        Self {
            messages: messages.iter().map(|m| m.uuid.clone()).collect(),
        }
    }

    pub fn contains(&self, uuid: &str) -> bool {
        self.messages.iter().any(|m| m == uuid)
    }
}

/// A destination's answer to a [`QueuedAck`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AckResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub uuids: Vec<String>,
}

impl AckResponse {
    /// True only when the response succeeded and lists `uuid`.
    pub fn confirms(&self, uuid: &str) -> bool {
        self.success && self.uuids.iter().any(|u| u == uuid)
    }
}

/// What a successful message POST returned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostReceipt {
    /// Messages the destination wants sent back as SMS.
    pub replies: Vec<TaskMessage>,
}

impl PostReceipt {
    /// Build from a 2xx response body. Bodies that are empty or not JSON
    /// carry no replies.
    pub fn from_body(body: &str) -> Self {
        let replies = serde_json::from_str::<TaskResponse>(body)
            .ok()
            .and_then(|r| r.payload)
            .map(|p| p.messages)
            .unwrap_or_default();
        Self { replies }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::types::MessageType;

    #[test]
    fn parses_send_task() {
        let raw = r#"{"payload":{"task":"send","secret":"abc","messages":[{"uuid":"u1","to":"+1555","message":"hi"}]}}"#;
        let resp: TaskResponse = serde_json::from_str(raw).unwrap();
        let payload = resp.payload.unwrap();
        assert_eq!(payload.task(), "send");
        assert_eq!(payload.secret.as_deref(), Some("abc"));
        assert_eq!(payload.messages.len(), 1);
        let msg = payload.messages[0].clone().into_message();
        assert_eq!(msg.uuid, "u1");
        assert_eq!(msg.recipient(), "+1555");
        assert_eq!(msg.body, "hi");
        assert_eq!(msg.message_type, MessageType::Task);
    }

    #[test]
    fn absent_payload_means_no_task() {
        let resp: TaskResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.payload.is_none());
        let resp: TaskResponse = serde_json::from_str(r#"{"payload":null}"#).unwrap();
        assert!(resp.payload.is_none());
    }

    #[test]
    fn absent_secret_and_task_default_to_none() {
        let resp: TaskResponse = serde_json::from_str(r#"{"payload":{"messages":[]}}"#).unwrap();
        let payload = resp.payload.unwrap();
        assert!(payload.secret.is_none());
        assert_eq!(payload.task(), "");
    }

    #[test]
    fn task_message_without_uuid_gets_one() {
        let m: TaskMessage = serde_json::from_str(r#"{"to":"+1","message":"x"}"#).unwrap();
        assert!(Uuid::parse_str(&m.uuid).is_ok());
    }

    #[test]
    fn queued_ack_serializes_as_messages_array() {
        let msgs = vec![
            Message::outgoing("u1", "+1", "a"),
            Message::outgoing("u2", "+2", "b"),
        ];
        let ack = QueuedAck::from_messages(&msgs);
        let json = serde_json::to_value(&ack).unwrap();
        assert_eq!(json, serde_json::json!({"messages": ["u1", "u2"]}));
        assert!(ack.contains("u2"));
        assert!(!ack.contains("u3"));
    }

    #[test]
    fn ack_confirms_only_on_success() {
        let ok: AckResponse = serde_json::from_str(r#"{"success":true,"uuids":["u1"]}"#).unwrap();
        assert!(ok.confirms("u1"));
        assert!(!ok.confirms("u2"));

        let failed: AckResponse =
            serde_json::from_str(r#"{"success":false,"uuids":["u1"]}"#).unwrap();
        assert!(!failed.confirms("u1"));
    }

    #[test]
    fn post_receipt_tolerates_non_json_bodies() {
        assert!(PostReceipt::from_body("OK").replies.is_empty());
        assert!(PostReceipt::from_body("").replies.is_empty());
        let receipt = PostReceipt::from_body(
            r#"{"payload":{"success":true,"messages":[{"uuid":"r1","to":"+1","message":"thanks"}]}}"#,
        );
        assert_eq!(receipt.replies.len(), 1);
        assert_eq!(receipt.replies[0].uuid, "r1");
    }
}
