//! Core relay types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::filter;

// ── Message ─────────────────────────────────────────────────────────

/// Lifecycle state of a message.
///
/// A message never goes back to `Pending` from `Sent` or `Failed` unless it
/// is explicitly re-queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Inbound SMS awaiting delivery to a destination.
    Pending,
    /// Outgoing SMS commanded by a destination.
    Task,
    /// Delivered and archived.
    Sent,
    /// Gave up after exhausting retries, or an outgoing send failed.
    Failed,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Task => "task",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "task" => Ok(Self::Task),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown message type: {other}")),
        }
    }
}

/// A short text message moving through the relay.
///
/// `uuid` is the identity: it is never regenerated once assigned, and every
/// store operation is keyed by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub uuid: String,
    pub message_type: MessageType,
    pub body: String,
    /// Origin address (phone number) of an inbound message.
    pub from: String,
    /// Recipient address of an outgoing message.
    pub to: Option<String>,
    pub sent_at: DateTime<Utc>,
    /// Failed delivery episodes so far.
    pub retries: u32,
}

impl Message {
    /// A freshly received inbound SMS.
    pub fn inbound(from: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            message_type: MessageType::Pending,
            body: body.into(),
            from: from.into(),
            to: None,
            sent_at: Utc::now(),
            retries: 0,
        }
    }

    /// An outgoing SMS commanded by a destination.
    pub fn outgoing(
        uuid: impl Into<String>,
        to: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        let to = to.into();
        Self {
            uuid: uuid.into(),
            message_type: MessageType::Task,
            body: body.into(),
            from: to.clone(),
            to: Some(to),
            sent_at: Utc::now(),
            retries: 0,
        }
    }

    /// Address an SMS for this message goes to.
    pub fn recipient(&self) -> &str {
        self.to.as_deref().unwrap_or(&self.from)
    }

    /// How this message is delivered to a destination.
    pub fn dispatch(&self) -> Dispatch<'_> {
        match self.message_type {
            MessageType::Pending => Dispatch::PendingDelivery(self),
            _ => Dispatch::TaskCommand(self),
        }
    }
}

/// Delivery target chosen by message type.
#[derive(Debug, Clone, Copy)]
pub enum Dispatch<'a> {
    /// HTTP POST to the destination.
    PendingDelivery(&'a Message),
    /// Outgoing SMS through the device.
    TaskCommand(&'a Message),
}

// ── Destination ─────────────────────────────────────────────────────

/// Whether a destination takes part in routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationStatus {
    Enabled,
    Disabled,
}

impl DestinationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
        }
    }
}

impl FromStr for DestinationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enabled" => Ok(Self::Enabled),
            "disabled" => Ok(Self::Disabled),
            other => Err(format!("unknown destination status: {other}")),
        }
    }
}

/// A configured remote web service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    /// Store-assigned id (0 before insertion).
    pub id: i64,
    pub title: String,
    pub url: String,
    /// Shared token the destination must echo back with every task.
    pub secret: Option<String>,
    /// Comma-separated keywords or regular expressions.
    pub keywords: String,
    pub keyword_filter: bool,
    pub status: DestinationStatus,
}

impl Destination {
    /// An enabled destination with no secret and no keyword filter.
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: 0,
            title: title.into(),
            url: url.into(),
            secret: None,
            keywords: String::new(),
            keyword_filter: false,
            status: DestinationStatus::Enabled,
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Set keywords and turn keyword filtering on.
    pub fn with_keywords(mut self, keywords: impl Into<String>) -> Self {
        self.keywords = keywords.into();
        self.keyword_filter = true;
        self
    }

    pub fn with_status(mut self, status: DestinationStatus) -> Self {
        self.status = status;
        self
    }

    /// The configured secret, treating an empty string as none.
    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref().filter(|s| !s.is_empty())
    }

    pub fn is_enabled(&self) -> bool {
        self.status == DestinationStatus::Enabled
    }

    /// Keywords this destination filters on; empty when filtering is off.
    pub fn active_keywords(&self) -> Vec<&str> {
        if self.keyword_filter {
            filter::parse_keywords(&self.keywords)
        } else {
            Vec::new()
        }
    }
}

// ── Filter rules ────────────────────────────────────────────────────

/// Which phone-number list a rule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListKind {
    Whitelist,
    Blacklist,
}

impl ListKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Whitelist => "whitelist",
            Self::Blacklist => "blacklist",
        }
    }
}

impl FromStr for ListKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "whitelist" => Ok(Self::Whitelist),
            "blacklist" => Ok(Self::Blacklist),
            other => Err(format!("unknown list kind: {other}")),
        }
    }
}

/// A phone number on the whitelist or blacklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRule {
    pub id: i64,
    pub phone_number: String,
    pub kind: ListKind,
}

impl FilterRule {
    pub fn new(phone_number: impl Into<String>, kind: ListKind) -> Self {
        Self {
            id: 0,
            phone_number: phone_number.into(),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_message_is_pending_and_posts_over_http() {
        let msg = Message::inbound("+15550001", "hello");
        assert_eq!(msg.message_type, MessageType::Pending);
        assert_eq!(msg.recipient(), "+15550001");
        assert!(matches!(msg.dispatch(), Dispatch::PendingDelivery(_)));
        assert!(Uuid::parse_str(&msg.uuid).is_ok());
    }

    #[test]
    fn outgoing_message_is_sent_as_sms() {
        let msg = Message::outgoing("u1", "+15550002", "reply");
        assert_eq!(msg.message_type, MessageType::Task);
        assert_eq!(msg.recipient(), "+15550002");
        assert!(matches!(msg.dispatch(), Dispatch::TaskCommand(_)));
    }

    #[test]
    fn non_pending_types_dispatch_as_sms() {
        let mut msg = Message::inbound("+1", "x");
        msg.message_type = MessageType::Sent;
        assert!(matches!(msg.dispatch(), Dispatch::TaskCommand(_)));
    }

    #[test]
    fn message_type_round_trips_through_str() {
        for t in [
            MessageType::Pending,
            MessageType::Task,
            MessageType::Sent,
            MessageType::Failed,
        ] {
            assert_eq!(t.as_str().parse::<MessageType>().unwrap(), t);
        }
        assert!("archived".parse::<MessageType>().is_err());
    }

    #[test]
    fn empty_secret_counts_as_none() {
        let d = Destination::new("ops", "https://ops.example").with_secret("");
        assert!(d.secret().is_none());
        let d = d.with_secret("abc");
        assert_eq!(d.secret(), Some("abc"));
    }

    #[test]
    fn keywords_ignored_when_filter_disabled() {
        let mut d = Destination::new("ops", "https://ops.example").with_keywords("alert,down");
        assert_eq!(d.active_keywords(), vec!["alert", "down"]);
        d.keyword_filter = false;
        assert!(d.active_keywords().is_empty());
    }
}
