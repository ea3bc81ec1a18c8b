//! Delivery client: the HTTP side of the relay.

pub mod http;

use async_trait::async_trait;
use tracing::warn;

use crate::error::DeliveryError;
use crate::message::{AckResponse, Destination, Message, PostReceipt, QueuedAck};

pub use http::HttpDeliveryClient;

/// Talks to one destination per call. Timeouts are the implementation's concern.
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    /// POST one inbound message. Succeeds on a 2xx response.
    async fn post_message(
        &self,
        destination: &Destination,
        message: &Message,
        device_id: &str,
    ) -> Result<PostReceipt, DeliveryError>;

    /// Fetch the raw body of a task poll URL.
    async fn poll_task(&self, url: &str) -> Result<String, DeliveryError>;

    /// Ask the destination to confirm queued task uuids.
    async fn post_ack(
        &self,
        destination: &Destination,
        ack: &QueuedAck,
    ) -> Result<AckResponse, DeliveryError>;
}

/// `<url>?task=<task>[&secret=<urlencoded secret>]`.
pub fn task_url(destination: &Destination, task: &str) -> String {
    let mut url = format!("{}?task={}", destination.url, task);
    if let Some(secret) = destination.secret() {
        url.push_str("&secret=");
        url.push_str(&encode_secret(secret));
    }
    url
}

/// Percent-encode a secret for a query string, falling back to the raw
/// secret if the encoded form is unusable.
fn encode_secret(secret: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(secret.as_bytes()).collect();
    if encoded.is_empty() {
        warn!("Secret encoding produced an empty string, using raw secret");
        return secret.to_string();
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_url_without_secret() {
        let d = Destination::new("ops", "https://ops.example/sms");
        assert_eq!(task_url(&d, "send"), "https://ops.example/sms?task=send");
    }

    #[test]
    fn task_url_encodes_secret() {
        let d = Destination::new("ops", "https://ops.example/sms").with_secret("a b&c=d");
        assert_eq!(
            task_url(&d, "send"),
            "https://ops.example/sms?task=send&secret=a+b%26c%3Dd"
        );
    }

    #[test]
    fn empty_secret_is_omitted() {
        let d = Destination::new("ops", "https://ops.example/sms").with_secret("");
        assert_eq!(task_url(&d, "sent"), "https://ops.example/sms?task=sent");
    }
}
