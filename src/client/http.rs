//! reqwest-backed delivery client speaking the SMSSync HTTP protocol.
//!
//! - Inbound messages: form-encoded POST to the destination URL
//! - Task poll: GET `<url>?task=send[&secret=…]`
//! - Queued-ack: JSON POST `{ "messages": [uuid, …] }` to `<url>?task=sent[&secret=…]`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::client::{DeliveryClient, task_url};
use crate::error::DeliveryError;
use crate::message::{AckResponse, Destination, Message, PostReceipt, QueuedAck};

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP delivery client.
pub struct HttpDeliveryClient {
    client: Client,
}

impl HttpDeliveryClient {
    /// Create a client with the default request timeout.
    pub fn new() -> Result<Self, DeliveryError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Transport(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Read the body of a response, turning non-2xx statuses into errors.
    async fn read_body(response: reqwest::Response) -> Result<String, DeliveryError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(DeliveryError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl DeliveryClient for HttpDeliveryClient {
    async fn post_message(
        &self,
        destination: &Destination,
        message: &Message,
        device_id: &str,
    ) -> Result<PostReceipt, DeliveryError> {
        let sent_timestamp = message.sent_at.timestamp_millis().to_string();
        let form = [
            ("secret", destination.secret().unwrap_or_default()),
            ("from", message.from.as_str()),
            ("message", message.body.as_str()),
            ("message_id", message.uuid.as_str()),
            ("sent_timestamp", sent_timestamp.as_str()),
            ("sent_to", message.to.as_deref().unwrap_or_default()),
            ("device_id", device_id),
        ];

        debug!(url = %destination.url, uuid = %message.uuid, "Posting message");
        let response = self
            .client
            .post(&destination.url)
            .form(&form)
            .send()
            .await?;
        let body = Self::read_body(response).await?;
        Ok(PostReceipt::from_body(&body))
    }

    async fn poll_task(&self, url: &str) -> Result<String, DeliveryError> {
        debug!(url = %url, "Polling for task");
        let response = self.client.get(url).send().await?;
        Self::read_body(response).await
    }

    async fn post_ack(
        &self,
        destination: &Destination,
        ack: &QueuedAck,
    ) -> Result<AckResponse, DeliveryError> {
        let url = task_url(destination, "sent");
        debug!(url = %url, count = ack.messages.len(), "Posting queued-message ack");

        let response = self.client.post(&url).json(ack).send().await?;
        let body = Self::read_body(response).await?;
        serde_json::from_str(&body).map_err(|e| DeliveryError::Parse {
            reason: e.to_string(),
            body,
        })
    }
}
