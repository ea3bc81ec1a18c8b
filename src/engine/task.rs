//! Task polling: destinations push outgoing SMS back to the device.
//!
//! Per enabled destination:
//! 1. GET `<url>?task=send[&secret=…]`
//! 2. Parse the `{ "payload": … }` envelope; no payload means no task
//! 3. Check the payload secret against the destination's and require `task == "send"`
//! 4. Results API on → POST the uuids to `?task=sent` and send only confirmed ones;
//!    off → send everything in the payload
//!
//! Each destination gets its own [`TaskReport`]. Nothing from one poll
//! leaks into the next.

use tracing::{debug, error, info, warn};

use crate::client::task_url;
use crate::config::RelaySettings;
use crate::engine::Relay;
use crate::error::ProtocolError;
use crate::message::{
    Destination, DestinationStatus, Message, QueuedAck, TaskMessage, TaskPayload, TaskResponse,
};

/// What one destination's poll produced.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// No payload, a secret mismatch or an unrecognised task.
    NoTask(ProtocolError),
    /// Results API on: the destination confirmed `sent` out of `requested`.
    SendConfirmed { requested: usize, sent: Vec<String> },
    /// Results API off: `sent` are the uuids sent without confirmation.
    SendUnconfirmed { sent: Vec<String> },
    /// Transport or parse failure.
    Failed(String),
}

impl TaskOutcome {
    /// Human-readable error, if the poll did not produce a send.
    pub fn error(&self) -> Option<String> {
        match self {
            Self::NoTask(e) => Some(e.to_string()),
            Self::Failed(e) => Some(e.clone()),
            Self::SendConfirmed { .. } | Self::SendUnconfirmed { .. } => None,
        }
    }

    /// Uuids of messages sent as SMS.
    pub fn sent(&self) -> &[String] {
        match self {
            Self::SendConfirmed { sent, .. } | Self::SendUnconfirmed { sent } => sent,
            Self::NoTask(_) | Self::Failed(_) => &[],
        }
    }
}

/// Poll result for one destination.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskReport {
    pub destination_id: i64,
    pub url: String,
    pub outcome: TaskOutcome,
}

/// Reports from one pass over all enabled destinations, in poll order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskCycle {
    pub reports: Vec<TaskReport>,
}

impl TaskCycle {
    /// Error from the last destination polled, if any.
    pub fn last_error(&self) -> Option<String> {
        self.reports.last().and_then(|r| r.outcome.error())
    }

    pub fn sent_count(&self) -> usize {
        self.reports.iter().map(|r| r.outcome.sent().len()).sum()
    }
}

/// Accept a payload only when the secret matches and the task is `send`.
///
/// A destination without a secret accepts any payload secret.
pub fn validate_task(
    destination: &Destination,
    payload: &TaskPayload,
) -> Result<(), ProtocolError> {
    let secret_ok = destination
        .secret()
        .is_none_or(|secret| payload.secret.as_deref() == Some(secret));
    if !secret_ok {
        return Err(ProtocolError::SecretMismatch);
    }
    match payload.task() {
        "send" => Ok(()),
        other => Err(ProtocolError::UnknownTask(other.to_string())),
    }
}

fn finished_line(outcome: &TaskOutcome, url: &str) -> String {
    match outcome.error() {
        Some(error) => format!("Finished task check {error} for {url}"),
        None => format!("Finished task check for {url}"),
    }
}

impl Relay {
    /// Poll every enabled destination for outgoing-message tasks.
    ///
    /// Does nothing unless both the service and task checking are enabled.
    pub async fn perform_task(&self) -> TaskCycle {
        let settings = self.settings().await;
        if !settings.service_enabled || !settings.task_check_enabled {
            debug!("Task checking disabled");
            return TaskCycle::default();
        }

        let destinations = match self
            .deps
            .destinations
            .list_destinations(Some(DestinationStatus::Enabled))
            .await
        {
            Ok(destinations) => destinations,
            Err(e) => {
                error!(error = %e, "Failed to load destinations for task check");
                return TaskCycle::default();
            }
        };

        self.deps.activity.record("Performing task").await;

        let mut cycle = TaskCycle::default();
        for destination in &destinations {
            let url = task_url(destination, "send");
            let outcome = self.check_destination(destination, &url, &settings).await;

            self.deps
                .activity
                .record(finished_line(&outcome, &destination.url))
                .await;

            cycle.reports.push(TaskReport {
                destination_id: destination.id,
                url,
                outcome,
            });
        }

        info!(
            destinations = cycle.reports.len(),
            sent = cycle.sent_count(),
            "Task check complete"
        );
        cycle
    }

    async fn check_destination(
        &self,
        destination: &Destination,
        url: &str,
        settings: &RelaySettings,
    ) -> TaskOutcome {
        let raw = match self.deps.client.poll_task(url).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(url = %destination.url, error = %e, "Task poll failed");
                self.deps
                    .activity
                    .record(format!(
                        "Task crashed: {e} response: {}",
                        e.body().unwrap_or_default()
                    ))
                    .await;
                return TaskOutcome::Failed(e.to_string());
            }
        };

        self.deps
            .activity
            .record(format!("HTTP client response: {raw}"))
            .await;

        let response: TaskResponse = match serde_json::from_str(&raw) {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %destination.url, error = %e, "Task response is not valid JSON");
                self.deps
                    .activity
                    .record(format!("Task crashed: {e} response: {raw}"))
                    .await;
                return TaskOutcome::Failed(e.to_string());
            }
        };

        let Some(payload) = response.payload else {
            debug!(url = %destination.url, "No task");
            self.deps.activity.record("No task").await;
            return TaskOutcome::NoTask(ProtocolError::NoTask);
        };
        self.deps
            .activity
            .record(format!(
                "Task check response: task={} messages={}",
                payload.task(),
                payload.messages.len()
            ))
            .await;

        if let Err(e) = validate_task(destination, &payload) {
            info!(url = %destination.url, error = %e, "Task rejected");
            return TaskOutcome::NoTask(e);
        }

        let messages: Vec<Message> = payload
            .messages
            .into_iter()
            .map(TaskMessage::into_message)
            .collect();

        if settings.message_results_api_enabled {
            self.send_confirmed(destination, messages, settings).await
        } else {
            let sent = self.send_all(messages, settings).await;
            TaskOutcome::SendUnconfirmed { sent }
        }
    }

    /// Ask the destination which queued uuids to send, then send those.
    async fn send_confirmed(
        &self,
        destination: &Destination,
        messages: Vec<Message>,
        settings: &RelaySettings,
    ) -> TaskOutcome {
        let requested = messages.len();
        let ack = QueuedAck::from_messages(&messages);

        let response = match self.deps.client.post_ack(destination, &ack).await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %destination.url, error = %e, "Queued-message ack failed");
                self.deps
                    .activity
                    .record(format!(
                        "Task crashed: {e} response: {}",
                        e.body().unwrap_or_default()
                    ))
                    .await;
                return TaskOutcome::Failed(e.to_string());
            }
        };

        if !response.success {
            info!(url = %destination.url, "Destination did not confirm queued messages");
        }

        let confirmed: Vec<Message> = messages
            .into_iter()
            .filter(|m| ack.contains(&m.uuid) && response.confirms(&m.uuid))
            .collect();
        debug!(requested, confirmed = confirmed.len(), "Queued messages confirmed");

        let sent = self.send_all(confirmed, settings).await;
        TaskOutcome::SendConfirmed { requested, sent }
    }

    async fn send_all(&self, messages: Vec<Message>, settings: &RelaySettings) -> Vec<String> {
        self.dispatch_each(messages, None, settings)
            .await
            .into_iter()
            .filter_map(|(uuid, sent)| sent.then_some(uuid))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(task: &str, secret: Option<&str>) -> TaskPayload {
        TaskPayload {
            task: Some(task.to_string()),
            secret: secret.map(str::to_string),
            ..TaskPayload::default()
        }
    }

    #[test]
    fn accepts_send_with_matching_secret() {
        let d = Destination::new("d", "https://d.example").with_secret("abc");
        assert_eq!(validate_task(&d, &payload("send", Some("abc"))), Ok(()));
    }

    #[test]
    fn rejects_secret_mismatch() {
        let d = Destination::new("d", "https://d.example").with_secret("abc");
        assert_eq!(
            validate_task(&d, &payload("send", Some("xyz"))),
            Err(ProtocolError::SecretMismatch)
        );
        assert_eq!(
            validate_task(&d, &payload("send", None)),
            Err(ProtocolError::SecretMismatch)
        );
    }

    #[test]
    fn destination_without_secret_accepts_any() {
        let d = Destination::new("d", "https://d.example");
        assert_eq!(validate_task(&d, &payload("send", Some("whatever"))), Ok(()));
        assert_eq!(validate_task(&d, &payload("send", None)), Ok(()));
    }

    #[test]
    fn rejects_unknown_task() {
        let d = Destination::new("d", "https://d.example");
        assert_eq!(
            validate_task(&d, &payload("result", None)),
            Err(ProtocolError::UnknownTask("result".into()))
        );
        assert_eq!(
            validate_task(&d, &TaskPayload::default()),
            Err(ProtocolError::UnknownTask(String::new()))
        );
    }

    #[test]
    fn finished_line_mentions_error_only_when_present() {
        let ok = TaskOutcome::SendUnconfirmed { sent: Vec::new() };
        assert_eq!(
            finished_line(&ok, "https://a"),
            "Finished task check for https://a"
        );

        let failed = TaskOutcome::NoTask(ProtocolError::SecretMismatch);
        assert_eq!(
            finished_line(&failed, "https://a"),
            "Finished task check No task: secret mismatch for https://a"
        );
    }

    #[test]
    fn cycle_reports_last_error() {
        let mut cycle = TaskCycle::default();
        assert_eq!(cycle.last_error(), None);

        cycle.reports.push(TaskReport {
            destination_id: 1,
            url: "https://a?task=send".into(),
            outcome: TaskOutcome::NoTask(ProtocolError::NoTask),
        });
        cycle.reports.push(TaskReport {
            destination_id: 2,
            url: "https://b?task=send".into(),
            outcome: TaskOutcome::SendUnconfirmed {
                sent: vec!["u1".into()],
            },
        });
        assert_eq!(cycle.last_error(), None);
        assert_eq!(cycle.sent_count(), 1);
        assert_eq!(cycle.reports[0].outcome.error().as_deref(), Some("No task"));
    }
}
