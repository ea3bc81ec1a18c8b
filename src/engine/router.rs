//! Inbound routing, pending sync and outgoing dispatch.
//!
//! Flow for one inbound message:
//! 1. Service gate, then optional auto-reply from the device
//! 2. Connectivity gate: offline → queue as pending
//! 3. Phone lists → blacklisted or not whitelisted messages stop here
//! 4. Plan (message, destination) pairs, then attempt each pair
//! 5. Resolve: all delivered → archive, any failure → retry accounting

use std::collections::HashSet;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::RelaySettings;
use crate::engine::Relay;
use crate::filter::{self, PhoneVerdict};
use crate::message::{
    Destination, DestinationStatus, Dispatch, FilterRule, Message, MessageType, TaskMessage,
};

/// Result of delivering one message to one destination.
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt {
    /// Delivered. Carries any replies returned in the POST response.
    Delivered(Vec<TaskMessage>),
    Failed,
    /// Keyword filter enforced and not matched; not counted as an attempt.
    Skipped,
}

impl Attempt {
    pub fn delivered(&self) -> bool {
        matches!(self, Self::Delivered(_))
    }
}

/// One message and the destinations it should be offered to.
#[derive(Debug)]
pub struct PlannedDelivery<'a> {
    pub message: &'a Message,
    pub destinations: Vec<&'a Destination>,
}

/// Compute the eligible (message, destination) pairs before dispatching.
///
/// Messages are deduplicated by uuid and destinations by id, so a pair is
/// never attempted twice in one episode. Messages rejected by the phone
/// lists get no entry at all.
pub fn plan_deliveries<'a>(
    messages: &'a [Message],
    destinations: &'a [Destination],
    settings: &RelaySettings,
    rules: &[FilterRule],
) -> Vec<PlannedDelivery<'a>> {
    let mut seen_destinations = HashSet::new();
    let targets: Vec<&Destination> = destinations
        .iter()
        .filter(|d| d.is_enabled() && seen_destinations.insert(d.id))
        .collect();

    let mut seen_messages = HashSet::new();
    messages
        .iter()
        .filter(|m| seen_messages.insert(m.uuid.clone()))
        .filter(|m| {
            let verdict = filter::phone_verdict(
                &m.from,
                settings.whitelist_enabled,
                settings.blacklist_enabled,
                rules,
            );
            if !verdict.admits() {
                debug!(uuid = %m.uuid, verdict = verdict.label(), "Message filtered out");
            }
            verdict.admits()
        })
        .map(|message| PlannedDelivery {
            message,
            destinations: targets.clone(),
        })
        .collect()
}

/// Tally of one message's delivery episode.
#[derive(Debug, Default)]
struct Episode {
    attempted: usize,
    failed: usize,
    last: Option<bool>,
}

impl Relay {
    /// Route a freshly received SMS to every eligible destination.
    ///
    /// Returns false when the service is off, the device is offline (the
    /// message is queued), or the sender is blacklisted. Returns true once
    /// routing ran, whatever the individual attempts did.
    pub async fn route_inbound(&self, message: Message) -> bool {
        let settings = self.settings().await;
        if !settings.service_enabled {
            debug!(uuid = %message.uuid, "Service disabled, ignoring inbound message");
            return false;
        }

        info!(uuid = %message.uuid, from = %message.from, "Routing inbound message");

        if settings.auto_reply_enabled {
            self.send_auto_reply(&message, &settings).await;
        }

        if !self.deps.connectivity.is_connected().await {
            info!(uuid = %message.uuid, "No connectivity, queueing message");
            self.queue(&message).await;
            return false;
        }

        let (destinations, rules) = match self.routing_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(uuid = %message.uuid, error = %e, "Failed to load routing rules");
                self.queue(&message).await;
                return false;
            }
        };

        let verdict = filter::phone_verdict(
            &message.from,
            settings.whitelist_enabled,
            settings.blacklist_enabled,
            &rules,
        );
        match verdict {
            PhoneVerdict::Blacklisted => {
                info!(uuid = %message.uuid, from = %message.from, "Sender is blacklisted");
                return false;
            }
            PhoneVerdict::NotWhitelisted => {
                info!(uuid = %message.uuid, from = %message.from, "Sender is not whitelisted");
                return true;
            }
            PhoneVerdict::Admit => {}
        }

        let messages = [message];
        let plan = plan_deliveries(&messages, &destinations, &settings, &rules);
        for planned in &plan {
            if planned.destinations.is_empty() {
                info!(uuid = %planned.message.uuid, "No enabled destinations");
                continue;
            }
            let episode = self
                .deliver_to_all(planned.message, &planned.destinations, &settings)
                .await;
            self.resolve_episode(planned.message, &episode, &settings).await;
        }
        true
    }

    /// Re-attempt delivery of queued messages.
    ///
    /// With a uuid, only that message is synced. Messages the phone lists
    /// reject, or that every destination skips on keywords, are deleted.
    /// Returns the result of the last attempt made, or false when nothing
    /// was attempted.
    pub async fn sync_pending(&self, uuid: Option<&str>) -> bool {
        let settings = self.settings().await;

        let messages = match uuid {
            Some(uuid) => match self.deps.messages.fetch_by_uuid(uuid).await {
                Ok(Some(m)) if m.message_type == MessageType::Pending => vec![m],
                Ok(Some(m)) => {
                    warn!(uuid = %uuid, message_type = %m.message_type, "Message is not pending");
                    return false;
                }
                Ok(None) => {
                    warn!(uuid = %uuid, "No such message to sync");
                    return false;
                }
                Err(e) => {
                    error!(uuid = %uuid, error = %e, "Failed to fetch message");
                    return false;
                }
            },
            None => match self.deps.messages.fetch_all_by_type(MessageType::Pending).await {
                Ok(messages) => messages,
                Err(e) => {
                    error!(error = %e, "Failed to fetch pending messages");
                    return false;
                }
            },
        };

        if messages.is_empty() {
            debug!("No pending messages to sync");
            return false;
        }

        let (destinations, rules) = match self.routing_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(error = %e, "Failed to load routing rules");
                return false;
            }
        };

        info!(count = messages.len(), "Syncing pending messages");

        let plan = plan_deliveries(&messages, &destinations, &settings, &rules);

        // Queued while offline, before the phone lists ran.
        let admitted: HashSet<&str> = plan.iter().map(|p| p.message.uuid.as_str()).collect();
        let mut rejected = HashSet::new();
        for message in &messages {
            let uuid = message.uuid.as_str();
            if admitted.contains(uuid) || !rejected.insert(uuid) {
                continue;
            }
            let verdict = filter::phone_verdict(
                &message.from,
                settings.whitelist_enabled,
                settings.blacklist_enabled,
                &rules,
            );
            self.discard(message, verdict.label()).await;
        }

        let mut last = false;
        for planned in &plan {
            if planned.destinations.is_empty() {
                debug!(uuid = %planned.message.uuid, "No enabled destinations, leaving pending");
                continue;
            }
            let episode = self
                .deliver_to_all(planned.message, &planned.destinations, &settings)
                .await;
            if let Some(result) = episode.last {
                last = result;
            }
            if episode.attempted == 0 {
                self.discard(planned.message, "keyword filter").await;
            } else {
                self.resolve_episode(planned.message, &episode, &settings).await;
            }
        }
        last
    }

    /// Send outgoing messages as SMS.
    ///
    /// Each message is marked as a task first. With a destination, delivery
    /// goes through the same attempt path as routing (keyword stage included).
    /// Returns true only when every message was sent.
    pub async fn dispatch_outgoing(
        &self,
        messages: Vec<Message>,
        destination: Option<&Destination>,
    ) -> bool {
        let settings = self.settings().await;
        self.dispatch_each(messages, destination, &settings)
            .await
            .iter()
            .all(|(_, sent)| *sent)
    }

    /// Dispatch and report `(uuid, sent)` per message actually tried.
    pub(crate) async fn dispatch_each(
        &self,
        messages: Vec<Message>,
        destination: Option<&Destination>,
        settings: &RelaySettings,
    ) -> Vec<(String, bool)> {
        let rules = if settings.filter_outgoing_tasks {
            match self.deps.filters.list_filters(None).await {
                Ok(rules) => rules,
                Err(e) => {
                    error!(error = %e, "Failed to load filters, not sending outgoing messages");
                    return Vec::new();
                }
            }
        } else {
            Vec::new()
        };

        let mut seen = HashSet::new();
        let mut results = Vec::with_capacity(messages.len());
        for mut message in messages {
            if !seen.insert(message.uuid.clone()) {
                continue;
            }
            message.message_type = MessageType::Task;

            if settings.filter_outgoing_tasks {
                let verdict = filter::phone_verdict(
                    message.recipient(),
                    settings.whitelist_enabled,
                    settings.blacklist_enabled,
                    &rules,
                );
                if !verdict.admits() {
                    info!(
                        uuid = %message.uuid,
                        to = %message.recipient(),
                        verdict = verdict.label(),
                        "Outgoing message filtered out"
                    );
                    continue;
                }
            }

            let sent = match destination {
                Some(destination) => match self.attempt(&message, destination, settings).await {
                    Attempt::Skipped => continue,
                    attempt => attempt.delivered(),
                },
                None => self.deps.sms.send(&message, false).await,
            };

            if sent {
                self.archive(&message).await;
            } else {
                self.process_retries(&message, settings).await;
            }
            results.push((message.uuid, sent));
        }
        results
    }

    /// Deliver one message to one destination.
    ///
    /// Pending messages are POSTed; anything else goes out as SMS.
    pub async fn attempt(
        &self,
        message: &Message,
        destination: &Destination,
        settings: &RelaySettings,
    ) -> Attempt {
        if !filter::passes_keyword_filter(&message.body, destination) {
            if settings.enforce_keyword_filter {
                debug!(
                    uuid = %message.uuid,
                    destination = %destination.title,
                    "Keyword filter not matched, skipping"
                );
                return Attempt::Skipped;
            }
            debug!(
                uuid = %message.uuid,
                destination = %destination.title,
                "Keyword filter not matched"
            );
        }

        match message.dispatch() {
            Dispatch::PendingDelivery(message) => {
                match self
                    .deps
                    .client
                    .post_message(destination, message, &settings.device_id)
                    .await
                {
                    Ok(receipt) => {
                        debug!(uuid = %message.uuid, url = %destination.url, "Message delivered");
                        Attempt::Delivered(receipt.replies)
                    }
                    Err(e) => {
                        warn!(
                            uuid = %message.uuid,
                            url = %destination.url,
                            error = %e,
                            "Delivery failed"
                        );
                        Attempt::Failed
                    }
                }
            }
            Dispatch::TaskCommand(message) => {
                if self.deps.sms.send(message, false).await {
                    Attempt::Delivered(Vec::new())
                } else {
                    warn!(uuid = %message.uuid, to = %message.recipient(), "SMS send failed");
                    Attempt::Failed
                }
            }
        }
    }

    /// Count a failed episode. Below the attempt limit the message is queued
    /// again; at the limit (or for an outgoing SMS) it is marked failed.
    pub async fn process_retries(&self, message: &Message, settings: &RelaySettings) {
        let mut retry = message.clone();
        retry.retries = retry.retries.saturating_add(1);

        let exhausted = matches!(message.dispatch(), Dispatch::TaskCommand(_))
            || (settings.max_delivery_attempts > 0
                && retry.retries >= settings.max_delivery_attempts);

        if !exhausted {
            warn!(uuid = %retry.uuid, retries = retry.retries, "Delivery failed, queued for retry");
            if let Err(e) = self.deps.messages.enqueue(&retry).await {
                error!(uuid = %retry.uuid, error = %e, "Failed to queue message for retry");
            }
            return;
        }

        retry.message_type = MessageType::Failed;
        error!(uuid = %retry.uuid, retries = retry.retries, "Giving up on message");
        if let Err(e) = self.deps.messages.save(&retry).await {
            error!(uuid = %retry.uuid, error = %e, "Failed to mark message failed");
        }
        self.deps
            .activity
            .record(format!("Failed to deliver message {}", retry.uuid))
            .await;
    }

    async fn deliver_to_all(
        &self,
        message: &Message,
        destinations: &[&Destination],
        settings: &RelaySettings,
    ) -> Episode {
        let mut episode = Episode::default();
        let mut replies = Vec::new();

        for destination in destinations {
            let attempt = self.attempt(message, destination, settings).await;
            if attempt == Attempt::Skipped {
                continue;
            }
            episode.attempted += 1;
            episode.last = Some(attempt.delivered());
            match attempt {
                Attempt::Delivered(r) => replies.extend(r),
                _ => episode.failed += 1,
            }
        }

        if settings.reply_from_server_enabled && !replies.is_empty() {
            info!(uuid = %message.uuid, count = replies.len(), "Sending replies from server");
            let replies = replies.into_iter().map(TaskMessage::into_message).collect();
            self.dispatch_each(replies, None, settings).await;
        }
        episode
    }

    async fn resolve_episode(
        &self,
        message: &Message,
        episode: &Episode,
        settings: &RelaySettings,
    ) {
        if episode.attempted == 0 {
            debug!(uuid = %message.uuid, "No delivery attempted");
        } else if episode.failed == 0 {
            self.archive(message).await;
        } else {
            self.process_retries(message, settings).await;
        }
    }

    /// Move a delivered message to the sent archive.
    async fn archive(&self, message: &Message) {
        let mut sent = message.clone();
        sent.message_type = MessageType::Sent;
        if let Err(e) = self.deps.messages.save(&sent).await {
            error!(uuid = %sent.uuid, error = %e, "Failed to archive message");
        }

        match message.message_type {
            MessageType::Task => {
                self.deps
                    .activity
                    .record(format!("Processed task: {}", message.body))
                    .await;
            }
            _ => self.deps.sms.delete_from_inbox(message).await,
        }
    }

    /// Drop a queued message that no destination will take.
    async fn discard(&self, message: &Message, reason: &str) {
        info!(
            uuid = %message.uuid,
            from = %message.from,
            reason,
            "Discarding pending message"
        );
        if let Err(e) = self.deps.messages.delete(&message.uuid).await {
            error!(uuid = %message.uuid, error = %e, "Failed to discard message");
        }
        self.deps
            .activity
            .record(format!("Discarded message {} ({reason})", message.uuid))
            .await;
    }

    async fn queue(&self, message: &Message) {
        if let Err(e) = self.deps.messages.enqueue(message).await {
            error!(uuid = %message.uuid, error = %e, "Failed to queue message");
        }
    }

    async fn send_auto_reply(&self, message: &Message, settings: &RelaySettings) {
        let reply = Message::outgoing(
            Uuid::new_v4().to_string(),
            message.from.clone(),
            settings.auto_reply_text.clone(),
        );
        if self.deps.sms.send(&reply, false).await {
            self.deps.activity.record("Auto response sent").await;
        } else {
            warn!(to = %message.from, "Auto response failed");
        }
    }

    async fn routing_snapshot(
        &self,
    ) -> crate::error::Result<(Vec<Destination>, Vec<FilterRule>)> {
        let destinations = self
            .deps
            .destinations
            .list_destinations(Some(DestinationStatus::Enabled))
            .await?;
        let rules = self.deps.filters.list_filters(None).await?;
        Ok((destinations, rules))
    }
}
