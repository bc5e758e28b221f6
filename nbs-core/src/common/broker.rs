/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::*;
use uuid::Uuid;

use crate::common::{Inbox, Outbox};
use crate::config::CONFIG;
use crate::message::{Message, TransportError};
use crate::traits::BrokerLink;

/// Identifies one subscription within the broker's registry.
pub type SubscriptionId = Uuid;

/// A live subscription: drain `inbox` to receive matching messages.
///
/// Dropping the subscription does not deregister it; the broker notices the
/// closed channel on the next matching publish and removes the entry then.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub pattern: String,
    pub inbox: Inbox,
}

/// A broker that manages topic subscriptions and fans published messages out
/// to subscribers.
///
/// The deployed system speaks to an external MQTT broker; this in-process
/// implementation keeps the same observable semantics (topic routing, the
/// trailing `#` wildcard, independent delivery per subscriber) behind the
/// [`BrokerLink`] seam.
#[derive(Default, Debug, Clone)]
pub struct MessageBroker {
    /// A thread-safe map of subscribers, keyed by subscription pattern.
    ///
    /// Each entry holds the outboxes of every subscriber registered under
    /// that pattern, keyed by subscription id.
    subscribers: Subscribers,
}

type Subscribers = Arc<DashMap<String, DashMap<SubscriptionId, Outbox>>>;

impl MessageBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscription with the configured channel capacity.
    pub fn subscribe(&self, pattern: &str) -> Subscription {
        self.subscribe_with_capacity(pattern, CONFIG.broker.channel_capacity)
    }

    /// Registers a subscription with an explicit channel capacity.
    #[instrument(skip(self))]
    pub fn subscribe_with_capacity(&self, pattern: &str, capacity: usize) -> Subscription {
        let (outbox, inbox) = mpsc::channel(capacity);
        let id = Uuid::new_v4();
        self.subscribers
            .entry(pattern.to_string())
            .or_default()
            .insert(id, outbox);
        trace!(pattern, %id, "registered subscription");
        Subscription {
            id,
            pattern: pattern.to_string(),
            inbox,
        }
    }

    /// Removes one subscription. A no-op if it is already gone.
    pub fn unsubscribe(&self, pattern: &str, id: SubscriptionId) {
        if let Some(entry) = self.subscribers.get(pattern) {
            entry.remove(&id);
        }
    }

    /// Delivers a message to every subscriber whose pattern matches `topic`.
    ///
    /// Delivery never blocks on a slow subscriber: a full channel drops that
    /// subscriber's copy with a warning, and a closed channel deregisters the
    /// subscriber.
    #[instrument(skip(self, message), fields(id = message.id()))]
    pub fn publish(&self, topic: &str, message: Message) {
        let message = message.with_topic(topic);
        let mut delivered = 0usize;
        for entry in self.subscribers.iter() {
            if !topic_matches(entry.key(), topic) {
                continue;
            }
            let mut closed = Vec::new();
            for sub in entry.value().iter() {
                match sub.value().try_send(message.clone()) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(
                            topic,
                            subscription = %sub.key(),
                            "subscriber channel full, dropping message for it"
                        );
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        closed.push(*sub.key());
                    }
                }
            }
            for id in closed {
                trace!(pattern = entry.key(), %id, "removing closed subscription");
                entry.value().remove(&id);
            }
        }
        if delivered == 0 {
            trace!(topic, "no subscribers for topic, message dropped");
        }
    }

    /// Drops every subscription, closing all subscriber channels.
    pub fn stop(&self) {
        info!("shutting down message broker");
        self.subscribers.clear();
    }
}

#[async_trait]
impl BrokerLink for MessageBroker {
    async fn publish(&self, topic: &str, message: Message) -> Result<(), TransportError> {
        MessageBroker::publish(self, topic, message);
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> Subscription {
        MessageBroker::subscribe(self, pattern)
    }

    fn unsubscribe(&self, pattern: &str, id: SubscriptionId) {
        MessageBroker::unsubscribe(self, pattern, id);
    }
}

/// Whether a subscription pattern matches a concrete topic. Patterns are
/// either literal topics or end in a `#` wildcard segment covering the
/// remainder of the topic tree.
pub(crate) fn topic_matches(pattern: &str, topic: &str) -> bool {
    if pattern == topic || pattern == "#" {
        return true;
    }
    match pattern.strip_suffix("/#") {
        Some(prefix) => {
            topic == prefix
                || (topic.len() > prefix.len()
                    && topic.starts_with(prefix)
                    && topic.as_bytes()[prefix.len()] == b'/')
        }
        None => false,
    }
}
