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

use async_trait::async_trait;

use crate::common::{Subscription, SubscriptionId};
use crate::message::{Message, TransportError};

/// A connection to the publish/subscribe message server.
///
/// Implementors hand out independent [`Subscription`]s; every subscriber of a
/// matching pattern receives its own copy of each published message.
#[async_trait]
pub trait BrokerLink: Clone + Send + Sync + 'static {
    /// Publishes a message on a topic.
    async fn publish(&self, topic: &str, message: Message) -> Result<(), TransportError>;

    /// Registers a subscription for a topic pattern (a literal topic, or a
    /// pattern ending in a `#` wildcard segment).
    async fn subscribe(&self, pattern: &str) -> Subscription;

    /// Removes a subscription registered earlier under `pattern`.
    fn unsubscribe(&self, pattern: &str, id: SubscriptionId);
}
