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

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, instrument, trace};

use crate::common::topics;
use crate::config::CONFIG;
use crate::datasource::source::CachedValue;
use crate::message::{Message, SourceMessage, TransportError};
use crate::traits::BrokerLink;

/// Produces the authoritative value for a data source.
pub type Supplier = Arc<dyn Fn() -> Value + Send + Sync>;

struct ProviderInner {
    name: String,
    topic: String,
    cache: Mutex<CachedValue>,
    supplier: Supplier,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

/// The provider side of a named data source.
///
/// Polls its supplier every scan cycle and publishes `new_value` when the
/// supplied value's serialization differs from the cache. Answers `request`
/// messages with `current_value`. Its own published messages come back over
/// the subscription and are ignored.
#[derive(Clone)]
pub struct DataProvider {
    inner: Arc<ProviderInner>,
}

impl DataProvider {
    /// Starts a provider with the configured scan cycle.
    pub async fn start<L: BrokerLink>(
        link: &L,
        name: &str,
        supplier: Supplier,
    ) -> Result<Self, TransportError> {
        Self::start_with_cycle(link, name, supplier, CONFIG.scan_cycle()).await
    }

    /// Starts a provider polling its supplier every `scan_cycle`.
    #[instrument(skip(link, supplier))]
    pub async fn start_with_cycle<L: BrokerLink>(
        link: &L,
        name: &str,
        supplier: Supplier,
        scan_cycle: Duration,
    ) -> Result<Self, TransportError> {
        debug!("setting up data source provider: {}", name);
        let provider = DataProvider {
            inner: Arc::new(ProviderInner {
                name: name.to_string(),
                topic: topics::data_source(name),
                cache: Mutex::new(CachedValue::empty()),
                supplier,
                tracker: TaskTracker::new(),
                cancel: CancellationToken::new(),
            }),
        };

        let mut subscription = link.subscribe(provider.topic()).await;
        let scanner = provider.clone();
        let link = link.clone();
        let cancel = provider.inner.cancel.clone();
        provider.inner.tracker.spawn(async move {
            let mut ticks = tokio::time::interval(scan_cycle);
            ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticks.tick() => {
                        if let Some(value) = scanner.refresh() {
                            scanner.publish(&link, SourceMessage::NewValue { value }).await;
                        }
                    }
                    incoming = subscription.inbox.recv() => {
                        let Some(message) = incoming else { break; };
                        if scanner.is_request(&message) {
                            let value = scanner.get_value();
                            scanner.publish(&link, SourceMessage::CurrentValue { value }).await;
                        }
                    }
                }
            }
            trace!("data source provider finished: {}", scanner.name());
        });
        provider.inner.tracker.close();

        Ok(provider)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn topic(&self) -> &str {
        &self.inner.topic
    }

    /// The value as of the last scan.
    pub fn get_value(&self) -> Value {
        self.lock_cache().value.clone()
    }

    /// Polls the supplier; returns the new value when it differs from the
    /// cache, updating the cache first.
    fn refresh(&self) -> Option<Value> {
        let value = (self.inner.supplier)();
        let serialized = match serde_json::to_string(&value) {
            Ok(serialized) => serialized,
            Err(e) => {
                error!("could not serialize value for data source {}: {}", self.name(), e);
                return None;
            }
        };
        let mut cache = self.lock_cache();
        if cache.value_json == serialized {
            return None;
        }
        debug!("updating data source: {}", self.name());
        cache.value = value.clone();
        cache.value_json = serialized;
        Some(value)
    }

    fn is_request(&self, message: &Message) -> bool {
        matches!(
            serde_json::from_value::<SourceMessage>(message.content.clone()),
            Ok(SourceMessage::Request)
        )
    }

    async fn publish<L: BrokerLink>(&self, link: &L, source_msg: SourceMessage) {
        let content = match serde_json::to_value(&source_msg) {
            Ok(content) => content,
            Err(e) => {
                error!("could not encode update for data source {}: {}", self.name(), e);
                return;
            }
        };
        let message = Message::new()
            .with_sender(format!("DataProvider/{}", self.name()))
            .with_content(content);
        if let Err(e) = link.publish(self.topic(), message).await {
            error!("failed to publish update for data source {}: {}", self.name(), e);
        }
    }

    /// Cancels the scan task.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        debug!("shutting down data source provider: {}", self.name());
        self.inner.cancel.cancel();
        self.inner.tracker.wait().await;
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, CachedValue> {
        self.inner
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for DataProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataProvider")
            .field("name", &self.inner.name)
            .finish()
    }
}
