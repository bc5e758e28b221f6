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

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, instrument, trace, warn};

use crate::common::topics;
use crate::message::{Message, SourceMessage, TransportError};
use crate::traits::BrokerLink;

/// Invoked with the new value each time a data source's value actually
/// changes.
pub type ChangeCallback = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Default)]
pub(crate) struct CachedValue {
    pub(crate) value: Value,
    pub(crate) value_json: String,
}

impl CachedValue {
    pub(crate) fn empty() -> Self {
        CachedValue {
            value: Value::Object(Default::default()),
            value_json: "{}".to_string(),
        }
    }
}

struct SourceInner {
    name: String,
    topic: String,
    cache: Mutex<CachedValue>,
    on_change: Option<ChangeCallback>,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

/// The consumer side of a named, server-pushed value stream.
///
/// Caches the last known value and its serialized form; an incoming value is
/// compared against the cache by serialization and the change callback runs
/// only when they differ. Several consumers may share one name; each keeps
/// its own cache and is notified independently.
#[derive(Clone)]
pub struct DataSource {
    inner: Arc<SourceInner>,
}

impl DataSource {
    /// Creates a detached consumer. Feed it through [`handle_message`]
    /// (a session router does this for all its registered sources), or use
    /// [`subscribe`](Self::subscribe) for a self-contained one.
    pub fn new(name: &str, on_change: Option<ChangeCallback>) -> Self {
        debug!("setting up data source: {}", name);
        DataSource {
            inner: Arc::new(SourceInner {
                name: name.to_string(),
                topic: topics::data_source(name),
                cache: Mutex::new(CachedValue::empty()),
                on_change,
                tracker: TaskTracker::new(),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Creates a consumer with its own subscription and listener task, and
    /// asks the provider for the current value so the consumer converges
    /// without waiting for the next change.
    #[instrument(skip(link, on_change))]
    pub async fn subscribe<L: BrokerLink>(
        link: &L,
        name: &str,
        on_change: Option<ChangeCallback>,
    ) -> Result<Self, TransportError> {
        let source = DataSource::new(name, on_change);
        let mut subscription = link.subscribe(source.topic()).await;
        let listener = source.clone();
        let cancel = source.inner.cancel.clone();
        source.inner.tracker.spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    incoming = subscription.inbox.recv() => {
                        let Some(message) = incoming else { break; };
                        listener.handle_message(&message);
                    }
                }
            }
            trace!("data source listener finished: {}", listener.name());
        });
        source.inner.tracker.close();
        source.request_current(link).await?;
        Ok(source)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn topic(&self) -> &str {
        &self.inner.topic
    }

    /// The last known value.
    pub fn get_value(&self) -> Value {
        self.lock_cache().value.clone()
    }

    /// Publishes a `request` so the provider replies with `current_value`.
    pub async fn request_current<L: BrokerLink>(&self, link: &L) -> Result<(), TransportError> {
        let content = serde_json::to_value(SourceMessage::Request)?;
        let message = Message::new()
            .with_sender(format!("DataSource/{}", self.name()))
            .with_content(content);
        link.publish(self.topic(), message).await
    }

    /// Handles one message from this source's topic. Malformed content is
    /// logged and skipped; `request` messages are the consumers' own traffic
    /// and are ignored.
    pub fn handle_message(&self, message: &Message) {
        let source_msg: SourceMessage = match serde_json::from_value(message.content.clone()) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(
                    "discarding malformed message on data source {}: {}",
                    self.name(),
                    e
                );
                return;
            }
        };
        self.apply(&source_msg);
    }

    /// Applies a decoded source message: update the cache and notify, but
    /// only when the serialized value differs from what is already cached.
    pub fn apply(&self, source_msg: &SourceMessage) {
        let Some(value) = source_msg.value() else {
            return;
        };
        let serialized = match serde_json::to_string(value) {
            Ok(serialized) => serialized,
            Err(e) => {
                warn!("could not serialize value for data source {}: {}", self.name(), e);
                return;
            }
        };
        let changed = {
            let mut cache = self.lock_cache();
            if cache.value_json == serialized {
                false
            } else {
                cache.value = value.clone();
                cache.value_json = serialized;
                true
            }
        };
        if changed {
            debug!("new value for data source: {}", self.name());
            if let Some(on_change) = &self.inner.on_change {
                on_change(value);
            }
        }
    }

    /// Stops the listener task, if this consumer owns one.
    pub async fn stop(&self) {
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

impl std::fmt::Debug for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSource")
            .field("name", &self.inner.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    fn counting_source(name: &str) -> (DataSource, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let source = DataSource::new(
            name,
            Some(Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        );
        (source, hits)
    }

    #[test]
    fn repeated_value_notifies_once() {
        let (source, hits) = counting_source("clients");
        let update = SourceMessage::NewValue { value: json!([{"mac": "aa"}]) };
        source.apply(&update);
        source.apply(&update);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(source.get_value(), json!([{"mac": "aa"}]));
    }

    #[test]
    fn current_value_counts_as_a_change_too() {
        let (source, hits) = counting_source("tasks");
        source.apply(&SourceMessage::CurrentValue { value: json!([1]) });
        source.apply(&SourceMessage::NewValue { value: json!([1, 2]) });
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn requests_are_ignored_by_consumers() {
        let (source, hits) = counting_source("iso");
        source.apply(&SourceMessage::Request);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(source.get_value(), json!({}));
    }

    #[test]
    fn malformed_content_is_skipped() {
        let (source, hits) = counting_source("boot_images");
        let message = Message::new().with_content(json!({"unexpected": true}));
        source.handle_message(&message);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
