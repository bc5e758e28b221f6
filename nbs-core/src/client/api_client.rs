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
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, instrument, trace, warn};
use uuid::Uuid;

use crate::common::{topics, PendingRequests, SubscriptionId};
use crate::message::{ApiCallContent, ApiResponseContent, Message, TransportError};
use crate::traits::BrokerLink;

/// Correlates API calls with their responses over the pub/sub transport.
///
/// Every call is assigned a fresh request id and a responder is stored in the
/// pending registry keyed by that id, *before* the request is published.
/// When a message on `api_response` carries a known id, the responder is
/// removed and completed; it fires at most once. Responses with no matching
/// entry (late arrivals after a timeout, duplicates, other consoles'
/// traffic) are logged and ignored.
#[derive(Debug, Clone)]
pub struct ApiClient<L: BrokerLink> {
    link: L,
    sender_name: String,
    pending: PendingRequests,
    subscription_id: SubscriptionId,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl<L: BrokerLink> ApiClient<L> {
    /// Subscribes to `api_response` and starts the response listener.
    #[instrument(skip(link))]
    pub async fn start(link: L, sender_name: &str) -> Self {
        let mut subscription = link.subscribe(topics::API_RESPONSE).await;
        let pending: PendingRequests = Arc::new(Default::default());
        let tracker = TaskTracker::new();
        let cancel = CancellationToken::new();

        let client = ApiClient {
            link,
            sender_name: sender_name.to_string(),
            pending: pending.clone(),
            subscription_id: subscription.id,
            tracker: tracker.clone(),
            cancel: cancel.clone(),
        };

        tracker.spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    incoming = subscription.inbox.recv() => {
                        let Some(message) = incoming else { break; };
                        Self::handle_response(&pending, message);
                    }
                }
            }
            trace!("api response listener finished");
        });
        tracker.close();

        client
    }

    fn handle_response(pending: &PendingRequests, message: Message) {
        let content: ApiResponseContent = match serde_json::from_value(message.content.clone()) {
            Ok(content) => content,
            Err(e) => {
                error!("failed to parse api response content: {}", e);
                return;
            }
        };
        match pending.remove(&content.id) {
            Some((id, responder)) => {
                trace!(request = %id, "completing pending request");
                // the caller may have given up; a dropped receiver is fine
                let _ = responder.send(content.into_result());
            }
            None => {
                warn!(request = %content.id, "ignoring response to unregistered request id");
            }
        }
    }

    /// Registers a responder and publishes the request. Registration happens
    /// first so the response cannot race it.
    async fn dispatch(
        &self,
        endpoint: &str,
        payload: Value,
    ) -> Result<(Uuid, oneshot::Receiver<Result<Value, TransportError>>), TransportError> {
        let request_id = Uuid::new_v4();
        let content = ApiCallContent::new(request_id, endpoint.to_string(), payload);
        let message = Message::new()
            .with_sender(&self.sender_name)
            .with_target("server")
            .with_content(serde_json::to_value(&content)?);

        let (responder, receiver) = oneshot::channel();
        self.pending.insert(request_id, responder);
        trace!(request = %request_id, endpoint, "dispatching api call");

        if let Err(e) = self.link.publish(topics::API_REQUEST, message).await {
            self.pending.remove(&request_id);
            return Err(e);
        }
        Ok((request_id, receiver))
    }

    /// Makes an API call and waits for the correlated response, however long
    /// that takes. If the response is lost, the pending entry stays until the
    /// client shuts down; prefer [`call_with_timeout`](Self::call_with_timeout)
    /// unless waiting forever is the point.
    #[instrument(skip(self, payload))]
    pub async fn call(&self, endpoint: &str, payload: Value) -> Result<Value, TransportError> {
        let (_, receiver) = self.dispatch(endpoint, payload).await?;
        receiver.await.map_err(|_| TransportError::ChannelClosed)?
    }

    /// Makes an API call, giving up after `timeout`. On expiry the pending
    /// entry is removed, so a late response is ignored rather than delivered.
    #[instrument(skip(self, payload))]
    pub async fn call_with_timeout(
        &self,
        endpoint: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, TransportError> {
        let (request_id, receiver) = self.dispatch(endpoint, payload).await?;
        match tokio::time::timeout(timeout, receiver).await {
            Ok(outcome) => outcome.map_err(|_| TransportError::ChannelClosed)?,
            Err(_) => {
                self.pending.remove(&request_id);
                warn!(request = %request_id, endpoint, "api call timed out");
                Err(TransportError::Timeout {
                    endpoint: endpoint.to_string(),
                })
            }
        }
    }

    /// Number of calls still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Stops the listener and fails every pending call.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        self.cancel.cancel();
        self.tracker.wait().await;
        self.link.unsubscribe(topics::API_RESPONSE, self.subscription_id);
        let waiting: Vec<Uuid> = self.pending.iter().map(|entry| *entry.key()).collect();
        for request_id in waiting {
            if let Some((_, responder)) = self.pending.remove(&request_id) {
                let _ = responder.send(Err(TransportError::ChannelClosed));
            }
        }
    }
}
