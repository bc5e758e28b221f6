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
use serde_json::json;

use nbs_core::prelude::*;

use crate::setup::*;

mod setup;

#[tokio::test]
async fn every_subscriber_gets_its_own_copy() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MessageBroker::new();
    let mut first = broker.subscribe("api_request");
    let mut second = broker.subscribe("api_request");

    broker.publish("api_request", Message::new().with_content(json!({"n": 1})));

    let a = first.inbox.recv().await.expect("first subscriber");
    let b = second.inbox.recv().await.expect("second subscriber");
    assert_eq!(a.content, json!({"n": 1}));
    assert_eq!(b.content, json!({"n": 1}));
    assert_eq!(a.id(), b.id());
    assert_eq!(a.topic.as_deref(), Some("api_request"));
    Ok(())
}

#[tokio::test]
async fn wildcard_subscription_sees_the_subtree() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MessageBroker::new();
    let mut all_sources = broker.subscribe(topics::DATA_SOURCE_WILDCARD);

    broker.publish(&topics::data_source("clients"), Message::new());
    broker.publish(topics::TASK_STATUS, Message::new());
    broker.publish(&topics::data_source("tasks"), Message::new());

    let first = all_sources.inbox.recv().await.expect("clients message");
    assert_eq!(first.topic.as_deref(), Some("NetbootStudio/DataSources/clients"));
    let second = all_sources.inbox.recv().await.expect("tasks message");
    assert_eq!(second.topic.as_deref(), Some("NetbootStudio/DataSources/tasks"));
    assert!(all_sources.inbox.try_recv().is_err(), "task status must not match");
    Ok(())
}

#[tokio::test]
async fn publish_without_subscribers_is_dropped() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MessageBroker::new();
    // nothing to assert beyond "does not block or panic"
    broker.publish("api_response", Message::new());
    Ok(())
}

#[tokio::test]
async fn slow_subscriber_never_blocks_the_broker() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MessageBroker::new();
    let mut lagging = broker.subscribe_with_capacity("api_request", 1);

    for n in 0..5 {
        broker.publish("api_request", Message::new().with_content(json!({"n": n})));
    }

    // only the first message fits; the rest were dropped for this subscriber
    let kept = lagging.inbox.recv().await.expect("first message kept");
    assert_eq!(kept.content, json!({"n": 0}));
    assert!(lagging.inbox.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn unsubscribe_stops_delivery() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MessageBroker::new();
    let subscription = broker.subscribe("api_request");
    broker.unsubscribe("api_request", subscription.id);

    broker.publish("api_request", Message::new());

    let mut inbox = subscription.inbox;
    assert!(inbox.recv().await.is_none(), "channel should be closed");
    Ok(())
}

#[tokio::test]
async fn stop_closes_all_subscriber_channels() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MessageBroker::new();
    let mut subscription = broker.subscribe("api_request");
    broker.stop();
    assert!(subscription.inbox.recv().await.is_none());
    Ok(())
}
