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
use std::time::Duration;

use serde_json::{json, Value};
use uuid::Uuid;

use nbs_core::prelude::*;

use crate::setup::*;

mod setup;

/// A minimal responder: echoes the request payload back under `result`,
/// except for the `always_fails` endpoint.
fn spawn_responder(broker: &MessageBroker) {
    let broker = broker.clone();
    let mut requests = broker.subscribe(topics::API_REQUEST);
    tokio::spawn(async move {
        while let Some(message) = requests.inbox.recv().await {
            let call: ApiCallContent =
                serde_json::from_value(message.content.clone()).expect("well-formed request");
            let response = if call.endpoint == "always_fails" {
                ApiResponseContent {
                    status: 500,
                    id: call.id,
                    endpoint: Some(call.endpoint.clone()),
                    request_payload: Some(call.api_payload.clone()),
                    api_payload: ApiResultPayload {
                        result: None,
                        error: Some("always fails".into()),
                    },
                }
            } else {
                ApiResponseContent {
                    status: 200,
                    id: call.id,
                    endpoint: Some(call.endpoint.clone()),
                    request_payload: Some(call.api_payload.clone()),
                    api_payload: ApiResultPayload {
                        result: Some(json!({"echo": call.api_payload})),
                        error: None,
                    },
                }
            };
            let content = serde_json::to_value(&response).expect("encodable response");
            broker.publish(
                topics::API_RESPONSE,
                Message::new().with_sender("responder").with_content(content),
            );
        }
    });
}

fn stray_response(id: Uuid, result: Value) -> Message {
    let content = serde_json::to_value(ApiResponseContent {
        status: 200,
        id,
        endpoint: None,
        request_payload: None,
        api_payload: ApiResultPayload {
            result: Some(result),
            error: None,
        },
    })
    .expect("encodable response");
    Message::new().with_sender("stray").with_content(content)
}

#[tokio::test]
async fn call_resolves_with_the_server_result() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MessageBroker::new();
    spawn_responder(&broker);
    let client = ApiClient::start(broker.clone(), "test-console").await;

    let result = client.call("get_clients", json!({})).await?;
    assert_eq!(result, json!({"echo": {}}));
    assert_eq!(client.pending_requests(), 0);
    Ok(())
}

#[tokio::test]
async fn error_responses_surface_the_server_message() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MessageBroker::new();
    spawn_responder(&broker);
    let client = ApiClient::start(broker.clone(), "test-console").await;

    match client.call("always_fails", json!({})).await {
        Err(TransportError::Api { status, error }) => {
            assert_eq!(status, 500);
            assert_eq!(error, "always fails");
        }
        other => panic!("expected api error, got {:?}", other),
    }
    assert_eq!(client.pending_requests(), 0);
    Ok(())
}

#[tokio::test]
async fn concurrent_calls_get_their_own_responses() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MessageBroker::new();
    spawn_responder(&broker);
    let client = ApiClient::start(broker.clone(), "test-console").await;

    let (a, b) = tokio::join!(
        client.call("first", json!({"n": 1})),
        client.call("second", json!({"n": 2})),
    );
    assert_eq!(a?, json!({"echo": {"n": 1}}));
    assert_eq!(b?, json!({"echo": {"n": 2}}));
    assert_eq!(client.pending_requests(), 0);
    Ok(())
}

#[tokio::test]
async fn unmatched_responses_are_ignored() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MessageBroker::new();
    spawn_responder(&broker);
    let client = ApiClient::start(broker.clone(), "test-console").await;

    broker.publish(topics::API_RESPONSE, stray_response(Uuid::new_v4(), json!(42)));

    // the client keeps correlating correctly afterwards
    let result = client.call("still_works", json!({})).await?;
    assert_eq!(result, json!({"echo": {}}));
    Ok(())
}

#[tokio::test]
async fn timeout_removes_the_pending_entry() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MessageBroker::new();
    // no responder at all
    let client = ApiClient::start(broker.clone(), "test-console").await;

    let outcome = client
        .call_with_timeout("get_clients", json!({}), Duration::from_millis(50))
        .await;
    match outcome {
        Err(TransportError::Timeout { endpoint }) => assert_eq!(endpoint, "get_clients"),
        other => panic!("expected timeout, got {:?}", other),
    }
    assert_eq!(client.pending_requests(), 0);
    Ok(())
}

#[tokio::test]
async fn a_response_after_timeout_is_ignored() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MessageBroker::new();

    // capture the request id so the late response can reuse it
    let mut requests = broker.subscribe(topics::API_REQUEST);
    let client = ApiClient::start(broker.clone(), "test-console").await;

    let outcome = client
        .call_with_timeout("slow_endpoint", json!({}), Duration::from_millis(50))
        .await;
    assert!(matches!(outcome, Err(TransportError::Timeout { .. })));

    let request = requests.inbox.recv().await.expect("request was published");
    let call: ApiCallContent = serde_json::from_value(request.content.clone())?;
    broker.publish(topics::API_RESPONSE, stray_response(call.id, json!("late")));

    // late response hits the unmatched path; correlation still works after
    let result = tokio::time::timeout(
        Duration::from_secs(1),
        async {
            spawn_responder(&broker);
            client.call("after_late", json!({})).await
        },
    )
    .await
    .expect("should not hang")?;
    assert_eq!(result, json!({"echo": {}}));
    assert_eq!(client.pending_requests(), 0);
    Ok(())
}

#[tokio::test]
async fn calls_without_timeout_stay_pending() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MessageBroker::new();
    // no responder: the entry must stay registered
    let client = ApiClient::start(broker.clone(), "test-console").await;

    let waiting = {
        let client = client.clone();
        tokio::spawn(async move { client.call("never_answered", json!({})).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(client.pending_requests(), 1);

    // shutdown fails the stranded call rather than leaving it hanging
    client.stop().await;
    let outcome = waiting.await?;
    assert!(matches!(outcome, Err(TransportError::ChannelClosed)));
    assert_eq!(client.pending_requests(), 0);
    Ok(())
}
