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

use derive_new::new;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::message::TransportError;

/// The `content` of an envelope on the `api_request` topic.
#[derive(new, Debug, Clone, Serialize, Deserialize)]
pub struct ApiCallContent {
    /// Correlation id. Distinct from the envelope id: the response echoes
    /// this one back.
    pub id: Uuid,
    /// Name of the API endpoint being invoked.
    pub endpoint: String,
    /// Endpoint-specific arguments.
    pub api_payload: Value,
}

/// The result-or-error payload inside an API response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiResultPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The `content` of an envelope on the `api_response` topic.
///
/// `id`, `endpoint`, and `request_payload` are decoration added by the
/// responder so callers can correlate and diagnose without keeping a copy of
/// the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponseContent {
    pub status: u16,
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_payload: Option<Value>,
    pub api_payload: ApiResultPayload,
}

impl ApiResponseContent {
    /// Collapses the wire shape into the caller-facing result.
    pub fn into_result(self) -> Result<Value, TransportError> {
        if self.status == 200 {
            Ok(self.api_payload.result.unwrap_or(Value::Null))
        } else {
            Err(TransportError::Api {
                status: self.status,
                error: self
                    .api_payload
                    .error
                    .unwrap_or_else(|| "unspecified server error".to_string()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn success_payload_resolves_to_result() {
        let content = ApiResponseContent {
            status: 200,
            id: Uuid::new_v4(),
            endpoint: Some("get_clients".into()),
            request_payload: Some(json!({})),
            api_payload: ApiResultPayload {
                result: Some(json!(["a", "b"])),
                error: None,
            },
        };
        assert_eq!(content.into_result().unwrap(), json!(["a", "b"]));
    }

    #[test]
    fn error_payload_carries_server_message() {
        let content = ApiResponseContent {
            status: 500,
            id: Uuid::new_v4(),
            endpoint: None,
            request_payload: None,
            api_payload: ApiResultPayload {
                result: None,
                error: Some("unrecognized endpoint".into()),
            },
        };
        match content.into_result() {
            Err(TransportError::Api { status, error }) => {
                assert_eq!(status, 500);
                assert_eq!(error, "unrecognized endpoint");
            }
            other => panic!("expected api error, got {:?}", other),
        }
    }
}
