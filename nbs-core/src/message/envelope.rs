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

use serde::{Deserialize, Serialize};
use serde_json::Value;
use static_assertions::assert_impl_all;
use uuid::Uuid;

use crate::message::TransportError;

/// The common message envelope for every payload crossing the broker,
/// regardless of transport.
///
/// If a message arrived via a broker topic, `topic` is set by the receiving
/// edge; otherwise it is empty and the handler must set it before routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique id, assigned at construction. Immutable thereafter.
    id: String,
    /// Name of the producing component.
    pub sender: String,
    /// Which transport delivered this message (e.g. `"broker"`). Set by the
    /// receiving edge, not the producer.
    pub origin: Option<String>,
    /// Routing hint.
    pub target: String,
    /// Broker topic this message arrived on, when applicable.
    pub topic: Option<String>,
    /// Arbitrary JSON payload.
    pub content: Value,
}

impl Message {
    /// Creates a fresh envelope with a generated id and default routing fields.
    pub fn new() -> Self {
        Message {
            id: Uuid::new_v4().to_string(),
            sender: "Unknown".to_string(),
            origin: None,
            target: "all".to_string(),
            topic: None,
            content: Value::Object(Default::default()),
        }
    }

    /// The message id. There is deliberately no way to change it after
    /// construction; a parsed message keeps its wire id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Parses an envelope from its JSON wire form.
    pub fn from_json(json: &str) -> Result<Self, TransportError> {
        serde_json::from_str(json).map_err(TransportError::from)
    }

    /// Serializes the envelope to its JSON wire form.
    pub fn to_json(&self) -> Result<String, TransportError> {
        serde_json::to_string(self).map_err(TransportError::from)
    }

    /// Replaces the content payload, keeping routing fields intact.
    pub fn with_content(mut self, content: Value) -> Self {
        self.content = content;
        self
    }

    /// Records which component or transport handled the message.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Names the producing component.
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into();
        self
    }

    /// Sets the routing hint.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Records the topic this message is bound for or arrived on.
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }
}

impl Default for Message {
    fn default() -> Self {
        Self::new()
    }
}

// Ensures that Message implements the Send trait.
assert_impl_all!(Message: Send);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_message_defaults() {
        let msg = Message::new();
        assert_eq!(msg.sender, "Unknown");
        assert_eq!(msg.target, "all");
        assert!(msg.origin.is_none());
        assert!(msg.topic.is_none());
        assert!(Uuid::parse_str(msg.id()).is_ok());
    }

    #[test]
    fn wire_round_trip_preserves_id() {
        let msg = Message::new()
            .with_sender("console")
            .with_target("server")
            .with_topic("api_request");
        let wire = msg.to_json().unwrap();
        let parsed = Message::from_json(&wire).unwrap();
        assert_eq!(parsed.id(), msg.id());
        assert_eq!(parsed.sender, "console");
        assert_eq!(parsed.topic.as_deref(), Some("api_request"));
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(Message::from_json("{not json").is_err());
    }
}
