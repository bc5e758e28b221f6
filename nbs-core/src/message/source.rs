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

/// Wire messages exchanged on a data-source topic.
///
/// Consumers send `request`; the provider answers with `current_value` and
/// pushes `new_value` whenever the value changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "message_type", rename_all = "snake_case")]
pub enum SourceMessage {
    Request,
    CurrentValue { value: Value },
    NewValue { value: Value },
}

impl SourceMessage {
    /// The carried value, for the two variants that have one.
    pub fn value(&self) -> Option<&Value> {
        match self {
            SourceMessage::Request => None,
            SourceMessage::CurrentValue { value } | SourceMessage::NewValue { value } => {
                Some(value)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn request_wire_shape() {
        let wire = serde_json::to_value(SourceMessage::Request).unwrap();
        assert_eq!(wire, json!({"message_type": "request"}));
    }

    #[test]
    fn new_value_wire_shape() {
        let wire = serde_json::to_value(SourceMessage::NewValue { value: json!([1, 2]) }).unwrap();
        assert_eq!(wire, json!({"message_type": "new_value", "value": [1, 2]}));
    }

    #[test]
    fn parses_provider_reply() {
        let msg: SourceMessage =
            serde_json::from_str(r#"{"message_type":"current_value","value":{"a":1}}"#).unwrap();
        assert_eq!(msg.value(), Some(&json!({"a": 1})));
    }
}
