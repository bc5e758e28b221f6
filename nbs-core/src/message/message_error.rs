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

/// Represents errors that can occur while moving messages through the broker.
#[derive(Debug)]
pub enum TransportError {
    /// Indicates that sending a message failed.
    SendFailed(String),
    /// A payload could not be serialized or parsed.
    Encoding(String),
    /// No response arrived within the allowed time.
    Timeout { endpoint: String },
    /// The server answered with an error payload.
    Api { status: u16, error: String },
    /// The other side of a channel is gone.
    ChannelClosed,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            TransportError::SendFailed(msg) => write!(f, "Failed to send message: {}", msg),
            TransportError::Encoding(msg) => write!(f, "Failed to encode or parse message: {}", msg),
            TransportError::Timeout { endpoint } => {
                write!(f, "Request to endpoint '{}' timed out", endpoint)
            }
            TransportError::Api { status, error } => {
                write!(f, "API error (status {}): {}", status, error)
            }
            TransportError::ChannelClosed => write!(f, "Channel closed"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Converts a `SendError` from Tokio's MPSC channel to a `TransportError`.
impl<T> From<tokio::sync::mpsc::error::SendError<T>> for TransportError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        TransportError::SendFailed("Channel closed".into())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::Encoding(err.to_string())
    }
}
