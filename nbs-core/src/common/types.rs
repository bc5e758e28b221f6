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

//! Defines common internal type aliases used within `nbs-core`.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::message::{Message, TransportError};

/// Crate-internal: sender half of a subscriber's message channel.
pub(crate) type Outbox = mpsc::Sender<Message>;

/// Crate-internal: receiver half of a subscriber's message channel.
pub(crate) type Inbox = mpsc::Receiver<Message>;

/// Crate-internal: the pending-request registry of the correlator.
/// Entries are removed exactly once: either by the matching response or by
/// a timeout, never both.
pub(crate) type PendingRequests =
    Arc<DashMap<Uuid, oneshot::Sender<Result<Value, TransportError>>>>;
