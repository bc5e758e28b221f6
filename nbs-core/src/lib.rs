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

#![forbid(unsafe_code)]
//! Netboot Studio Core Library
//!
//! This library provides the messaging layer shared by the Netboot Studio
//! services and console: the wire envelope, the in-process topic broker,
//! request/response correlation, and live data sources.

/// Configuration loaded from XDG-compliant locations.
pub(crate) mod config;

/// Common utilities and structures used throughout Netboot Studio.
pub(crate) mod common;

pub(crate) mod client;
pub(crate) mod datasource;
pub(crate) mod message;
/// Trait definitions used at the transport seams.
pub(crate) mod traits;

/// Prelude module for convenient imports.
///
/// This module re-exports commonly used items from the `common`, `message`,
/// and `traits` modules, as well as the `async_trait` crate.
pub mod prelude {
    pub use async_trait;

    pub use crate::client::ApiClient;
    pub use crate::common::{topics, MessageBroker, Subscription, SubscriptionId};
    pub use crate::config::{StudioConfig, CONFIG};
    pub use crate::datasource::{ChangeCallback, DataProvider, DataSource, Supplier};
    pub use crate::message::{
        ApiCallContent, ApiResponseContent, ApiResultPayload, Message, SourceMessage,
        TransportError,
    };
    pub use crate::traits::BrokerLink;
}
