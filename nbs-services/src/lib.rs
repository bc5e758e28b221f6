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
//! Netboot Studio Services Library
//!
//! The service-side counterparts the console talks to over the broker:
//! the API message processor, the task manager, the client manager, and the
//! file manager. Each publishes its live state through a data source so every
//! connected console converges on the same view.

pub(crate) mod clients;
pub(crate) mod files;
pub(crate) mod processor;
pub(crate) mod tasks;
pub(crate) mod timefmt;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::clients::{
        ClientConfig, ClientManager, ClientRecord, ClientStateDetail, ClientStateSlot, Settings,
    };
    pub use crate::files::{FileCategory, FileEntry, FileManager};
    pub use crate::processor::MessageProcessor;
    pub use crate::tasks::{
        FakeLongTask, Subtask, Task, TaskContext, TaskManager, TaskRegistry, TaskReport,
        TaskStatus,
    };
    pub use crate::timefmt::{get_timestamp, seconds_until, TIMESTAMP_FORMAT};
}
