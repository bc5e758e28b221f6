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

//! The well-known broker topics.

/// Outbound API calls from consoles to the services.
pub const API_REQUEST: &str = "api_request";

/// API responses, correlated by the id inside `content`.
pub const API_RESPONSE: &str = "api_response";

/// Task status reports published by anything that runs or observes work.
pub const TASK_STATUS: &str = "NetbootStudio/TaskStatus";

/// Prefix for per-source data-source topics.
pub const DATA_SOURCE_PREFIX: &str = "NetbootStudio/DataSources/";

/// Wildcard subscription covering every data source.
pub const DATA_SOURCE_WILDCARD: &str = "NetbootStudio/DataSources/#";

/// The topic a named data source lives on.
pub fn data_source(name: &str) -> String {
    format!("{DATA_SOURCE_PREFIX}{name}")
}

/// The source name a data-source topic refers to, if it is one.
pub fn data_source_name(topic: &str) -> Option<&str> {
    topic.strip_prefix(DATA_SOURCE_PREFIX)
}
