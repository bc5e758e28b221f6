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
//! Netboot Studio Console Library
//!
//! The state layer of the administrative console. A [`ConsoleSession`]
//! connects the request correlator and the data-source register to a broker;
//! the view models under `views` hold the rows and action rules the dashboard
//! widgets render.
//!
//! [`ConsoleSession`]: crate::prelude::ConsoleSession

pub(crate) mod session;
pub(crate) mod views;

/// Prelude module for convenient imports.
///
/// Re-exports the core messaging prelude alongside the console types.
pub mod prelude {
    pub use nbs_core::prelude::*;

    pub use crate::session::ConsoleSession;
    pub use crate::views::{
        available_actions, tab_specs, Column, RowFilter, SourceTable, TabSpec, TableConfig,
        TaskAction, TaskList, Tabs, ALL_TAB_NAMES,
    };
}
