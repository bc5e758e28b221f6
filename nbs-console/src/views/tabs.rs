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

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::warn;

use crate::views::table::{Column, RowFilter, TableConfig};

/// Every tab in the dashboard, in display order.
pub const ALL_TAB_NAMES: [&str; 13] = [
    "ipxe_builds",
    "stage1_files",
    "stage4",
    "boot_images",
    "unattended_configs",
    "clients",
    "client_status",
    "uboot_scripts",
    "iso",
    "wimboot_builds",
    "tftp_root",
    "settings",
    "debugging",
];

/// A tab and the table that fills it. Tabs without a backing data source
/// (settings, debugging) have no table config.
pub struct TabSpec {
    pub name: &'static str,
    pub table: Option<TableConfig>,
}

fn file_columns() -> Vec<Column> {
    vec![
        Column { key: "filename", display: "File Name", width: 40 },
        Column { key: "modified", display: "Last Modified", width: 30 },
    ]
}

/// The fixed tab registry, column specs and all.
pub fn tab_specs() -> Vec<TabSpec> {
    vec![
        TabSpec {
            name: "ipxe_builds",
            table: Some(TableConfig {
                source: "ipxe_builds",
                columns: vec![
                    Column { key: "build_name", display: "Name", width: 20 },
                    Column { key: "commit_id", display: "Commit ID", width: 10 },
                    Column { key: "arch", display: "Architecture", width: 10 },
                    Column { key: "build_timestamp", display: "Build Timestamp", width: 20 },
                    Column { key: "stage1", display: "Embedded Stage1", width: 20 },
                    Column { key: "comment", display: "Comment", width: 20 },
                ],
                filter: None,
            }),
        },
        TabSpec {
            name: "stage1_files",
            table: Some(TableConfig {
                source: "stage1_files",
                columns: file_columns(),
                filter: None,
            }),
        },
        TabSpec {
            name: "stage4",
            table: Some(TableConfig {
                source: "stage4",
                columns: vec![
                    Column { key: "filename", display: "Script Name", width: 40 },
                    Column { key: "modified", display: "Last Modified", width: 30 },
                ],
                filter: None,
            }),
        },
        TabSpec {
            name: "boot_images",
            table: Some(TableConfig {
                source: "boot_images",
                columns: vec![
                    Column { key: "boot_image_name", display: "Name", width: 25 },
                    Column { key: "created", display: "Created", width: 15 },
                    Column { key: "image_type", display: "Image Type", width: 15 },
                    Column { key: "arch", display: "Architecture", width: 10 },
                    Column { key: "description", display: "Description", width: 35 },
                ],
                filter: None,
            }),
        },
        TabSpec {
            name: "unattended_configs",
            table: Some(TableConfig {
                source: "unattended_configs",
                columns: file_columns(),
                filter: None,
            }),
        },
        TabSpec {
            name: "clients",
            table: Some(TableConfig {
                source: "clients",
                columns: vec![
                    Column { key: "hostname", display: "Hostname", width: 20 },
                    Column { key: "mac", display: "MAC Address", width: 20 },
                    Column { key: "ip", display: "IP Address", width: 15 },
                    Column { key: "arch", display: "Architecture", width: 10 },
                    Column { key: "config", display: "Config", width: 35 },
                ],
                filter: None,
            }),
        },
        TabSpec {
            name: "client_status",
            table: Some(TableConfig {
                source: "clients",
                columns: vec![
                    Column { key: "client", display: "Client", width: 20 },
                    Column { key: "state_text", display: "State", width: 30 },
                    Column { key: "description", display: "Description", width: 50 },
                ],
                filter: Some(client_status_filter()),
            }),
        },
        TabSpec {
            name: "uboot_scripts",
            table: Some(TableConfig {
                source: "uboot_scripts",
                columns: file_columns(),
                filter: None,
            }),
        },
        TabSpec {
            name: "iso",
            table: Some(TableConfig {
                source: "iso",
                columns: file_columns(),
                filter: None,
            }),
        },
        TabSpec {
            name: "wimboot_builds",
            table: Some(TableConfig {
                source: "wimboot_builds",
                columns: vec![
                    Column { key: "name", display: "Name", width: 20 },
                    Column { key: "commit_id", display: "Commit ID", width: 10 },
                    Column { key: "arch", display: "Architecture", width: 10 },
                    Column { key: "build_timestamp", display: "Build Timestamp", width: 20 },
                    Column { key: "comment", display: "Comment", width: 30 },
                ],
                filter: None,
            }),
        },
        TabSpec {
            name: "tftp_root",
            table: Some(TableConfig {
                source: "tftp_root",
                columns: vec![
                    Column { key: "filename", display: "File Name", width: 30 },
                    Column { key: "modified", display: "Last Modified", width: 30 },
                    Column { key: "description", display: "Description", width: 40 },
                ],
                filter: None,
            }),
        },
        TabSpec { name: "settings", table: None },
        TabSpec { name: "debugging", table: None },
    ]
}

/// The client-status tab flattens each record to the fields it shows,
/// falling back to the MAC when a client has not reported a hostname yet.
fn client_status_filter() -> RowFilter {
    Arc::new(|entry: Value| {
        let state = &entry["state"]["state"];
        let hostname = entry["hostname"].as_str().unwrap_or("unknown");
        let client = if hostname.eq_ignore_ascii_case("unknown") {
            entry["mac"].as_str().unwrap_or_default()
        } else {
            hostname
        };
        json!({
            "client": client,
            "state_text": state["state_text"],
            "description": state["description"],
        })
    })
}

/// Which tab is showing. Exactly one tab is active at a time.
pub struct Tabs {
    active: &'static str,
}

impl Tabs {
    /// Fresh page state: the clients tab is shown first.
    pub fn new() -> Self {
        Tabs { active: "clients" }
    }

    pub fn active(&self) -> &'static str {
        self.active
    }

    /// Switches tabs; unknown names are refused and the current tab stays.
    pub fn activate(&mut self, name: &str) -> Option<TabSpec> {
        let Some(position) = ALL_TAB_NAMES.iter().position(|tab| *tab == name) else {
            warn!("unknown tab: {}", name);
            return None;
        };
        self.active = ALL_TAB_NAMES[position];
        tab_specs().into_iter().find(|spec| spec.name == name)
    }
}

impl Default for Tabs {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_tab_has_a_spec() {
        let specs = tab_specs();
        for name in ALL_TAB_NAMES {
            assert!(specs.iter().any(|spec| spec.name == name), "missing tab: {name}");
        }
    }

    #[test]
    fn default_tab_is_clients() {
        let tabs = Tabs::new();
        assert_eq!(tabs.active(), "clients");
    }

    #[test]
    fn unknown_tabs_are_refused() {
        let mut tabs = Tabs::new();
        assert!(tabs.activate("nonsense").is_none());
        assert_eq!(tabs.active(), "clients");
        assert!(tabs.activate("boot_images").is_some());
        assert_eq!(tabs.active(), "boot_images");
    }

    #[test]
    fn client_status_rows_fall_back_to_the_mac() {
        let filter = client_status_filter();
        let row = filter(serde_json::json!({
            "mac": "aa:bb:cc:dd:ee:ff",
            "hostname": "unknown",
            "state": {"state": {"state_text": "Complete", "description": "done"}}
        }));
        assert_eq!(row["client"], "aa:bb:cc:dd:ee:ff");

        let row = filter(serde_json::json!({
            "mac": "aa:bb:cc:dd:ee:ff",
            "hostname": "builder-01",
            "state": {"state": {"state_text": "Complete", "description": "done"}}
        }));
        assert_eq!(row["client"], "builder-01");
    }
}
