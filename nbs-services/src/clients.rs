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

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, Context};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::*;

use nbs_core::prelude::*;

use crate::timefmt::{get_timestamp, seconds_until};

/// How often the expiration sweeper looks at client states.
const SWEEP_CYCLE: Duration = Duration::from_secs(1);

/// One row of the fixed client state table.
#[derive(Debug, Clone, Copy)]
struct StateSpec {
    state_text: &'static str,
    description: &'static str,
    expiration_seconds: i64,
    expiration_action: &'static str,
    active: bool,
    error: bool,
}

/// The netboot lifecycle states a client moves through. Expirations guard
/// against clients that silently disappear mid-flow.
static CLIENT_STATES: &[(&str, StateSpec)] = &[
    (
        "dhcp",
        StateSpec {
            state_text: "Newly Discovered via DHCP Sniffer",
            description: "Client requested an IP Address from DHCP Server, we only know its MAC Address at the moment",
            expiration_seconds: 60,
            expiration_action: "complete",
            active: true,
            error: false,
        },
    ),
    (
        "uboot",
        StateSpec {
            state_text: "U-Boot Requested boot.scr.uimg",
            description: "Client is using u-boot bootloader, and it fetches boot.scr.uimg before anything else",
            expiration_seconds: 120,
            expiration_action: "error",
            active: true,
            error: false,
        },
    ),
    (
        "ipxe",
        StateSpec {
            state_text: "iPXE is initializing",
            description: "Client has fetched the iPXE binary and it is initializing before fetching stage2",
            expiration_seconds: 600,
            expiration_action: "error",
            active: true,
            error: false,
        },
    ),
    (
        "stage2",
        StateSpec {
            state_text: "Stage2 boot image requested",
            description: "Client fetched a boot image, and will not be performing an unattended installation",
            expiration_seconds: 20,
            expiration_action: "complete",
            active: true,
            error: false,
        },
    ),
    (
        "unattended",
        StateSpec {
            state_text: "Unattended Installation",
            description: "Client fetched an unattended config file and is performing the installation",
            expiration_seconds: 14_400,
            expiration_action: "error",
            active: true,
            error: false,
        },
    ),
    (
        "stage4",
        StateSpec {
            state_text: "Stage4 Post-Installation",
            description: "Client is running a Stage4 post-installation script",
            expiration_seconds: 14_400,
            expiration_action: "error",
            active: true,
            error: false,
        },
    ),
    (
        "complete",
        StateSpec {
            state_text: "Complete",
            description: "Client successfully completed all netboot actions",
            expiration_seconds: 60,
            expiration_action: "inactive",
            active: true,
            error: false,
        },
    ),
    (
        "inactive",
        StateSpec {
            state_text: "Inactive",
            description: "Client is not doing Netboot Studio things",
            expiration_seconds: 0,
            expiration_action: "none",
            active: false,
            error: false,
        },
    ),
    (
        "error",
        StateSpec {
            state_text: "Client encountered an error",
            description: "Client encountered an unknown error",
            expiration_seconds: 0,
            expiration_action: "none",
            active: true,
            error: true,
        },
    ),
];

fn state_spec(kind: &str) -> Option<&'static StateSpec> {
    CLIENT_STATES
        .iter()
        .find(|(name, _)| *name == kind)
        .map(|(_, spec)| spec)
}

/// Application settings, also the template for new client configs.
///
/// The key set is fixed: settings updates must carry exactly these keys.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub boot_image: String,
    pub boot_image_once: bool,
    pub unattended_config: String,
    pub uboot_script: String,
    pub do_unattended: bool,
    pub ipxe_build_arm64: String,
    pub ipxe_build_amd64: String,
    pub stage4: String,
    pub debian_mirror: String,
    pub ubuntu_mirror: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            boot_image: "standby_loop".to_string(),
            boot_image_once: false,
            unattended_config: "blank.cfg".to_string(),
            uboot_script: "default".to_string(),
            do_unattended: false,
            ipxe_build_arm64: String::new(),
            ipxe_build_amd64: String::new(),
            stage4: "none".to_string(),
            debian_mirror: "http://deb.debian.org/debian".to_string(),
            ubuntu_mirror: "http://archive.ubuntu.com/ubuntu".to_string(),
        }
    }
}

/// Per-client boot configuration, seeded from [`Settings`] when the client is
/// first sighted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub boot_image: String,
    pub unattended_config: String,
    pub do_unattended: bool,
    pub ipxe_build: String,
    pub uboot_script: String,
    pub stage4: String,
    pub boot_image_once: bool,
}

/// The state detail nested inside a client record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientStateDetail {
    pub active: bool,
    pub state: String,
    pub state_text: String,
    /// Empty when the state does not expire.
    pub state_expiration: String,
    pub state_expiration_action: String,
    pub error: bool,
    pub error_short: String,
    pub description: String,
}

/// Wire shape: the record's `state` field nests the detail next to a
/// reserved `data` slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientStateSlot {
    pub state: ClientStateDetail,
    #[serde(default)]
    pub data: Value,
}

/// Everything known about one client machine, indexed by MAC address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRecord {
    pub mac: String,
    pub ip: String,
    pub hostname: String,
    pub arch: String,
    pub info: Value,
    pub config: ClientConfig,
    pub state: ClientStateSlot,
}

/// Maintains and provides access to information, config, and state for every
/// client, and publishes the full list through the `clients` data source.
#[derive(Clone)]
pub struct ClientManager {
    records: Arc<DashMap<String, ClientRecord>>,
    settings: Arc<Mutex<Settings>>,
    settings_file: Option<PathBuf>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    provider: DataProvider,
}

impl ClientManager {
    /// Starts the manager, its expiration sweeper, and the `clients`
    /// provider. When `settings_file` is given, settings are read from it
    /// (creating it with defaults first if missing) and every settings
    /// update is written back.
    #[instrument(skip(link))]
    pub async fn start<L: BrokerLink>(
        link: &L,
        settings_file: Option<PathBuf>,
    ) -> anyhow::Result<ClientManager> {
        let records: Arc<DashMap<String, ClientRecord>> = Arc::new(DashMap::new());
        let settings = Arc::new(Mutex::new(load_settings(settings_file.as_deref())?));

        let list = records.clone();
        let provider = DataProvider::start(link, "clients", Arc::new(move || {
            clients_snapshot(&list)
        }))
        .await?;

        let tracker = TaskTracker::new();
        let cancel = CancellationToken::new();
        let manager = ClientManager {
            records: records.clone(),
            settings,
            settings_file,
            tracker: tracker.clone(),
            cancel: cancel.clone(),
            provider,
        };

        // expiration sweeper
        {
            let sweeper = manager.clone();
            tracker.spawn(async move {
                let mut ticks = tokio::time::interval(SWEEP_CYCLE);
                ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticks.tick() => sweeper.sweep_expirations(),
                    }
                }
            });
        }
        tracker.close();

        debug!("ClientManager is ready");
        Ok(manager)
    }

    /// Whether a record exists for this MAC.
    pub fn client_exists(&self, mac: &str) -> bool {
        self.records.contains_key(mac)
    }

    /// Creates a record for a newly sighted client. The IP is not known yet
    /// at DHCP time; it is filled in when the client starts fetching files.
    pub fn new_client(&self, mac: &str, info_dhcp: Value) -> anyhow::Result<()> {
        if self.client_exists(mac) {
            return Err(anyhow!("client entry with mac: {mac} already exists"));
        }
        let arch = info_dhcp
            .get("arch")
            .and_then(Value::as_str)
            .unwrap_or("amd64")
            .to_string();
        let settings = self.get_settings();
        let ipxe_build = match arch.as_str() {
            "arm64" => settings.ipxe_build_arm64.clone(),
            _ => settings.ipxe_build_amd64.clone(),
        };
        let record = ClientRecord {
            mac: mac.to_string(),
            ip: "0.0.0.0".to_string(),
            hostname: "unknown".to_string(),
            arch,
            info: serde_json::json!({ "dhcp": info_dhcp }),
            config: ClientConfig {
                boot_image: settings.boot_image.clone(),
                unattended_config: settings.unattended_config.clone(),
                do_unattended: settings.do_unattended,
                ipxe_build,
                uboot_script: settings.uboot_script.clone(),
                stage4: settings.stage4.clone(),
                boot_image_once: settings.boot_image_once,
            },
            state: build_state("dhcp", None)?,
        };
        self.records.insert(mac.to_string(), record);
        Ok(())
    }

    /// Full record for one client.
    pub fn get_client(&self, mac: &str) -> anyhow::Result<ClientRecord> {
        self.records
            .get(mac)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| anyhow!("no client with mac: {mac}"))
    }

    /// All client records, sorted by MAC for stable listings.
    pub fn get_clients(&self) -> Vec<ClientRecord> {
        let mut clients: Vec<ClientRecord> =
            self.records.iter().map(|entry| entry.value().clone()).collect();
        clients.sort_by(|a, b| a.mac.cmp(&b.mac));
        clients
    }

    /// Replaces a client's config wholesale; callers fetch the current state
    /// first and send the whole thing back.
    pub fn set_client_config(&self, mac: &str, config: Value) -> anyhow::Result<()> {
        let config: ClientConfig =
            serde_json::from_value(config).context("malformed client config")?;
        let mut entry = self
            .records
            .get_mut(mac)
            .ok_or_else(|| anyhow!("no client with mac: {mac}"))?;
        entry.config = config;
        debug!("successfully updated config for client with mac: {}", mac);
        Ok(())
    }

    /// Merges keys into a client's info object.
    pub fn set_client_info(&self, mac: &str, info: Value) -> anyhow::Result<()> {
        let updates = info
            .as_object()
            .ok_or_else(|| anyhow!("client info must be an object"))?
            .clone();
        let mut entry = self
            .records
            .get_mut(mac)
            .ok_or_else(|| anyhow!("no client with mac: {mac}"))?;
        if !entry.info.is_object() {
            entry.info = Value::Object(Default::default());
        }
        if let Some(existing) = entry.info.as_object_mut() {
            existing.extend(updates);
        }
        Ok(())
    }

    /// Moves a client to a state from the fixed table, stamping its
    /// expiration.
    pub fn set_client_state(&self, mac: &str, kind: &str) -> anyhow::Result<()> {
        let state = build_state(kind, None)?;
        let mut entry = self
            .records
            .get_mut(mac)
            .ok_or_else(|| anyhow!("no client with mac: {mac}"))?;
        debug!("client {} entering state: {}", mac, kind);
        entry.state = state;
        Ok(())
    }

    /// Moves a client to the error state with a short reason.
    pub fn set_client_error(&self, mac: &str, error_short: &str) -> anyhow::Result<()> {
        let state = build_state("error", Some(error_short))?;
        let mut entry = self
            .records
            .get_mut(mac)
            .ok_or_else(|| anyhow!("no client with mac: {mac}"))?;
        entry.state = state;
        Ok(())
    }

    pub fn set_client_ip(&self, mac: &str, ip: &str) -> anyhow::Result<()> {
        let mut entry = self
            .records
            .get_mut(mac)
            .ok_or_else(|| anyhow!("no client with mac: {mac}"))?;
        entry.ip = ip.to_string();
        Ok(())
    }

    pub fn set_client_hostname(&self, mac: &str, hostname: &str) -> anyhow::Result<()> {
        let mut entry = self
            .records
            .get_mut(mac)
            .ok_or_else(|| anyhow!("no client with mac: {mac}"))?;
        entry.hostname = hostname.to_string();
        Ok(())
    }

    pub fn delete_client(&self, mac: &str) -> anyhow::Result<()> {
        self.records
            .remove(mac)
            .map(|_| ())
            .ok_or_else(|| anyhow!("no client with mac: {mac}"))
    }

    /// Current application settings.
    pub fn get_settings(&self) -> Settings {
        self.settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Validates and stores new settings, persisting them when a settings
    /// file is configured. The key set must match exactly.
    pub fn set_settings(&self, new_settings: Value) -> anyhow::Result<()> {
        let parsed: Settings =
            serde_json::from_value(new_settings).context("settings validation failed")?;
        info!("saving settings");
        {
            let mut settings = self.settings.lock().unwrap_or_else(PoisonError::into_inner);
            *settings = parsed.clone();
        }
        if let Some(path) = &self.settings_file {
            save_settings(path, &parsed)?;
        }
        Ok(())
    }

    /// Applies expiration actions to any client whose state has run out.
    fn sweep_expirations(&self) {
        let mut transitions: Vec<(String, String)> = Vec::new();
        for entry in self.records.iter() {
            let detail = &entry.value().state.state;
            if detail.state_expiration.is_empty() || detail.state_expiration_action == "none" {
                continue;
            }
            if seconds_until(&detail.state_expiration) == 0 {
                transitions.push((entry.key().clone(), detail.state_expiration_action.clone()));
            }
        }
        for (mac, action) in transitions {
            debug!("state expired for client {}, applying action: {}", mac, action);
            let result = match action.as_str() {
                "complete" => self.set_client_state(&mac, "complete"),
                "inactive" => self.set_client_state(&mac, "inactive"),
                "error" => self.set_client_error(&mac, "state expired"),
                other => {
                    warn!("unknown expiration action: {}", other);
                    Ok(())
                }
            };
            if let Err(e) = result {
                warn!("failed to expire state for client {}: {}", mac, e);
            }
        }
    }

    /// Stops the sweeper and the `clients` provider.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        self.cancel.cancel();
        self.tracker.wait().await;
        self.provider.stop().await;
    }
}

fn build_state(kind: &str, error_short: Option<&str>) -> anyhow::Result<ClientStateSlot> {
    let spec = state_spec(kind).ok_or_else(|| anyhow!("unknown client state: {kind}"))?;
    let state_expiration = if spec.expiration_seconds > 0 {
        get_timestamp(spec.expiration_seconds)
    } else {
        String::new()
    };
    Ok(ClientStateSlot {
        state: ClientStateDetail {
            active: spec.active,
            state: kind.to_string(),
            state_text: spec.state_text.to_string(),
            state_expiration,
            state_expiration_action: spec.expiration_action.to_string(),
            error: spec.error,
            error_short: error_short.unwrap_or_default().to_string(),
            description: spec.description.to_string(),
        },
        data: serde_json::json!({ "comment": "reserved for future use" }),
    })
}

fn clients_snapshot(records: &DashMap<String, ClientRecord>) -> Value {
    let mut clients: Vec<ClientRecord> =
        records.iter().map(|entry| entry.value().clone()).collect();
    clients.sort_by(|a, b| a.mac.cmp(&b.mac));
    serde_json::to_value(clients).unwrap_or(Value::Array(Vec::new()))
}

fn load_settings(path: Option<&std::path::Path>) -> anyhow::Result<Settings> {
    let Some(path) = path else {
        return Ok(Settings::default());
    };
    if !path.is_file() {
        info!("creating a fresh settings file with defaults");
        let defaults = Settings::default();
        save_settings(path, &defaults)?;
        return Ok(defaults);
    }
    debug!("reading settings from file: {}", path.display());
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("could not read settings file: {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("could not parse settings file: {}", path.display()))
}

fn save_settings(path: &std::path::Path, settings: &Settings) -> anyhow::Result<()> {
    debug!("writing settings to file: {}", path.display());
    let raw = serde_json::to_string(settings)?;
    std::fs::write(path, raw)
        .with_context(|| format!("could not write settings file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_table_covers_the_lifecycle() {
        for kind in ["dhcp", "uboot", "ipxe", "stage2", "unattended", "stage4", "complete", "inactive", "error"] {
            assert!(state_spec(kind).is_some(), "missing state: {kind}");
        }
        assert!(state_spec("nonsense").is_none());
    }

    #[test]
    fn non_expiring_states_have_no_timestamp() {
        let slot = build_state("inactive", None).unwrap();
        assert_eq!(slot.state.state_expiration, "");
        assert!(!slot.state.active);

        let slot = build_state("dhcp", None).unwrap();
        assert!(!slot.state.state_expiration.is_empty());
        assert_eq!(slot.state.state_expiration_action, "complete");
    }

    #[test]
    fn settings_reject_unknown_and_missing_keys() {
        let mut wire = serde_json::to_value(Settings::default()).unwrap();
        assert!(serde_json::from_value::<Settings>(wire.clone()).is_ok());

        wire.as_object_mut().unwrap().insert("bogus".into(), Value::Bool(true));
        assert!(serde_json::from_value::<Settings>(wire.clone()).is_err());

        wire.as_object_mut().unwrap().remove("bogus");
        wire.as_object_mut().unwrap().remove("boot_image");
        assert!(serde_json::from_value::<Settings>(wire).is_err());
    }
}
