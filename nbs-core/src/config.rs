/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     you may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

use std::time::Duration;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

/// Configuration for Netboot Studio
///
/// This struct contains all configurable values for the messaging layer,
/// loaded from TOML files in XDG-compliant directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct StudioConfig {
    /// Broker configuration
    pub broker: BrokerConfig,
    /// Timeout configuration
    pub timeouts: TimeoutConfig,
    /// Path configuration for various directories
    pub paths: PathsConfig,
    /// Tracing and logging configuration
    pub tracing: TracingConfig,
}

/// Broker-related configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Default channel size for subscriber inboxes
    pub channel_capacity: usize,
    /// Dummy channel size for closed/default channels
    pub dummy_channel_size: usize,
}

/// Timeout-related configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// How long a correlated API call waits for its response in milliseconds
    pub request_timeout_ms: u64,
    /// How often a data provider polls its supplier in milliseconds
    pub scan_cycle_ms: u64,
    /// Default shutdown timeout in milliseconds
    pub shutdown_timeout_ms: u64,
}

/// Path configuration for various directories
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory for log files
    pub log_directory: String,
    /// Directory for configuration files
    pub config_directory: String,
}

/// Tracing and logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Enable tracing
    pub enable_tracing: bool,
    /// Default tracing level
    pub default_level: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 255,
            dummy_channel_size: 1,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 5_000,
            scan_cycle_ms: 1_000,
            shutdown_timeout_ms: 10_000,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            log_directory: "~/.local/share/netboot-studio/logs".to_string(),
            config_directory: "~/.config/netboot-studio".to_string(),
        }
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enable_tracing: true,
            default_level: "info".to_string(),
        }
    }
}

impl StudioConfig {
    /// Convert the request timeout to a Duration
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.request_timeout_ms)
    }

    /// Convert the provider scan cycle to a Duration
    pub const fn scan_cycle(&self) -> Duration {
        Duration::from_millis(self.timeouts.scan_cycle_ms)
    }

    /// Load configuration from XDG-compliant locations
    ///
    /// This function attempts to load configuration from
    /// `$XDG_CONFIG_HOME/netboot-studio/config.toml`, falling back through
    /// the platform's usual config directories.
    ///
    /// If no configuration file is found, returns the default configuration.
    /// If a configuration file exists but is malformed, logs an error and uses defaults.
    pub fn load() -> Self {
        use tracing::{error, info};

        let xdg_dirs = match xdg::BaseDirectories::with_prefix("netboot-studio") {
            Ok(dirs) => dirs,
            Err(e) => {
                error!("Failed to initialize XDG directories: {}", e);
                return Self::default();
            }
        };

        let config_path = xdg_dirs.find_config_file("config.toml");

        if let Some(path) = config_path {
            info!("Loading configuration from: {}", path.display());
            match std::fs::read_to_string(&path) {
                Ok(config_str) => match toml::from_str::<Self>(&config_str) {
                    Ok(config) => {
                        info!("Successfully loaded configuration");
                        config
                    }
                    Err(e) => {
                        error!("Failed to parse configuration file {}: {}", path.display(), e);
                        Self::default()
                    }
                },
                Err(e) => {
                    error!("Failed to read configuration file {}: {}", path.display(), e);
                    Self::default()
                }
            }
        } else {
            info!("No configuration file found, using defaults");
            Self::default()
        }
    }
}

lazy_static! {
    /// Global configuration instance loaded from XDG-compliant locations
    pub static ref CONFIG: StudioConfig = StudioConfig::load();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let config = StudioConfig::default();
        assert_eq!(config.broker.channel_capacity, 255);
        assert_eq!(config.request_timeout(), Duration::from_millis(5_000));
        assert_eq!(config.scan_cycle(), Duration::from_millis(1_000));
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: StudioConfig =
            toml::from_str("[timeouts]\nrequest_timeout_ms = 250\n").unwrap();
        assert_eq!(config.timeouts.request_timeout_ms, 250);
        assert_eq!(config.timeouts.scan_cycle_ms, 1_000);
        assert_eq!(config.broker.channel_capacity, 255);
    }
}
