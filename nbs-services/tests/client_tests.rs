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
use std::time::Duration;

use serde_json::json;

use nbs_core::prelude::*;
use nbs_services::prelude::*;

use crate::setup::*;

mod setup;

#[tokio::test]
async fn new_clients_start_from_the_settings_template() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MessageBroker::new();
    let manager = ClientManager::start(&broker, None).await?;

    manager.new_client("aa:bb:cc:dd:ee:01", json!({"arch": "arm64"}))?;
    let client = manager.get_client("aa:bb:cc:dd:ee:01")?;

    assert_eq!(client.ip, "0.0.0.0");
    assert_eq!(client.hostname, "unknown");
    assert_eq!(client.arch, "arm64");
    assert_eq!(client.config.boot_image, "standby_loop");
    assert_eq!(client.state.state.state, "dhcp");
    assert!(client.state.state.active);
    assert!(!client.state.state.state_expiration.is_empty());
    assert_eq!(client.info["dhcp"]["arch"], "arm64");

    // a second sighting of the same mac is refused
    assert!(manager.new_client("aa:bb:cc:dd:ee:01", json!({})).is_err());

    manager.stop().await;
    broker.stop();
    Ok(())
}

#[tokio::test]
async fn state_transitions_restamp_expirations() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MessageBroker::new();
    let manager = ClientManager::start(&broker, None).await?;

    manager.new_client("aa:bb:cc:dd:ee:02", json!({"arch": "amd64"}))?;
    manager.set_client_state("aa:bb:cc:dd:ee:02", "ipxe")?;
    let client = manager.get_client("aa:bb:cc:dd:ee:02")?;
    assert_eq!(client.state.state.state, "ipxe");
    assert_eq!(client.state.state.state_expiration_action, "error");
    assert!(seconds_until(&client.state.state.state_expiration) > 500);

    // inactive never expires
    manager.set_client_state("aa:bb:cc:dd:ee:02", "inactive")?;
    let client = manager.get_client("aa:bb:cc:dd:ee:02")?;
    assert_eq!(client.state.state.state_expiration, "");
    assert!(!client.state.state.active);

    assert!(manager.set_client_state("aa:bb:cc:dd:ee:02", "warp").is_err());

    manager.stop().await;
    broker.stop();
    Ok(())
}

#[tokio::test]
async fn the_clients_data_source_tracks_the_records() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MessageBroker::new();
    let manager = ClientManager::start(&broker, None).await?;
    let consumer = DataSource::subscribe(&broker, "clients", None).await?;

    manager.new_client("aa:bb:cc:dd:ee:03", json!({"arch": "amd64"}))?;
    manager.set_client_hostname("aa:bb:cc:dd:ee:03", "builder-03")?;

    for _ in 0..300 {
        let seen = consumer.get_value();
        if seen
            .as_array()
            .and_then(|list| list.first())
            .map(|entry| entry["hostname"] == "builder-03")
            .unwrap_or(false)
        {
            manager.stop().await;
            consumer.stop().await;
            broker.stop();
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("data source never saw the client: {}", consumer.get_value());
}

#[tokio::test]
async fn settings_persist_across_restarts() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MessageBroker::new();
    let dir = tempfile::tempdir()?;
    let settings_file = dir.path().join("settings.json");

    let manager = ClientManager::start(&broker, Some(settings_file.clone())).await?;
    let mut settings = serde_json::to_value(manager.get_settings())?;
    settings["stage4"] = json!("provision.sh");
    manager.set_settings(settings)?;
    manager.stop().await;

    let manager = ClientManager::start(&broker, Some(settings_file)).await?;
    assert_eq!(manager.get_settings().stage4, "provision.sh");

    manager.stop().await;
    broker.stop();
    Ok(())
}
