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

use std::sync::{Arc, PoisonError, RwLock};

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::*;
use uuid::Uuid;

use nbs_core::prelude::*;

/// One console's connection to Netboot Studio.
///
/// Owns the API correlator and the data-source register. The register is the
/// shared-subscription model: the session holds a single wildcard
/// subscription covering every data-source topic and routes each message to
/// all registered sources with a matching name, so any number of views can
/// watch the same source without extra broker traffic. Sources sharing a
/// name are notified independently.
#[derive(Clone)]
pub struct ConsoleSession<L: BrokerLink> {
    link: L,
    client_name: String,
    api: ApiClient<L>,
    register: SourceRegister,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

type SourceRegister = Arc<RwLock<Vec<DataSource>>>;

impl<L: BrokerLink> ConsoleSession<L> {
    /// Connects: starts the correlator and the data-source router.
    #[instrument(skip(link))]
    pub async fn connect(link: L) -> ConsoleSession<L> {
        let client_name = format!("NSWebUI-{}", Uuid::new_v4());
        debug!("connecting console session: {}", client_name);
        let api = ApiClient::start(link.clone(), &client_name).await;
        let register: SourceRegister = Arc::new(RwLock::new(Vec::new()));

        let tracker = TaskTracker::new();
        let cancel = CancellationToken::new();
        let mut subscription = link.subscribe(topics::DATA_SOURCE_WILDCARD).await;
        {
            let register = register.clone();
            let cancel = cancel.clone();
            tracker.spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        incoming = subscription.inbox.recv() => {
                            let Some(message) = incoming else { break; };
                            route_source_message(&register, &message);
                        }
                    }
                }
                trace!("data source router finished");
            });
        }
        tracker.close();

        ConsoleSession {
            link,
            client_name,
            api,
            register,
            tracker,
            cancel,
        }
    }

    /// The `NSWebUI-<uuid>` name this session signs its messages with.
    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    /// Registers a consumer for a named data source and asks the provider
    /// for the current value.
    pub async fn subscribe_to_datasource(
        &self,
        name: &str,
        on_change: Option<ChangeCallback>,
    ) -> Result<DataSource, TransportError> {
        info!("subscribing to data source: {}", name);
        let source = DataSource::new(name, on_change);
        self.register
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(source.clone());
        source.request_current(&self.link).await?;
        Ok(source)
    }

    /// The first registered source with this name, if any.
    pub fn data_source_by_name(&self, name: &str) -> Option<DataSource> {
        self.register
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|source| source.name() == name)
            .cloned()
    }

    /// Makes an API call with the configured request timeout.
    pub async fn call(&self, endpoint: &str, payload: Value) -> Result<Value, TransportError> {
        self.api
            .call_with_timeout(endpoint, payload, CONFIG.request_timeout())
            .await
    }

    // typed wrappers over the endpoint table

    pub async fn get_clients(&self) -> Result<Value, TransportError> {
        self.call("get_clients", json!({})).await
    }

    pub async fn get_client(&self, mac: &str) -> Result<Value, TransportError> {
        self.call("get_client", json!({ "mac": mac })).await
    }

    pub async fn set_client_config(&self, mac: &str, config: Value) -> Result<Value, TransportError> {
        self.call("set_client_config", json!({ "mac": mac, "config": config })).await
    }

    pub async fn set_client_info(&self, mac: &str, info: Value) -> Result<Value, TransportError> {
        self.call("set_client_info", json!({ "mac": mac, "info": info })).await
    }

    pub async fn delete_client(&self, mac: &str) -> Result<Value, TransportError> {
        self.call("delete_client", json!({ "mac": mac })).await
    }

    pub async fn create_task(&self, task_type: &str, task_payload: Value) -> Result<Value, TransportError> {
        self.call(
            "create_task",
            json!({ "task_type": task_type, "task_payload": task_payload }),
        )
        .await
    }

    pub async fn task_action(&self, task_id: &str, action: &str) -> Result<Value, TransportError> {
        self.call("task_action", json!({ "task_id": task_id, "action": action })).await
    }

    pub async fn get_file(&self, category: &str, file_name: &str) -> Result<Value, TransportError> {
        self.call(
            "get_file",
            json!({ "file_name": file_name, "file_category": category }),
        )
        .await
    }

    pub async fn get_settings(&self) -> Result<Value, TransportError> {
        self.call("get_settings", json!({})).await
    }

    pub async fn set_settings(&self, settings: Value) -> Result<Value, TransportError> {
        self.call("set_settings", json!({ "settings": settings })).await
    }

    pub async fn delete_boot_image(&self, name: &str) -> Result<Value, TransportError> {
        self.call("delete_boot_image", json!({ "name": name })).await
    }

    pub async fn delete_unattended_config(&self, filename: &str) -> Result<Value, TransportError> {
        self.call("delete_unattended_config", json!({ "filename": filename })).await
    }

    pub async fn delete_stage1_file(&self, filename: &str) -> Result<Value, TransportError> {
        self.call("delete_stage1_file", json!({ "filename": filename })).await
    }

    pub async fn delete_uboot_script(&self, filename: &str) -> Result<Value, TransportError> {
        self.call("delete_uboot_script", json!({ "filename": filename })).await
    }

    pub async fn delete_iso(&self, filename: &str) -> Result<Value, TransportError> {
        self.call("delete_iso", json!({ "filename": filename })).await
    }

    pub async fn delete_stage4(&self, filename: &str) -> Result<Value, TransportError> {
        self.call("delete_stage4", json!({ "filename": filename })).await
    }

    pub async fn delete_ipxe_build(&self, build_id: &str) -> Result<Value, TransportError> {
        self.call("delete_ipxe_build", json!({ "build_id": build_id })).await
    }

    pub async fn delete_wimboot_build(&self, build_id: &str) -> Result<Value, TransportError> {
        self.call("delete_wimboot_build", json!({ "build_id": build_id })).await
    }

    /// Disconnects: stops the router and fails any pending calls.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        debug!("shutting down console session: {}", self.client_name);
        self.cancel.cancel();
        self.tracker.wait().await;
        self.api.stop().await;
        self.register
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Deliver a data-source message to every registered source with a matching
/// name.
fn route_source_message(register: &SourceRegister, message: &Message) {
    let Some(topic) = message.topic.as_deref() else {
        return;
    };
    let Some(name) = topics::data_source_name(topic) else {
        trace!("ignoring message on topic: {}", topic);
        return;
    };
    let matching: Vec<DataSource> = register
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .filter(|source| source.name() == name)
        .cloned()
        .collect();
    for source in matching {
        source.handle_message(message);
    }
}
