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

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::*;

use nbs_core::prelude::*;

use crate::clients::ClientManager;
use crate::files::{FileCategory, FileManager};
use crate::tasks::TaskManager;

/// Dispatches `api_request` messages to the managers and answers on
/// `api_response`.
///
/// Every response is decorated with the request id, the endpoint, and the
/// request payload, so consoles can correlate and diagnose without keeping a
/// copy of the request. Handler failures become status-500 responses, never
/// a dead processor.
#[derive(Clone)]
pub struct MessageProcessor {
    tasks: TaskManager,
    clients: ClientManager,
    files: FileManager,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl MessageProcessor {
    /// Subscribes to `api_request` and starts answering.
    #[instrument(skip_all)]
    pub async fn start<L: BrokerLink>(
        link: &L,
        tasks: TaskManager,
        clients: ClientManager,
        files: FileManager,
    ) -> MessageProcessor {
        let mut subscription = link.subscribe(topics::API_REQUEST).await;
        let tracker = TaskTracker::new();
        let cancel = CancellationToken::new();
        let processor = MessageProcessor {
            tasks,
            clients,
            files,
            tracker: tracker.clone(),
            cancel: cancel.clone(),
        };

        let worker = processor.clone();
        let link = link.clone();
        tracker.spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    incoming = subscription.inbox.recv() => {
                        let Some(message) = incoming else { break; };
                        if let Some(response) = worker.handle(message, "broker").await {
                            if let Err(e) = link.publish(topics::API_RESPONSE, response).await {
                                error!("failed to publish api response: {}", e);
                            }
                        }
                    }
                }
            }
            trace!("message processor finished");
        });
        tracker.close();

        processor
    }

    /// Handles one inbound message, producing the response to publish.
    ///
    /// Messages on anything but `api_request` are refused; requests whose
    /// content lacks a correlation id cannot be answered at all and are
    /// dropped with an error log.
    pub async fn handle(&self, mut message: Message, origin: &str) -> Option<Message> {
        message.origin = Some(origin.to_string());
        if message.topic.as_deref() != Some(topics::API_REQUEST) {
            info!("dont know how to handle message topic: {:?}", message.topic);
            return None;
        }
        let call: ApiCallContent = match serde_json::from_value(message.content.clone()) {
            Ok(call) => call,
            Err(e) => {
                error!("discarding api request with malformed content: {}", e);
                return None;
            }
        };

        let outcome = self.dispatch(&call.endpoint, &call.api_payload).await;
        let (status, api_payload) = match outcome {
            Ok(result) => (200, ApiResultPayload { result: Some(result), error: None }),
            Err(error) => (500, ApiResultPayload { result: None, error: Some(error) }),
        };
        let response = ApiResponseContent {
            status,
            id: call.id,
            endpoint: Some(call.endpoint),
            request_payload: Some(call.api_payload),
            api_payload,
        };
        let content = match serde_json::to_value(&response) {
            Ok(content) => content,
            Err(e) => {
                error!("could not encode api response: {}", e);
                return None;
            }
        };
        Some(
            Message::new()
                .with_sender("MessageProcessor")
                .with_origin("MessageProcessor")
                .with_content(content),
        )
    }

    /// The endpoint table.
    async fn dispatch(&self, endpoint: &str, payload: &Value) -> Result<Value, String> {
        match endpoint {
            "get_ipxe_builds" => self.listing(FileCategory::IpxeBuilds, payload),
            "get_wimboot_builds" => self.listing(FileCategory::WimbootBuilds, payload),
            "get_stage1_files" => self.listing(FileCategory::Stage1Files, payload),
            "get_uboot_scripts" => self.listing(FileCategory::UbootScripts, payload),
            "get_boot_images" => self.listing(FileCategory::BootImages, payload),
            "get_unattended_configs" => self.listing(FileCategory::UnattendedConfigs, payload),

            "get_client" => {
                let mac = require_str(payload, "mac")?;
                debug!("getting client config for mac: {}", mac);
                let client = self.clients.get_client(mac).map_err(stringify)?;
                serde_json::to_value(client).map_err(stringify)
            }
            "get_clients" => {
                serde_json::to_value(self.clients.get_clients()).map_err(stringify)
            }
            "set_client_config" => {
                let mac = require_str(payload, "mac")?;
                let config = payload
                    .get("config")
                    .cloned()
                    .ok_or_else(missing_keys)?;
                debug!("setting client config for mac: {}", mac);
                self.clients.set_client_config(mac, config).map_err(stringify)?;
                Ok(Value::String("Success".into()))
            }
            "set_client_info" => {
                let mac = require_str(payload, "mac")?;
                let info = payload.get("info").cloned().ok_or_else(missing_keys)?;
                self.clients.set_client_info(mac, info).map_err(stringify)?;
                Ok(Value::String("Success".into()))
            }
            "delete_client" => {
                let mac = require_str(payload, "mac")?;
                self.clients.delete_client(mac).map_err(stringify)?;
                Ok(Value::String("Success".into()))
            }

            "create_task" => {
                self.tasks.stage(payload.clone()).await.map_err(stringify)?;
                Ok(Value::String("Success".into()))
            }
            "task_action" => {
                let task_id = require_str(payload, "task_id")?;
                let action = require_str(payload, "action")?;
                self.tasks.task_action(task_id, action).map_err(stringify)
            }

            "delete_boot_image" => {
                let name = require_str(payload, "name")?;
                self.files.delete_boot_image(name).map_err(stringify)?;
                Ok(Value::String("Success".into()))
            }
            "delete_unattended_config" => self.delete_listed(FileCategory::UnattendedConfigs, payload),
            "delete_stage1_file" => self.delete_listed(FileCategory::Stage1Files, payload),
            "delete_uboot_script" => self.delete_listed(FileCategory::UbootScripts, payload),
            "delete_iso" => self.delete_listed(FileCategory::Iso, payload),
            "delete_stage4" => self.delete_listed(FileCategory::Stage4, payload),
            "delete_ipxe_build" => {
                let build_id = require_str(payload, "build_id")?;
                self.files
                    .delete_build(FileCategory::IpxeBuilds, build_id)
                    .map_err(stringify)?;
                Ok(Value::String("Success".into()))
            }
            "delete_wimboot_build" => {
                let build_id = require_str(payload, "build_id")?;
                self.files
                    .delete_build(FileCategory::WimbootBuilds, build_id)
                    .map_err(stringify)?;
                Ok(Value::String("Success".into()))
            }

            "get_settings" => {
                debug!("getting settings");
                serde_json::to_value(self.clients.get_settings()).map_err(stringify)
            }
            "set_settings" => {
                let settings = payload.get("settings").cloned().ok_or_else(missing_keys)?;
                self.clients.set_settings(settings).map_err(stringify)?;
                Ok(Value::String("Success".into()))
            }

            "get_file" => {
                let name = require_str(payload, "file_name")?;
                let category: FileCategory = require_str(payload, "file_category")?
                    .parse()
                    .map_err(stringify)?;
                let content = self.files.read_file(category, name).map_err(stringify)?;
                Ok(serde_json::json!({
                    "file_name": name,
                    "file_category": category.as_str(),
                    "content": content,
                }))
            }

            other => {
                error!("unrecognized api endpoint: {}", other);
                Err("unrecognized endpoint".to_string())
            }
        }
    }

    fn listing(&self, category: FileCategory, payload: &Value) -> Result<Value, String> {
        if payload.as_object().is_some_and(|map| !map.is_empty()) {
            warn!("this endpoint does not take any payload keys");
        }
        Ok(Value::Array(self.files.get_files(category)))
    }

    fn delete_listed(&self, category: FileCategory, payload: &Value) -> Result<Value, String> {
        let filename = require_str(payload, "filename")?;
        self.files.delete_file(category, filename).map_err(stringify)?;
        Ok(Value::String("Success".into()))
    }

    /// Stops answering requests. The managers keep running; stop them
    /// separately.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        self.cancel.cancel();
        self.tracker.wait().await;
    }
}

fn require_str<'a>(payload: &'a Value, key: &str) -> Result<&'a str, String> {
    payload.get(key).and_then(Value::as_str).ok_or_else(missing_keys)
}

fn missing_keys() -> String {
    "missing needed keys in payload".to_string()
}

fn stringify(e: impl std::fmt::Display) -> String {
    e.to_string()
}
