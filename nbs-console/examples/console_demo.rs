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

//! Wires the whole stack together in one process: broker, services, and a
//! console session that kicks off the demonstration task and follows it in
//! the live task list.
//!
//! Run with: `cargo run --example console_demo`

use std::time::Duration;

use serde_json::json;
use tracing_subscriber::EnvFilter;

use nbs_console::prelude::*;
use nbs_services::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let broker = MessageBroker::new();
    let config_dir = tempfile::tempdir()?;

    // the service side
    let tasks = TaskManager::start(&broker, TaskRegistry::with_demo_tasks()).await?;
    let clients = ClientManager::start(&broker, Some(config_dir.path().join("settings.json"))).await?;
    let files = FileManager::start(&broker, config_dir.path().to_path_buf()).await?;
    let processor =
        MessageProcessor::start(&broker, tasks.clone(), clients.clone(), files.clone()).await;

    // a client machine shows up
    clients.new_client("aa:bb:cc:dd:ee:ff", json!({"arch": "amd64"}))?;

    // the console side
    let session = ConsoleSession::connect(broker.clone()).await;
    println!("connected as {}", session.client_name());

    let listed = session.get_clients().await?;
    println!("clients: {}", serde_json::to_string_pretty(&listed)?);

    let task_list = TaskList::attach(&session).await?;
    session.create_task("fake_longtask", json!({})).await?;
    println!("created a task, watching the task list...");

    let mut updates = task_list.table().watch_rows();
    loop {
        updates.changed().await?;
        let rows = updates.borrow().clone();
        let Some(entry) = rows.first() else { continue };
        println!(
            "  {:>8} {:>4}% {}",
            entry["task_status"].as_str().unwrap_or("?"),
            entry["task_progress"],
            entry["task_progress_description"].as_str().unwrap_or(""),
        );
        if entry["task_status"] == "Complete" || entry["task_status"] == "Failed" {
            break;
        }
    }

    let task_id = task_list.entries()[0]["task_id"].as_str().unwrap_or_default().to_string();
    let log = session.task_action(&task_id, "log").await?;
    println!("task log:\n{}", log.as_str().unwrap_or_default());

    session.shutdown().await;
    processor.stop().await;
    tasks.stop().await;
    clients.stop().await;
    files.stop().await;
    broker.stop();
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(())
}
