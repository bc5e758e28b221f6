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

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::tasks::{TaskReport, TaskStatus};

/// One step of a task: a name, what to tell the user, and the progress
/// milestone reported just before it runs.
#[derive(Debug, Clone)]
pub struct Subtask {
    pub name: &'static str,
    pub description: &'static str,
    pub progress: u8,
}

/// A long-running job executed by the task manager.
///
/// A task declares its subtasks up front; the runner walks them in order and
/// handles all status reporting. Implementations only do the work.
#[async_trait]
pub trait Task: Send {
    /// Keys that must be present in the task payload. Checked before the
    /// first subtask runs.
    fn required_keys(&self) -> &'static [&'static str] {
        &[]
    }

    /// The ordered subtasks.
    fn subtasks(&self) -> Vec<Subtask>;

    /// Runs the named subtask.
    async fn run_subtask(&mut self, name: &str, ctx: &TaskContext) -> anyhow::Result<()>;
}

/// Handed to each subtask: its log sink and the cooperative stop signal.
#[derive(Debug, Clone)]
pub struct TaskContext {
    log: Arc<Mutex<String>>,
    cancel: CancellationToken,
}

impl TaskContext {
    pub(crate) fn new(log: Arc<Mutex<String>>, cancel: CancellationToken) -> Self {
        TaskContext { log, cancel }
    }

    /// Appends one line to the task's log.
    pub fn log_line(&self, line: &str) {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        log.push_str(line);
        log.push('\n');
    }

    /// Whether a stop has been requested. The runner checks this between
    /// subtasks; long subtasks may check it themselves to bail early.
    pub fn is_stopping(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Drives one task through its lifecycle, reporting status along the way.
pub(crate) struct TaskRunner {
    pub(crate) task_id: String,
    pub(crate) task_name: String,
    pub(crate) task_description: String,
    pub(crate) task_type: String,
    pub(crate) payload: Value,
    pub(crate) reporter: mpsc::Sender<TaskReport>,
    pub(crate) ctx: TaskContext,
}

impl TaskRunner {
    async fn report(
        &self,
        status: TaskStatus,
        progress: u8,
        description: &str,
        current_subtask: &str,
        subtask_descriptions: &Value,
    ) {
        let report = TaskReport {
            task_id: self.task_id.clone(),
            task_name: self.task_name.clone(),
            task_description: self.task_description.clone(),
            task_type: self.task_type.clone(),
            task_status: status,
            task_progress: progress,
            task_progress_description: description.to_string(),
            task_current_subtask: current_subtask.to_string(),
            task_subtask_descriptions: subtask_descriptions.clone(),
        };
        if let Err(e) = self.reporter.send(report).await {
            error!("failed to report task status: {}", e);
        }
    }

    fn missing_required_key(&self, task: &dyn Task) -> Option<&'static str> {
        let payload = self.payload.as_object();
        task.required_keys()
            .iter()
            .find(|key| payload.map_or(true, |map| !map.contains_key(**key)))
            .copied()
    }

    /// Runs the task to completion, failure, or a requested stop.
    #[instrument(skip(self, task), fields(task_id = %self.task_id, task_type = %self.task_type))]
    pub(crate) async fn run(&self, mut task: Box<dyn Task>) {
        let subtasks = task.subtasks();
        let descriptions = Value::Object(
            subtasks
                .iter()
                .map(|s| (s.name.to_string(), Value::String(s.description.to_string())))
                .collect::<Map<String, Value>>(),
        );

        info!("Starting Task: {}", self.task_id);
        self.report(TaskStatus::Starting, 0, "Starting subtasks", "", &descriptions)
            .await;

        if let Some(key) = self.missing_required_key(task.as_ref()) {
            let message = format!("missing required key in task_payload: {key}");
            error!("Failed Task: {} : {}", self.task_id, message);
            self.report(TaskStatus::Failed, 0, &message, "", &descriptions).await;
            return;
        }

        let mut progress = 0u8;
        for subtask in &subtasks {
            if self.ctx.is_stopping() {
                info!("Stopping Task: {}", self.task_id);
                self.report(
                    TaskStatus::Stopping,
                    progress,
                    "stopping before next subtask",
                    subtask.name,
                    &descriptions,
                )
                .await;
                self.report(
                    TaskStatus::Failed,
                    progress,
                    "stopped by request",
                    "",
                    &descriptions,
                )
                .await;
                return;
            }
            progress = subtask.progress;
            self.report(
                TaskStatus::Running,
                subtask.progress,
                subtask.description,
                subtask.name,
                &descriptions,
            )
            .await;
            if let Err(e) = task.run_subtask(subtask.name, &self.ctx).await {
                let message = format!("subtask failed: {}", subtask.name);
                self.ctx.log_line(&format!("{message}: {e}"));
                error!("Failed Task: {} : {}: {}", self.task_id, message, e);
                self.report(TaskStatus::Failed, 0, &message, subtask.name, &descriptions)
                    .await;
                return;
            }
        }

        info!("Completed Task: {}", self.task_id);
        self.report(TaskStatus::Complete, 100, "Success", "", &descriptions)
            .await;
    }
}
