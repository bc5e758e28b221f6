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

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle states of a task.
///
/// Serialized with the capitalized names below; the console's action rules
/// key on those exact strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Queued,
    Initialized,
    Starting,
    Running,
    Stopping,
    Complete,
    Failed,
}

impl TaskStatus {
    /// Whether the task has reached a state it will not leave on its own.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Complete | TaskStatus::Failed)
    }
}

/// One entry in the live task list, as streamed to the consoles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    /// Task id. Usually a UUID, but not always: file uploads report ids
    /// like `fileupload_<id>`.
    pub task_id: String,
    pub task_name: String,
    pub task_description: String,
    pub task_type: String,
    pub task_status: TaskStatus,
    /// 0-100.
    pub task_progress: u8,
    pub task_progress_description: String,
    #[serde(default)]
    pub task_current_subtask: String,
    /// Subtask name to description, in declaration order.
    #[serde(default)]
    pub task_subtask_descriptions: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_capitalized() {
        assert_eq!(serde_json::to_value(TaskStatus::Queued).unwrap(), "Queued");
        assert_eq!(serde_json::to_value(TaskStatus::Complete).unwrap(), "Complete");
        assert_eq!(serde_json::to_value(TaskStatus::Failed).unwrap(), "Failed");
    }

    #[test]
    fn reports_tolerate_missing_subtask_fields() {
        // the uploader publishes reports without subtask bookkeeping
        let report: TaskReport = serde_json::from_str(
            r#"{
                "task_id": "fileupload_abc",
                "task_name": "Upload: image.iso",
                "task_description": "Uploading file: image.iso",
                "task_type": "file_upload",
                "task_status": "Running",
                "task_progress": 40,
                "task_progress_description": "40%"
            }"#,
        )
        .unwrap();
        assert_eq!(report.task_status, TaskStatus::Running);
        assert_eq!(report.task_current_subtask, "");
    }
}
