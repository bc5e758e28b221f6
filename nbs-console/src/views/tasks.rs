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

use nbs_core::prelude::*;

use crate::session::ConsoleSession;
use crate::views::table::{Column, SourceTable, TableConfig};

/// The actions offered on a task row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    /// View the task's log file.
    Log,
    /// Stop the task.
    Stop,
    /// Retry the task. Offered but not wired up: the original payload is not
    /// retained anywhere it could be replayed from.
    Retry,
    /// Clear the task from the list.
    Clear,
}

/// Which actions a task's status makes available.
pub fn available_actions(task_status: &str) -> Vec<TaskAction> {
    let mut actions = Vec::new();
    if matches!(task_status, "Starting" | "Running" | "Stopping" | "Complete" | "Failed") {
        actions.push(TaskAction::Log);
    }
    if matches!(task_status, "Starting" | "Running") {
        actions.push(TaskAction::Stop);
    }
    if task_status == "Failed" {
        actions.push(TaskAction::Retry);
    }
    if matches!(task_status, "Complete" | "Failed") {
        actions.push(TaskAction::Clear);
    }
    actions
}

/// The live task list shown at the bottom of every tab.
pub struct TaskList {
    table: SourceTable,
}

impl TaskList {
    /// Attaches to the `tasks` data source.
    pub async fn attach<L: BrokerLink>(
        session: &ConsoleSession<L>,
    ) -> Result<TaskList, TransportError> {
        let config = TableConfig {
            source: "tasks",
            columns: vec![
                Column { key: "task_name", display: "Name", width: 20 },
                Column { key: "task_description", display: "Description", width: 20 },
                Column { key: "task_status", display: "Status", width: 10 },
                Column { key: "task_progress", display: "Progress", width: 10 },
                Column { key: "task_progress_description", display: "Progress Description", width: 20 },
            ],
            filter: None,
        };
        let table = SourceTable::attach(session, config).await?;
        Ok(TaskList { table })
    }

    pub fn table(&self) -> &SourceTable {
        &self.table
    }

    /// Current entries, newest first.
    pub fn entries(&self) -> Vec<Value> {
        self.table.rows()
    }

    /// The actions available on one entry.
    pub fn actions_for(entry: &Value) -> Vec<TaskAction> {
        let status = entry
            .get("task_status")
            .and_then(Value::as_str)
            .unwrap_or_default();
        available_actions(status)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn running_tasks_offer_log_and_stop() {
        assert_eq!(
            available_actions("Running"),
            vec![TaskAction::Log, TaskAction::Stop]
        );
        assert_eq!(
            available_actions("Starting"),
            vec![TaskAction::Log, TaskAction::Stop]
        );
    }

    #[test]
    fn failed_tasks_offer_everything_but_stop() {
        assert_eq!(
            available_actions("Failed"),
            vec![TaskAction::Log, TaskAction::Retry, TaskAction::Clear]
        );
    }

    #[test]
    fn complete_tasks_offer_log_and_clear() {
        assert_eq!(
            available_actions("Complete"),
            vec![TaskAction::Log, TaskAction::Clear]
        );
    }

    #[test]
    fn queued_tasks_offer_nothing_yet() {
        assert!(available_actions("Queued").is_empty());
        assert!(available_actions("").is_empty());
    }

    #[test]
    fn actions_read_the_status_field() {
        let entry = json!({"task_id": "t", "task_status": "Stopping"});
        assert_eq!(TaskList::actions_for(&entry), vec![TaskAction::Log]);
    }
}
