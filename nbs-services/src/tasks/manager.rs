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

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::anyhow;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::*;
use uuid::Uuid;

use nbs_core::prelude::*;

use crate::tasks::task::TaskRunner;
use crate::tasks::{FakeLongTask, Task, TaskContext, TaskReport, TaskStatus};

/// Number of workers executing tasks concurrently.
const TASK_WORKERS: usize = 4;

/// Depth of the staging and work queues.
const QUEUE_CAPACITY: usize = 64;

type TaskBuilder = Arc<dyn Fn(&Value) -> Box<dyn Task> + Send + Sync>;

struct TaskSpec {
    name: String,
    description: String,
    build: TaskBuilder,
}

/// Maps task types to their display names and constructors.
#[derive(Default)]
pub struct TaskRegistry {
    specs: HashMap<String, TaskSpec>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a task type.
    pub fn register<F>(
        &mut self,
        task_type: &str,
        name: &str,
        description: &str,
        build: F,
    ) -> &mut Self
    where
        F: Fn(&Value) -> Box<dyn Task> + Send + Sync + 'static,
    {
        self.specs.insert(
            task_type.to_string(),
            TaskSpec {
                name: name.to_string(),
                description: description.to_string(),
                build: Arc::new(build),
            },
        );
        self
    }

    /// A registry holding the demonstration task.
    pub fn with_demo_tasks() -> Self {
        let mut registry = Self::new();
        registry.register(
            "fake_longtask",
            "Fake Long Task",
            "a fake long running task that reports status several times",
            |_| Box::new(FakeLongTask::default()),
        );
        registry
    }
}

/// A staged task on its way to a worker.
struct TaskTicket {
    task_id: String,
    task_name: String,
    task_description: String,
    task_type: String,
    payload: Value,
    build: TaskBuilder,
}

struct ManagerInner {
    status: Arc<Mutex<Vec<TaskReport>>>,
    logs: DashMap<String, Arc<Mutex<String>>>,
    stops: DashMap<String, CancellationToken>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    provider: DataProvider,
}

/// Manages the lifecycle of tasks: staging, execution on a bounded worker
/// pool, and the live status list every console converges on.
///
/// Status reports arrive from the workers directly and from the
/// task-status topic (the uploader publishes file-upload progress there);
/// both feed the same list, one entry per task id.
#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<ManagerInner>,
    staging_tx: mpsc::Sender<Value>,
    report_tx: mpsc::Sender<TaskReport>,
}

impl TaskManager {
    /// Spins up the staging worker, the task workers, the status collector,
    /// the task-status topic listener, and the `tasks` data provider.
    #[instrument(skip(link, registry))]
    pub async fn start<L: BrokerLink>(
        link: &L,
        registry: TaskRegistry,
    ) -> Result<TaskManager, TransportError> {
        let (staging_tx, mut staging_rx) = mpsc::channel::<Value>(QUEUE_CAPACITY);
        let (work_tx, work_rx) = mpsc::channel::<TaskTicket>(QUEUE_CAPACITY);
        let (report_tx, mut report_rx) = mpsc::channel::<TaskReport>(QUEUE_CAPACITY);

        let tracker = TaskTracker::new();
        let cancel = CancellationToken::new();
        let status: Arc<Mutex<Vec<TaskReport>>> = Arc::new(Mutex::new(Vec::new()));

        let list = status.clone();
        let provider = DataProvider::start(link, "tasks", Arc::new(move || {
            let list = list.lock().unwrap_or_else(PoisonError::into_inner);
            serde_json::to_value(&*list).unwrap_or(Value::Array(Vec::new()))
        }))
        .await?;

        let inner = Arc::new(ManagerInner {
            status: status.clone(),
            logs: DashMap::new(),
            stops: DashMap::new(),
            tracker: tracker.clone(),
            cancel: cancel.clone(),
            provider,
        });

        let manager = TaskManager {
            inner: inner.clone(),
            staging_tx,
            report_tx: report_tx.clone(),
        };

        // status collector: one entry per task id, replaced in place
        {
            let status = status.clone();
            let cancel = cancel.clone();
            tracker.spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        incoming = report_rx.recv() => {
                            let Some(report) = incoming else { break; };
                            let mut list = status.lock().unwrap_or_else(PoisonError::into_inner);
                            fold_into_status(&mut list, report);
                        }
                    }
                }
            });
        }

        // staging worker: enrich accepted payloads and hand them to the pool
        {
            let report_tx = report_tx.clone();
            let cancel = cancel.clone();
            tracker.spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        staged = staging_rx.recv() => {
                            let Some(payload) = staged else { break; };
                            stage_task(&registry, payload, &work_tx, &report_tx).await;
                        }
                    }
                }
            });
        }

        // task workers
        let work_rx = Arc::new(tokio::sync::Mutex::new(work_rx));
        for worker in 0..TASK_WORKERS {
            let work_rx = work_rx.clone();
            let report_tx = report_tx.clone();
            let inner = inner.clone();
            let cancel = cancel.clone();
            tracker.spawn(async move {
                debug!("starting TaskWorker-{}", worker + 1);
                loop {
                    let ticket = {
                        let mut queue = work_rx.lock().await;
                        tokio::select! {
                            _ = cancel.cancelled() => None,
                            next = queue.recv() => next,
                        }
                    };
                    let Some(ticket) = ticket else { break; };
                    execute_task(&inner, ticket, &report_tx).await;
                }
            });
        }

        // fold in reports published on the task-status topic
        {
            let mut subscription = link.subscribe(topics::TASK_STATUS).await;
            let report_tx = report_tx.clone();
            let cancel = cancel.clone();
            tracker.spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        incoming = subscription.inbox.recv() => {
                            let Some(message) = incoming else { break; };
                            let Some(raw) = message.content.get("task_status") else { continue; };
                            match serde_json::from_value::<TaskReport>(raw.clone()) {
                                Ok(report) => { let _ = report_tx.send(report).await; }
                                Err(e) => debug!("ignoring malformed task status: {}", e),
                            }
                        }
                    }
                }
            });
        }
        tracker.close();

        Ok(manager)
    }

    /// Accepts a `create_task` payload (`{task_type, task_payload}`) for
    /// staging.
    pub async fn stage(&self, payload: Value) -> Result<(), TransportError> {
        self.staging_tx.send(payload).await.map_err(TransportError::from)
    }

    /// Feeds one status report into the list, as if a worker had sent it.
    pub async fn report(&self, report: TaskReport) -> Result<(), TransportError> {
        self.report_tx.send(report).await.map_err(TransportError::from)
    }

    /// Snapshot of the live task list.
    pub fn get_tasks(&self) -> Value {
        let list = self.inner.status.lock().unwrap_or_else(PoisonError::into_inner);
        serde_json::to_value(&*list).unwrap_or(Value::Array(Vec::new()))
    }

    /// Performs a console-requested action on a task: `stop`, `clear`, or
    /// `log`.
    pub fn task_action(&self, task_id: &str, action: &str) -> anyhow::Result<Value> {
        match action {
            "stop" => {
                let stop = self
                    .inner
                    .stops
                    .get(task_id)
                    .ok_or_else(|| anyhow!("no running task with id: {task_id}"))?;
                info!("stop requested for task: {}", task_id);
                stop.cancel();
                Ok(Value::String("Success".into()))
            }
            "clear" => {
                let mut list = self
                    .inner
                    .status
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                let position = list
                    .iter()
                    .position(|entry| entry.task_id == task_id)
                    .ok_or_else(|| anyhow!("no task with id: {task_id}"))?;
                if !list[position].task_status.is_terminal() {
                    return Err(anyhow!("task {task_id} is still running"));
                }
                list.remove(position);
                drop(list);
                self.inner.logs.remove(task_id);
                self.inner.stops.remove(task_id);
                Ok(Value::String("Success".into()))
            }
            "log" => {
                let log = self
                    .inner
                    .logs
                    .get(task_id)
                    .ok_or_else(|| anyhow!("no log for task id: {task_id}"))?;
                let text = log.lock().unwrap_or_else(PoisonError::into_inner).clone();
                Ok(Value::String(text))
            }
            other => Err(anyhow!("unrecognized task action: {other}")),
        }
    }

    /// Stops the workers and the `tasks` provider.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        self.inner.cancel.cancel();
        self.inner.tracker.wait().await;
        self.inner.provider.stop().await;
    }
}

/// Validate a staged payload, give it an id and display fields, report it
/// queued, and enqueue it for the workers.
async fn stage_task(
    registry: &TaskRegistry,
    payload: Value,
    work_tx: &mpsc::Sender<TaskTicket>,
    report_tx: &mpsc::Sender<TaskReport>,
) {
    let Some(task_type) = payload.get("task_type").and_then(Value::as_str) else {
        info!("Ignoring staged task without a task_type");
        return;
    };
    let Some(spec) = registry.specs.get(task_type) else {
        info!("Ignoring unrecognized task type: {}", task_type);
        return;
    };
    let ticket = TaskTicket {
        task_id: Uuid::new_v4().to_string(),
        task_name: spec.name.clone(),
        task_description: spec.description.clone(),
        task_type: task_type.to_string(),
        payload: payload.get("task_payload").cloned().unwrap_or(Value::Object(Default::default())),
        build: spec.build.clone(),
    };
    debug!("queueing staged task id: {}", ticket.task_id);
    let queued = TaskReport {
        task_id: ticket.task_id.clone(),
        task_name: ticket.task_name.clone(),
        task_description: ticket.task_description.clone(),
        task_type: ticket.task_type.clone(),
        task_status: TaskStatus::Queued,
        task_progress: 0,
        task_progress_description: "awaiting worker availability".to_string(),
        task_current_subtask: String::new(),
        task_subtask_descriptions: Value::Object(Default::default()),
    };
    let _ = report_tx.send(queued).await;
    if work_tx.send(ticket).await.is_err() {
        error!("work queue closed, dropping staged task");
    }
}

async fn execute_task(
    inner: &Arc<ManagerInner>,
    ticket: TaskTicket,
    report_tx: &mpsc::Sender<TaskReport>,
) {
    let log = Arc::new(Mutex::new(String::new()));
    let stop = CancellationToken::new();
    inner.logs.insert(ticket.task_id.clone(), log.clone());
    inner.stops.insert(ticket.task_id.clone(), stop.clone());

    let task = (ticket.build)(&ticket.payload);
    let runner = TaskRunner {
        task_id: ticket.task_id.clone(),
        task_name: ticket.task_name,
        task_description: ticket.task_description,
        task_type: ticket.task_type,
        payload: ticket.payload,
        reporter: report_tx.clone(),
        ctx: TaskContext::new(log, stop),
    };
    runner.run(task).await;
    inner.stops.remove(&ticket.task_id);
}

/// Keep one entry per task id, replacing in place to preserve order; new ids
/// go to the front.
fn fold_into_status(status: &mut Vec<TaskReport>, incoming: TaskReport) {
    let mut found = false;
    let mut rebuilt = Vec::with_capacity(status.len() + 1);
    for existing in status.drain(..) {
        if existing.task_id == incoming.task_id {
            if found {
                error!(
                    "found an additional task with id: {}, it will be discarded",
                    existing.task_id
                );
            } else {
                rebuilt.push(incoming.clone());
                found = true;
            }
        } else {
            rebuilt.push(existing);
        }
    }
    if !found {
        rebuilt.insert(0, incoming);
    }
    *status = rebuilt;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(id: &str, status: TaskStatus) -> TaskReport {
        TaskReport {
            task_id: id.to_string(),
            task_name: "t".into(),
            task_description: "d".into(),
            task_type: "demo".into(),
            task_status: status,
            task_progress: 0,
            task_progress_description: String::new(),
            task_current_subtask: String::new(),
            task_subtask_descriptions: Value::Object(Default::default()),
        }
    }

    #[test]
    fn new_ids_are_inserted_at_the_front() {
        let mut list = Vec::new();
        fold_into_status(&mut list, report("a", TaskStatus::Queued));
        fold_into_status(&mut list, report("b", TaskStatus::Queued));
        let ids: Vec<_> = list.iter().map(|r| r.task_id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
    }

    #[test]
    fn known_ids_are_replaced_in_place() {
        let mut list = Vec::new();
        fold_into_status(&mut list, report("a", TaskStatus::Queued));
        fold_into_status(&mut list, report("b", TaskStatus::Queued));
        fold_into_status(&mut list, report("a", TaskStatus::Running));
        let ids: Vec<_> = list.iter().map(|r| r.task_id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
        assert_eq!(list[1].task_status, TaskStatus::Running);
    }
}
