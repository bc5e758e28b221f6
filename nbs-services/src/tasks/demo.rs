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

use async_trait::async_trait;

use crate::tasks::{Subtask, Task, TaskContext};

/// A fake job that pretends to do some work and reports status.
///
/// Exists so the task pipeline and the console's task list can be exercised
/// without any build toolchain present. `step_millis` scales every sleep so
/// tests stay fast.
#[derive(Debug, Clone)]
pub struct FakeLongTask {
    step_millis: u64,
}

impl FakeLongTask {
    pub fn new(step_millis: u64) -> Self {
        FakeLongTask { step_millis }
    }

    async fn pretend_work(&self, steps: u64) {
        tokio::time::sleep(Duration::from_millis(self.step_millis * steps)).await;
    }
}

impl Default for FakeLongTask {
    fn default() -> Self {
        FakeLongTask { step_millis: 1_000 }
    }
}

#[async_trait]
impl Task for FakeLongTask {
    fn subtasks(&self) -> Vec<Subtask> {
        vec![
            Subtask { name: "prepare_nucleotides", description: "Preparing Nucleotides", progress: 10 },
            Subtask { name: "reticulate_splines", description: "Reticulating Splines", progress: 20 },
            Subtask { name: "popularize_actor_pool", description: "Popularizing Actor Pool", progress: 30 },
            Subtask { name: "energize_stansifram", description: "Energizing Stanisfram", progress: 50 },
            Subtask { name: "compile_phase_modules", description: "Compiling Phase Modules", progress: 70 },
            Subtask { name: "verify_files", description: "Verifying Files", progress: 90 },
        ]
    }

    async fn run_subtask(&mut self, name: &str, ctx: &TaskContext) -> anyhow::Result<()> {
        ctx.log_line(&format!("running subtask: {name}"));
        match name {
            "prepare_nucleotides" => self.pretend_work(2).await,
            "reticulate_splines" => self.pretend_work(2).await,
            "popularize_actor_pool" => self.pretend_work(1).await,
            "energize_stansifram" => self.pretend_work(2).await,
            "compile_phase_modules" => self.pretend_work(5).await,
            "verify_files" => self.pretend_work(1).await,
            other => anyhow::bail!("unknown subtask: {other}"),
        }
        Ok(())
    }
}
