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

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tracing::warn;

use nbs_core::prelude::*;

use crate::session::ConsoleSession;

/// Reshapes one raw source entry into a display row.
pub type RowFilter = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// One table column: the row key it reads and how to head it.
#[derive(Debug, Clone)]
pub struct Column {
    pub key: &'static str,
    pub display: &'static str,
    pub width: u8,
}

/// Binds a data source to a column spec and an optional per-row filter.
#[derive(Clone)]
pub struct TableConfig {
    pub source: &'static str,
    pub columns: Vec<Column>,
    pub filter: Option<RowFilter>,
}

/// A table fed by a data source.
///
/// Rows are recomputed whenever the source's value changes; readers either
/// take a snapshot with [`rows`](Self::rows) or follow updates through
/// [`watch_rows`](Self::watch_rows).
pub struct SourceTable {
    config: TableConfig,
    rows: watch::Sender<Vec<Value>>,
    source: DataSource,
}

impl SourceTable {
    /// Subscribes the table to its source through the session.
    pub async fn attach<L: BrokerLink>(
        session: &ConsoleSession<L>,
        config: TableConfig,
    ) -> Result<SourceTable, TransportError> {
        let (rows, _) = watch::channel(Vec::new());
        let sink = rows.clone();
        let filter = config.filter.clone();
        let on_change: ChangeCallback = Arc::new(move |value: &Value| {
            sink.send_replace(compute_rows(value, filter.as_ref()));
        });
        let source = session
            .subscribe_to_datasource(config.source, Some(on_change))
            .await?;
        Ok(SourceTable { config, rows, source })
    }

    /// The current display rows.
    pub fn rows(&self) -> Vec<Value> {
        self.rows.borrow().clone()
    }

    /// A receiver that yields each new row set.
    pub fn watch_rows(&self) -> watch::Receiver<Vec<Value>> {
        self.rows.subscribe()
    }

    pub fn columns(&self) -> &[Column] {
        &self.config.columns
    }

    pub fn source(&self) -> &DataSource {
        &self.source
    }
}

fn compute_rows(value: &Value, filter: Option<&RowFilter>) -> Vec<Value> {
    let Some(entries) = value.as_array() else {
        if !value.is_null() {
            warn!("data source value is not a list, showing no rows");
        }
        return Vec::new();
    };
    entries
        .iter()
        .map(|entry| match filter {
            Some(filter) => filter(entry.clone()),
            None => entry.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn rows_pass_through_without_a_filter() {
        let value = json!([{"a": 1}, {"a": 2}]);
        assert_eq!(compute_rows(&value, None), vec![json!({"a": 1}), json!({"a": 2})]);
    }

    #[test]
    fn the_filter_reshapes_each_row() {
        let filter: RowFilter = Arc::new(|row| json!({"doubled": row["a"].as_i64().unwrap_or(0) * 2}));
        let value = json!([{"a": 2}]);
        assert_eq!(compute_rows(&value, Some(&filter)), vec![json!({"doubled": 4})]);
    }

    #[test]
    fn non_list_values_produce_no_rows() {
        assert!(compute_rows(&json!({"oops": true}), None).is_empty());
    }
}
