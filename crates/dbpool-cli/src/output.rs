//! Terminal rendering of command results

use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};
use dbpool_connection::ConnectionPool;
use dbpool_core::{QueryResult, Value};

/// One line of the `list` table
#[derive(Debug, Clone, PartialEq)]
pub struct PoolRow {
    pub name: String,
    pub driver: String,
    pub url: String,
    pub max_idle: usize,
    pub idle_timeout_ms: u128,
    pub idle: usize,
}

impl PoolRow {
    pub fn from_pool(pool: &ConnectionPool) -> Self {
        let target = pool.describe();
        Self {
            name: target.name.clone(),
            driver: target.driver.clone(),
            url: target.url.clone(),
            max_idle: pool.max_idle(),
            idle_timeout_ms: pool.idle_timeout().as_millis(),
            idle: pool.size(),
        }
    }
}

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

pub fn pools_table(rows: &[PoolRow]) -> Table {
    let mut table = table(vec!["Name", "Driver", "URL", "Max idle", "Idle timeout (ms)", "Idle"]);
    for row in rows {
        table.add_row(vec![
            row.name.clone(),
            row.driver.clone(),
            row.url.clone(),
            row.max_idle.to_string(),
            row.idle_timeout_ms.to_string(),
            row.idle.to_string(),
        ]);
    }
    table
}

pub fn rows_table(result: &QueryResult) -> Table {
    let header: Vec<&str> = result.columns.iter().map(|c| c.name.as_str()).collect();
    let mut table = table(header);
    for row in &result.rows {
        table.add_row(row.values.iter().map(Value::to_string).collect::<Vec<_>>());
    }
    table
}

fn json_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(v) => (*v).into(),
        Value::Int32(v) => (*v).into(),
        Value::Int64(v) => (*v).into(),
        Value::Float64(v) => serde_json::Number::from_f64(*v)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Json(v) => v.clone(),
        other => other.to_string().into(),
    }
}

/// Rows as an array of column-name keyed objects
pub fn rows_json(result: &QueryResult) -> serde_json::Value {
    let rows = result
        .rows
        .iter()
        .map(|row| {
            let object: serde_json::Map<String, serde_json::Value> = result
                .columns
                .iter()
                .zip(&row.values)
                .map(|(column, value)| (column.name.clone(), json_value(value)))
                .collect();
            serde_json::Value::Object(object)
        })
        .collect();
    serde_json::Value::Array(rows)
}

pub fn check_table(report: &[(String, Result<(), String>)]) -> Table {
    let mut table = table(vec!["Target", "Status"]);
    for (name, status) in report {
        let status = match status {
            Ok(()) => "ok".to_string(),
            Err(e) => format!("failed: {}", e),
        };
        table.add_row(vec![name.clone(), status]);
    }
    table
}
