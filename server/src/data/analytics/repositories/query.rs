//! Execution of compiled declarative queries
//!
//! Compiled queries have caller-chosen output columns, so rows come back as
//! JSON objects (`JSONEachRow`) rather than a fixed Row struct.

use serde_json::Value;

use crate::data::DataError;
use crate::data::analytics::AnalyticsService;
use crate::data::query::CompiledQuery;

/// Run a compiled query and return its rows as JSON objects keyed by the
/// output column names.
pub async fn run_compiled(
    service: &AnalyticsService,
    query: CompiledQuery,
) -> Result<Vec<Value>, DataError> {
    let bound = query.params.bind_to(service.client().query(&query.sql));
    let bytes = bound.fetch_bytes("JSONEachRow")?.collect().await?;

    let mut rows = Vec::new();
    for line in bytes.split(|b| *b == b'\n') {
        if line.is_empty() {
            continue;
        }
        let row: Value = serde_json::from_slice(line)
            .map_err(|e| DataError::corrupt_json("query result row", e))?;
        rows.push(row);
    }
    Ok(rows)
}
