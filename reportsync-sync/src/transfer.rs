//! Queue backup and restore.
//!
//! Exports are a JSON envelope `{version, exported_at, items}`. Imports accept
//! that envelope or a bare list of records, validate each record on its own,
//! and reject bad records without failing the whole import.

use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Utc};
use reportsync_storage::SCHEMA_VERSION;
use reportsync_types::{ItemId, ItemStatus, QueueItem};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

const CREATED_MARKERS: [&str; 3] = ["created_at", "createdAt", "timestamp"];

#[derive(Serialize)]
struct ExportEnvelope<'a> {
    version: u32,
    exported_at: DateTime<Utc>,
    items: &'a [QueueItem],
}

/// Outcome of an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    /// Records added to the queue.
    pub imported: usize,
    /// Records that failed validation.
    pub rejected: usize,
    /// Valid records skipped because the id was already present.
    pub duplicates: usize,
}

pub(crate) fn export_items(items: &[QueueItem]) -> SyncResult<String> {
    let envelope = ExportEnvelope {
        version: SCHEMA_VERSION,
        exported_at: Utc::now(),
        items,
    };
    Ok(serde_json::to_string_pretty(&envelope)?)
}

/// Parses an export, returning valid records and the number rejected.
pub(crate) fn parse_import(serialized: &str) -> SyncResult<(Vec<QueueItem>, usize)> {
    let value: Value = serde_json::from_str(serialized)
        .map_err(|e| SyncError::InvalidImport(format!("not valid JSON: {e}")))?;

    let records = match value {
        Value::Array(records) => records,
        Value::Object(mut envelope) => match envelope.remove("items") {
            Some(Value::Array(records)) => records,
            _ => {
                return Err(SyncError::InvalidImport(
                    "expected a list of items or an object with an `items` list".into(),
                ));
            }
        },
        _ => {
            return Err(SyncError::InvalidImport(
                "expected a list of items or an object with an `items` list".into(),
            ));
        }
    };

    let mut items = Vec::with_capacity(records.len());
    let mut rejected = 0;
    for (index, record) in records.into_iter().enumerate() {
        match validate_record(record) {
            Ok(item) => items.push(item),
            Err(reason) => {
                debug!("rejecting import record {index}: {reason}");
                rejected += 1;
            }
        }
    }
    Ok((items, rejected))
}

fn validate_record(record: Value) -> Result<QueueItem, String> {
    let Value::Object(mut fields) = record else {
        return Err("record is not an object".into());
    };

    match fields.get("id").and_then(Value::as_str) {
        Some(id) if ItemId::parse(id).is_some() => {}
        _ => return Err("missing or empty `id`".into()),
    }

    let created = take_created_marker(&mut fields)?;
    fields.insert("created_at".into(), Value::String(created.to_rfc3339()));

    if !fields.get("payload").is_some_and(Value::is_object) {
        return Err("missing or non-object `payload`".into());
    }

    match fields.get("status").and_then(Value::as_str).and_then(ItemStatus::parse) {
        Some(ItemStatus::Pending | ItemStatus::Processing | ItemStatus::Failed) => {}
        Some(ItemStatus::Completed) => return Err("completed records are not importable".into()),
        None => return Err("missing or unknown `status`".into()),
    }

    serde_json::from_value(Value::Object(fields)).map_err(|e| e.to_string())
}

/// Removes every creation-time alias and returns the first usable one.
/// Accepts RFC 3339 strings or unix milliseconds.
fn take_created_marker(fields: &mut Map<String, Value>) -> Result<DateTime<Utc>, String> {
    let markers: Vec<Value> = CREATED_MARKERS
        .iter()
        .filter_map(|key| fields.remove(*key))
        .collect();

    let Some(marker) = markers.into_iter().next() else {
        return Err("missing `created_at` timestamp".into());
    };

    match marker {
        Value::String(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| format!("bad `created_at`: {e}")),
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .ok_or_else(|| "bad `created_at` millis".to_string()),
        _ => Err("bad `created_at` type".into()),
    }
}
