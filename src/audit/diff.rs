//! Column diffs for change-log payloads

use serde_json::Value;

use crate::models::Row;

/// Columns whose value differs between `before` and `after`
///
/// A column missing from `before` counts as changed. A column that
/// disappeared from `after` is reported as changed to `null`, unless it
/// already held `null`.
pub fn changed_columns(before: &Row, after: &Row) -> Row {
    let mut changed: Row = after
        .iter()
        .filter(|(column, value)| before.get(column.as_str()) != Some(*value))
        .map(|(column, value)| (column.clone(), value.clone()))
        .collect();

    for (column, value) in before {
        if !value.is_null() && !after.contains_key(column) {
            changed.insert(column.clone(), Value::Null);
        }
    }
    changed
}

/// Human-readable diff between two rows, `None` when nothing changed
pub fn describe_changes(before: &Row, after: &Row) -> Option<String> {
    let changes: Vec<String> = changed_columns(before, after)
        .iter()
        .map(|(column, value)| {
            let old = before.get(column).map(format_value);
            format!(
                "{}: {} -> {}",
                column,
                old.as_deref().unwrap_or("(unset)"),
                format_value(value)
            )
        })
        .collect();

    if changes.is_empty() {
        None
    } else {
        Some(changes.join(", "))
    }
}

/// One-line summary of a change-log payload
pub fn summarize_payload(payload: &Value) -> Option<String> {
    match payload {
        Value::Object(columns) if columns.is_empty() => None,
        Value::Object(columns) => Some(
            columns
                .iter()
                .map(|(column, value)| format!("{}: {}", column, format_value(value)))
                .collect::<Vec<_>>()
                .join(", "),
        ),
        Value::Null => None,
        other => Some(format_value(other)),
    }
}

/// Format a JSON value for human-readable display
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => {
            if s.chars().count() > 50 {
                let head: String = s.chars().take(47).collect();
                format!("\"{}...\"", head)
            } else {
                format!("\"{}\"", s)
            }
        }
        Value::Array(arr) => format!("[{} items]", arr.len()),
        Value::Object(obj) => format!("{{{} fields}}", obj.len()),
    }
}
