//! Row display formatting
//!
//! Tables of stored rows for `query` and a field listing for `show`.

use serde_json::Value;
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::models::stamps::{AUDIT_COLUMNS, IS_DELETED};
use crate::models::{Row, ID_COLUMN};
use crate::query::QueryRow;

/// Column order for a set of rows: id, data columns, audit columns
fn column_order<'a>(rows: impl Iterator<Item = &'a Row>) -> Vec<String> {
    let mut data: Vec<String> = Vec::new();
    let mut audit: Vec<&str> = Vec::new();
    let mut has_id = false;

    for row in rows {
        for column in row.keys() {
            if column == ID_COLUMN {
                has_id = true;
            } else if let Some(name) = AUDIT_COLUMNS.iter().find(|c| **c == column.as_str()) {
                if !audit.contains(name) {
                    audit.push(*name);
                }
            } else if !data.contains(column) {
                data.push(column.clone());
            }
        }
    }

    data.sort();
    audit.sort_by_key(|c| AUDIT_COLUMNS.iter().position(|a| a == c));

    let mut columns = Vec::with_capacity(data.len() + audit.len() + 1);
    if has_id {
        columns.push(ID_COLUMN.to_string());
    }
    columns.extend(data);
    columns.extend(audit.into_iter().map(str::to_string));
    columns
}

/// Cell text for a value; strings are shown without quotes
pub fn format_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Format rows as a table
pub fn format_rows_table(rows: &[Row]) -> String {
    if rows.is_empty() {
        return "No rows found.\n".to_string();
    }

    let columns = column_order(rows.iter());
    let mut builder = Builder::default();
    builder.push_record(columns.iter().cloned());
    for row in rows {
        builder.push_record(columns.iter().map(|c| format_cell(row.get(c))));
    }

    let mut table = builder.build();
    table.with(Style::psql());
    format!("{}\n{} row(s)\n", table, rows.len())
}

/// Format query results with their joined rows listed under each root row
pub fn format_query_rows(rows: &[QueryRow]) -> String {
    let roots: Vec<Row> = rows.iter().map(|r| r.row.clone()).collect();
    let mut output = format_rows_table(&roots);

    for result in rows {
        for (alias, related) in &result.related {
            if related.is_empty() {
                continue;
            }
            output.push_str(&format!(
                "\n{} of {}:\n",
                alias,
                format_cell(result.row.get(ID_COLUMN))
            ));
            output.push_str(&format_rows_table(related));
        }
    }

    output
}

/// Format a single row as `column: value` lines
pub fn format_row_details(kind: &str, row: &Row) -> String {
    let mut output = String::new();

    let deleted = row.get(IS_DELETED) == Some(&Value::Bool(true));
    output.push_str(&format!(
        "{}: {}{}\n",
        kind,
        format_cell(row.get(ID_COLUMN)),
        if deleted { " (deleted)" } else { "" }
    ));

    let columns = column_order(std::iter::once(row));
    let width = columns.iter().map(|c| c.len()).max().unwrap_or(0);
    for column in columns.iter().filter(|c| c.as_str() != ID_COLUMN) {
        output.push_str(&format!(
            "  {:width$}  {}\n",
            column,
            format_cell(row.get(column)),
            width = width
        ));
    }

    output
}
