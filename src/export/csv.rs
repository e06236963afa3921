//! CSV export of the change log
//!
//! One line per entry; `changed_data` is written as compact JSON.

use std::io::Write;

use csv::Writer;

use crate::audit::ChangeLogEntry;
use crate::database::Database;
use crate::error::{AuditError, AuditResult};

const HEADER: [&str; 7] = [
    "id",
    "timestamp",
    "entity_kind",
    "action",
    "row_id",
    "success",
    "changed_data",
];

/// Write the change log as CSV, oldest first
pub fn export_change_log_csv<W: Write>(db: &Database, writer: W) -> AuditResult<()> {
    write_entries_csv(&db.change_log().read_all()?, writer)
}

pub fn write_entries_csv<W: Write>(entries: &[ChangeLogEntry], writer: W) -> AuditResult<()> {
    let mut csv = Writer::from_writer(writer);
    csv.write_record(HEADER)
        .map_err(|e| AuditError::Export(e.to_string()))?;

    for entry in entries {
        let payload = serde_json::to_string(&entry.changed_data)
            .map_err(|e| AuditError::Export(e.to_string()))?;
        csv.write_record([
            entry.id.to_key(),
            entry.timestamp.to_rfc3339(),
            entry.entity_kind.clone(),
            entry.action.to_string(),
            entry.row_id.clone(),
            entry.success.to_string(),
            payload,
        ])
        .map_err(|e| AuditError::Export(e.to_string()))?;
    }

    csv.flush().map_err(|e| AuditError::Export(e.to_string()))
}
