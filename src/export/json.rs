//! JSON export of the change log

use std::io::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::{ChangeAction, ChangeLogEntry};
use crate::database::Database;
use crate::error::{AuditError, AuditResult};

/// Current export schema version
pub const EXPORT_SCHEMA_VERSION: &str = "1.0.0";

/// The change log as exported
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeLogExport {
    pub schema_version: String,
    pub exported_at: DateTime<Utc>,
    /// Version of softaudit that wrote the export
    pub app_version: String,
    /// Kind the entries were read from
    pub change_log_kind: String,
    pub entries: Vec<ChangeLogEntry>,
    pub metadata: ExportMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub entry_count: usize,
    pub insert_count: usize,
    pub update_count: usize,
    pub delete_count: usize,
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
}

impl ExportMetadata {
    fn from_entries(entries: &[ChangeLogEntry]) -> Self {
        let count = |action: ChangeAction| entries.iter().filter(|e| e.action == action).count();
        Self {
            entry_count: entries.len(),
            insert_count: count(ChangeAction::Insert),
            update_count: count(ChangeAction::Update),
            delete_count: count(ChangeAction::Delete),
            earliest: entries.iter().map(|e| e.timestamp).min(),
            latest: entries.iter().map(|e| e.timestamp).max(),
        }
    }
}

impl ChangeLogExport {
    /// Read the committed change log, oldest first
    pub fn from_database(db: &Database) -> AuditResult<Self> {
        Ok(Self::from_entries(
            &db.audit_settings().change_log_kind,
            db.change_log().read_all()?,
        ))
    }

    pub fn from_entries(change_log_kind: &str, entries: Vec<ChangeLogEntry>) -> Self {
        Self {
            schema_version: EXPORT_SCHEMA_VERSION.to_string(),
            exported_at: Utc::now(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            change_log_kind: change_log_kind.to_string(),
            metadata: ExportMetadata::from_entries(&entries),
            entries,
        }
    }
}

/// Write the change log as JSON
pub fn export_change_log_json<W: Write>(
    db: &Database,
    writer: &mut W,
    pretty: bool,
) -> AuditResult<()> {
    let export = ChangeLogExport::from_database(db)?;

    if pretty {
        serde_json::to_writer_pretty(&mut *writer, &export)
    } else {
        serde_json::to_writer(&mut *writer, &export)
    }
    .map_err(|e| AuditError::Export(e.to_string()))?;

    writeln!(writer).map_err(|e| AuditError::Export(e.to_string()))?;
    Ok(())
}
