//! YAML export of the change log, for reading by people

use std::io::Write;

use crate::database::Database;
use crate::error::{AuditError, AuditResult};
use crate::export::json::ChangeLogExport;

/// Write the change log as YAML with a short comment header
pub fn export_change_log_yaml<W: Write>(db: &Database, writer: &mut W) -> AuditResult<()> {
    let export = ChangeLogExport::from_database(db)?;
    write_yaml(&export, writer)
}

pub(crate) fn write_yaml<W: Write>(export: &ChangeLogExport, writer: &mut W) -> AuditResult<()> {
    let header = format!(
        "# softaudit change log export\n\
         # Generated: {}\n\
         # App Version: {}\n\
         # Entries: {} ({} insert, {} update, {} delete)\n\n",
        export.exported_at,
        export.app_version,
        export.metadata.entry_count,
        export.metadata.insert_count,
        export.metadata.update_count,
        export.metadata.delete_count,
    );
    writer
        .write_all(header.as_bytes())
        .map_err(|e| AuditError::Export(e.to_string()))?;

    serde_yaml::to_writer(writer, export).map_err(|e| AuditError::Export(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::ChangeLogEntry;
    use crate::models::Row;
    use chrono::Utc;

    #[test]
    fn test_yaml_has_header_and_entries() {
        let export = ChangeLogExport::from_entries(
            "data_changes",
            vec![ChangeLogEntry::insert("customers", "a", Row::new(), Utc::now())],
        );

        let mut output = Vec::new();
        write_yaml(&export, &mut output).unwrap();
        let text = String::from_utf8(output).unwrap();

        assert!(text.starts_with("# softaudit change log export"));
        assert!(text.contains("# Entries: 1 (1 insert, 0 update, 0 delete)"));
        assert!(text.contains("action: INSERT"));
        assert!(text.contains("entity_kind: customers"));

        let body: String = text.lines().filter(|l| !l.starts_with('#')).collect::<Vec<_>>().join("\n");
        let parsed: ChangeLogExport = serde_yaml::from_str(&body).unwrap();
        assert_eq!(parsed.entries.len(), 1);
    }
}
