//! Export module for softaudit
//!
//! Writes the committed change log in one of three formats:
//! - JSON: machine-readable, with export metadata
//! - YAML: human-readable, same structure as JSON
//! - CSV: one line per entry, for spreadsheets

pub mod csv;
pub mod json;
pub mod yaml;

use std::io::Write;
use std::str::FromStr;

use clap::ValueEnum;

use crate::database::Database;
use crate::error::{AuditError, AuditResult};

pub use self::csv::{export_change_log_csv, write_entries_csv};
pub use json::{export_change_log_json, ChangeLogExport, ExportMetadata, EXPORT_SCHEMA_VERSION};
pub use yaml::export_change_log_yaml;

/// Output format of an export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ExportFormat {
    /// JSON with export metadata
    #[default]
    Json,
    /// YAML, human-readable
    Yaml,
    /// CSV, one line per entry
    Csv,
}

impl FromStr for ExportFormat {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            "csv" => Ok(Self::Csv),
            other => Err(AuditError::Validation(format!(
                "unknown export format '{}' (expected json, yaml or csv)",
                other
            ))),
        }
    }
}

/// Write the change log in `format`
pub fn export_change_log<W: Write>(
    db: &Database,
    format: ExportFormat,
    writer: &mut W,
) -> AuditResult<()> {
    match format {
        ExportFormat::Json => export_change_log_json(db, writer, true),
        ExportFormat::Yaml => export_change_log_yaml(db, writer),
        ExportFormat::Csv => export_change_log_csv(db, writer),
    }
}
