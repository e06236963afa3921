//! Bulk import service
//!
//! Reads rows of one kind from a JSON array or a CSV file with a header
//! line and inserts them. Every item is committed in its own unit of work,
//! so a bad row is reported and skipped without undoing the others.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::Reader;
use serde_json::Value;
use tracing::{debug, info};

use crate::database::Database;
use crate::error::{AuditError, AuditResult};
use crate::models::{ActorContext, Row};
use crate::services::entity::{parse_value, EntityService};

/// Input file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    Json,
    Csv,
}

impl ImportFormat {
    /// Guess the format from a file extension
    pub fn from_path(path: &Path) -> AuditResult<Self> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("json") => Ok(Self::Json),
            Some("csv") => Ok(Self::Csv),
            _ => Err(AuditError::Import(format!(
                "Cannot tell the format of {}; use a .json or .csv file",
                path.display()
            ))),
        }
    }
}

/// Outcome of a bulk import
#[derive(Debug, Default)]
pub struct ImportResult {
    /// Number of rows inserted
    pub imported: usize,
    /// Number of rows rejected
    pub failed: usize,
    /// Ids of inserted rows, in input order
    pub imported_ids: Vec<String>,
    /// Error messages by 1-based item number
    pub error_messages: BTreeMap<usize, String>,
}

impl ImportResult {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Service for bulk inserts
pub struct ImportService<'a> {
    db: &'a Database,
}

impl<'a> ImportService<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Read a JSON array of objects
    pub fn parse_json<R: Read>(reader: R) -> AuditResult<Vec<Row>> {
        let value: Value = serde_json::from_reader(reader)
            .map_err(|e| AuditError::Import(format!("Invalid JSON: {}", e)))?;

        let Value::Array(items) = value else {
            return Err(AuditError::Import(
                "Expected a JSON array of objects".into(),
            ));
        };

        items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| match item {
                Value::Object(row) => Ok(row),
                other => Err(AuditError::Import(format!(
                    "Item {} is not an object: {}",
                    idx + 1,
                    other
                ))),
            })
            .collect()
    }

    /// Read CSV rows keyed by the header line
    ///
    /// Cells are read as JSON scalars when they parse; empty cells are left
    /// out of the row.
    pub fn parse_csv<R: Read>(reader: R) -> AuditResult<Vec<Row>> {
        let mut reader = Reader::from_reader(reader);
        let headers = reader
            .headers()
            .map_err(|e| AuditError::Import(format!("Failed to read CSV header: {}", e)))?
            .clone();

        let mut rows = Vec::new();
        for (idx, record) in reader.records().enumerate() {
            let record = record.map_err(|e| {
                AuditError::Import(format!("Failed to read CSV row {}: {}", idx + 1, e))
            })?;

            let mut row = Row::new();
            for (header, cell) in headers.iter().zip(record.iter()) {
                let cell = cell.trim();
                if cell.is_empty() {
                    continue;
                }
                row.insert(header.trim().to_string(), parse_value(cell));
            }
            rows.push(row);
        }

        Ok(rows)
    }

    /// Insert each row in its own unit of work
    pub fn import_rows(&self, actor: ActorContext, kind: &str, rows: Vec<Row>) -> ImportResult {
        let entities = EntityService::new(self.db);
        let mut result = ImportResult::default();

        for (idx, row) in rows.into_iter().enumerate() {
            let item = idx + 1;
            match entities.insert(actor, kind, row) {
                Ok((id, _)) => {
                    result.imported += 1;
                    result.imported_ids.push(id.to_key());
                }
                Err(e) => {
                    debug!(kind, item, error = %e, "import item rejected");
                    result.failed += 1;
                    result.error_messages.insert(item, e.to_string());
                }
            }
        }

        info!(
            kind,
            imported = result.imported,
            failed = result.failed,
            "bulk import finished"
        );
        result
    }

    /// Parse and import a file
    pub fn import_file(
        &self,
        actor: ActorContext,
        kind: &str,
        path: &Path,
    ) -> AuditResult<ImportResult> {
        if self.db.registry().schema(kind).is_none() {
            return Err(AuditError::UnknownKind(kind.to_string()));
        }

        let format = ImportFormat::from_path(path)?;
        let file = File::open(path).map_err(|e| {
            AuditError::Import(format!("Failed to open {}: {}", path.display(), e))
        })?;

        let rows = match format {
            ImportFormat::Json => Self::parse_json(file)?,
            ImportFormat::Csv => Self::parse_csv(file)?,
        };

        Ok(self.import_rows(actor, kind, rows))
    }
}
