//! Change-log entry data structures
//!
//! One entry per inserted, updated or deleted entity. Entries are stored as
//! ordinary rows of the change-log kind and are never modified afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AuditError, AuditResult};
use crate::models::{ChangeId, Row};

use super::diff::summarize_payload;

/// What happened to the entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeAction {
    Insert,
    Update,
    Delete,
}

impl std::fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeAction::Insert => write!(f, "INSERT"),
            ChangeAction::Update => write!(f, "UPDATE"),
            ChangeAction::Delete => write!(f, "DELETE"),
        }
    }
}

impl std::str::FromStr for ChangeAction {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INSERT" => Ok(Self::Insert),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            other => Err(AuditError::Validation(format!(
                "unknown change action '{}'",
                other
            ))),
        }
    }
}

/// A single change-log row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub id: ChangeId,

    /// Kind (table) of the affected entity
    pub entity_kind: String,

    pub action: ChangeAction,

    /// Identity of the affected row, "None" if it had none
    pub row_id: String,

    /// Full column snapshot for INSERT/DELETE, changed columns for UPDATE
    pub changed_data: Value,

    #[serde(default = "default_success")]
    pub success: bool,

    /// Commit time, shared by every entry of one commit
    pub timestamp: DateTime<Utc>,
}

fn default_success() -> bool {
    true
}

impl ChangeLogEntry {
    fn new(
        entity_kind: impl Into<String>,
        action: ChangeAction,
        row_id: impl Into<String>,
        changed_data: Row,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ChangeId::new(),
            entity_kind: entity_kind.into(),
            action,
            row_id: row_id.into(),
            changed_data: Value::Object(changed_data),
            success: true,
            timestamp,
        }
    }

    /// Entry for a newly inserted row, carrying its full snapshot
    pub fn insert(
        entity_kind: impl Into<String>,
        row_id: impl Into<String>,
        snapshot: Row,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(entity_kind, ChangeAction::Insert, row_id, snapshot, timestamp)
    }

    /// Entry for an updated row, carrying only the changed columns
    pub fn update(
        entity_kind: impl Into<String>,
        row_id: impl Into<String>,
        changes: Row,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(entity_kind, ChangeAction::Update, row_id, changes, timestamp)
    }

    /// Entry for a logically deleted row, carrying its full snapshot
    pub fn delete(
        entity_kind: impl Into<String>,
        row_id: impl Into<String>,
        snapshot: Row,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(entity_kind, ChangeAction::Delete, row_id, snapshot, timestamp)
    }

    /// Encode as a change-log row
    pub fn to_row(&self) -> AuditResult<Row> {
        match serde_json::to_value(self) {
            Ok(Value::Object(row)) => Ok(row),
            Ok(_) => Err(AuditError::serialization(
                &self.entity_kind,
                &self.row_id,
                "change-log entry did not encode as a row",
            )),
            Err(e) => Err(AuditError::serialization(
                &self.entity_kind,
                &self.row_id,
                e.to_string(),
            )),
        }
    }

    /// Decode a stored change-log row
    pub fn from_row(row: Row) -> AuditResult<Self> {
        serde_json::from_value(Value::Object(row))
            .map_err(|e| AuditError::Storage(format!("Malformed change-log row: {}", e)))
    }

    /// Format the entry as a human-readable line
    pub fn format_human_readable(&self) -> String {
        let mut output = format!(
            "[{}] {} {} {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.action,
            self.entity_kind,
            self.row_id
        );

        if let Some(summary) = summarize_payload(&self.changed_data) {
            output.push_str(&format!("\n  {}", summary));
        }

        output
    }
}
