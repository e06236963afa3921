//! Change-log entries for a commit

use chrono::{DateTime, Utc};

use crate::audit::{changed_columns, ChangeLogEntry};
use crate::config::AuditSettings;
use crate::models::stamps::UPDATE_STAMP_COLUMNS;
use crate::models::{EntityState, Row};

/// A tracked entity about to be written
pub(super) struct PendingChange<'a> {
    pub kind: &'a str,
    pub row_id: String,
    pub state: EntityState,
    /// Columns as they will be stored
    pub columns: &'a Row,
    /// Columns as loaded, for diffing
    pub original: Option<&'a Row>,
}

/// One entry per pending change of a recorded kind, all stamped `now`
pub(super) fn record_changes(
    changes: &[PendingChange<'_>],
    settings: &AuditSettings,
    now: DateTime<Utc>,
) -> Vec<ChangeLogEntry> {
    changes
        .iter()
        .filter(|change| settings.is_recorded(change.kind))
        .filter_map(|change| match change.state {
            EntityState::New => Some(ChangeLogEntry::insert(
                change.kind,
                change.row_id.clone(),
                change.columns.clone(),
                now,
            )),
            EntityState::Deleted => Some(ChangeLogEntry::delete(
                change.kind,
                change.row_id.clone(),
                change.columns.clone(),
                now,
            )),
            EntityState::Modified => {
                let mut diff = match change.original {
                    Some(original) => changed_columns(original, change.columns),
                    None => change.columns.clone(),
                };
                // Stamps stay when they are the whole change
                let only_stamps = diff
                    .keys()
                    .all(|column| UPDATE_STAMP_COLUMNS.contains(&column.as_str()));
                if !settings.record_update_stamps && !only_stamps {
                    for column in UPDATE_STAMP_COLUMNS {
                        diff.remove(column);
                    }
                }
                Some(ChangeLogEntry::update(
                    change.kind,
                    change.row_id.clone(),
                    diff,
                    now,
                ))
            }
            EntityState::Unchanged => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::ChangeAction;
    use serde_json::{json, Value};

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_update_payload_is_diff_without_stamps() {
        let before = row(json!({"id": "x", "name": "a", "updated_at": null}));
        let after = row(json!({"id": "x", "name": "b", "updated_at": "2024-01-01T00:00:00Z"}));
        let changes = [PendingChange {
            kind: "customers",
            row_id: "x".into(),
            state: EntityState::Modified,
            columns: &after,
            original: Some(&before),
        }];

        let entries = record_changes(&changes, &AuditSettings::default(), Utc::now());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, ChangeAction::Update);
        assert_eq!(entries[0].changed_data, json!({"name": "b"}));

        let settings = AuditSettings {
            record_update_stamps: true,
            ..AuditSettings::default()
        };
        let entries = record_changes(&changes, &settings, Utc::now());
        assert_eq!(
            entries[0].changed_data,
            json!({"name": "b", "updated_at": "2024-01-01T00:00:00Z"})
        );
    }

    #[test]
    fn test_stamp_only_update_keeps_stamps() {
        let before = row(json!({"id": "x", "name": "a", "updated_by": null}));
        let after = row(json!({"id": "x", "name": "a", "updated_by": "someone"}));
        let changes = [PendingChange {
            kind: "customers",
            row_id: "x".into(),
            state: EntityState::Modified,
            columns: &after,
            original: Some(&before),
        }];

        let entries = record_changes(&changes, &AuditSettings::default(), Utc::now());
        assert_eq!(entries[0].changed_data, json!({"updated_by": "someone"}));
    }

    #[test]
    fn test_snapshots_and_exclusions() {
        let columns = row(json!({"id": "x", "name": "a", "is_deleted": true}));
        let now = Utc::now();
        let changes = [
            PendingChange {
                kind: "customers",
                row_id: "x".into(),
                state: EntityState::Deleted,
                columns: &columns,
                original: Some(&columns),
            },
            PendingChange {
                kind: "user_actions",
                row_id: "y".into(),
                state: EntityState::New,
                columns: &columns,
                original: None,
            },
            PendingChange {
                kind: "customers",
                row_id: "None".into(),
                state: EntityState::New,
                columns: &columns,
                original: None,
            },
        ];

        let entries = record_changes(&changes, &AuditSettings::default(), now);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, ChangeAction::Delete);
        assert_eq!(entries[0].changed_data, Value::Object(columns.clone()));
        assert_eq!(entries[1].row_id, "None");
        assert!(entries.iter().all(|e| e.timestamp == now && e.success));
    }
}
