//! Transactions over a `Store`
//!
//! Writes are buffered in an overlay and only reach the committed tables in
//! `commit`, which journals them as a single batch first. Reads see the
//! overlay on top of whatever is committed at the time of the read.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::error::{AuditError, AuditResult};
use crate::models::{Row, MISSING_ROW_ID};

use super::tables::RowWrite;
use super::{RawRead, Store, StorageTransaction};

#[derive(Debug, Clone)]
enum PendingWrite {
    /// Full image of a row that must not exist yet
    Insert(Row),
    /// Columns to overwrite on an existing row
    Update(Row),
}

#[derive(Debug)]
struct Pending {
    kind: String,
    row_id: String,
    write: PendingWrite,
}

/// Transaction handle returned by `Store::begin`
pub struct StoreTransaction<'s> {
    store: &'s Store,
    pending: Vec<Pending>,
    index: HashMap<(String, String), usize>,
}

impl<'s> StoreTransaction<'s> {
    pub(super) fn new(store: &'s Store) -> Self {
        Self {
            store,
            pending: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn pending(&self, kind: &str, row_id: &str) -> Option<&Pending> {
        self.index
            .get(&(kind.to_string(), row_id.to_string()))
            .map(|&i| &self.pending[i])
    }

    fn pending_mut(&mut self, kind: &str, row_id: &str) -> Option<&mut Pending> {
        match self.index.get(&(kind.to_string(), row_id.to_string())) {
            Some(&i) => Some(&mut self.pending[i]),
            None => None,
        }
    }

    fn push(&mut self, kind: &str, row_id: &str, write: PendingWrite) {
        self.index
            .insert((kind.to_string(), row_id.to_string()), self.pending.len());
        self.pending.push(Pending {
            kind: kind.to_string(),
            row_id: row_id.to_string(),
            write,
        });
    }
}

fn check_identity(kind: &str, row_id: &str) -> AuditResult<()> {
    if row_id.trim().is_empty() || row_id == MISSING_ROW_ID {
        return Err(AuditError::Storage(format!(
            "Cannot write a {} row without an identity",
            kind
        )));
    }
    Ok(())
}

fn merged(mut base: Row, changes: &Row) -> Row {
    for (column, value) in changes {
        base.insert(column.clone(), value.clone());
    }
    base
}

impl StorageTransaction for StoreTransaction<'_> {
    fn scan(&self, kind: &str, _read: RawRead) -> AuditResult<Vec<Row>> {
        let state = self.store.read_state()?;

        let mut rows: BTreeMap<&str, Row> = state
            .tables
            .rows(kind)
            .map(|(id, row)| (id.as_str(), row.clone()))
            .collect();

        for pending in self.pending.iter().filter(|p| p.kind == kind) {
            match &pending.write {
                PendingWrite::Insert(row) => {
                    rows.insert(pending.row_id.as_str(), row.clone());
                }
                PendingWrite::Update(changes) => {
                    if let Some(row) = rows.remove(pending.row_id.as_str()) {
                        rows.insert(pending.row_id.as_str(), merged(row, changes));
                    }
                }
            }
        }

        Ok(rows.into_values().collect())
    }

    fn fetch(&self, kind: &str, row_id: &str, _read: RawRead) -> AuditResult<Option<Row>> {
        if let Some(Pending {
            write: PendingWrite::Insert(row),
            ..
        }) = self.pending(kind, row_id)
        {
            return Ok(Some(row.clone()));
        }

        let state = self.store.read_state()?;
        let committed = state.tables.get(kind, row_id).cloned();

        Ok(match (committed, self.pending(kind, row_id)) {
            (Some(row), Some(Pending {
                write: PendingWrite::Update(changes),
                ..
            })) => Some(merged(row, changes)),
            (committed, _) => committed,
        })
    }

    fn insert(&mut self, kind: &str, row_id: &str, row: Row) -> AuditResult<()> {
        check_identity(kind, row_id)?;

        if self.pending(kind, row_id).is_some()
            || self.store.read_state()?.tables.contains(kind, row_id)
        {
            return Err(AuditError::Storage(format!(
                "{} row {} already exists",
                kind, row_id
            )));
        }

        self.push(kind, row_id, PendingWrite::Insert(row));
        Ok(())
    }

    fn update(&mut self, kind: &str, row_id: &str, changes: Row) -> AuditResult<()> {
        check_identity(kind, row_id)?;

        if let Some(pending) = self.pending_mut(kind, row_id) {
            match &mut pending.write {
                PendingWrite::Insert(row) | PendingWrite::Update(row) => row.extend(changes),
            }
            return Ok(());
        }

        if !self.store.read_state()?.tables.contains(kind, row_id) {
            return Err(AuditError::Storage(format!(
                "{} row {} does not exist",
                kind, row_id
            )));
        }

        self.push(kind, row_id, PendingWrite::Update(changes));
        Ok(())
    }

    fn commit(self: Box<Self>) -> AuditResult<()> {
        let this = *self;
        if this.pending.is_empty() {
            return Ok(());
        }

        let store = this.store;
        let mut state = store.write_state()?;

        // Resolve updates against the state as of now; a concurrent commit
        // may have landed since they were buffered.
        let mut writes = Vec::with_capacity(this.pending.len());
        for pending in this.pending {
            let row = match pending.write {
                PendingWrite::Insert(row) => {
                    if state.tables.contains(&pending.kind, &pending.row_id) {
                        return Err(AuditError::Storage(format!(
                            "{} row {} already exists",
                            pending.kind, pending.row_id
                        )));
                    }
                    row
                }
                PendingWrite::Update(changes) => {
                    match state.tables.get(&pending.kind, &pending.row_id) {
                        Some(row) => merged(row.clone(), &changes),
                        None => {
                            return Err(AuditError::Storage(format!(
                                "{} row {} does not exist",
                                pending.kind, pending.row_id
                            )))
                        }
                    }
                }
            };
            writes.push(RowWrite {
                kind: pending.kind,
                row_id: pending.row_id,
                row,
            });
        }

        debug!(writes = writes.len(), "committing transaction");
        store.apply_batch(&mut state, writes)
    }

    fn rollback(self: Box<Self>) {
        debug!(discarded = self.pending.len(), "transaction rolled back");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageEngine;
    use serde_json::json;

    fn row(value: serde_json::Value) -> Row {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_reads_see_own_writes() {
        let store = Store::in_memory();
        let mut tx = store.begin().unwrap();
        tx.insert("customers", "a", row(json!({"id": "a", "name": "Acme"})))
            .unwrap();
        tx.update("customers", "a", row(json!({"name": "Acme Ltd"})))
            .unwrap();

        let fetched = tx.fetch("customers", "a", RawRead::grant()).unwrap().unwrap();
        assert_eq!(fetched["name"], "Acme Ltd");
        assert_eq!(tx.scan("customers", RawRead::grant()).unwrap().len(), 1);

        tx.rollback();
        let tx = store.begin().unwrap();
        assert!(tx.fetch("customers", "a", RawRead::grant()).unwrap().is_none());
    }

    #[test]
    fn test_commit_publishes_writes() {
        let store = Store::in_memory();
        let mut tx = store.begin().unwrap();
        tx.insert("customers", "a", row(json!({"id": "a", "name": "Acme"})))
            .unwrap();
        tx.commit().unwrap();

        let mut tx = store.begin().unwrap();
        tx.update("customers", "a", row(json!({"name": "Beta"}))).unwrap();
        tx.commit().unwrap();

        let tx = store.begin().unwrap();
        let rows = tx.scan("customers", RawRead::grant()).unwrap();
        assert_eq!(rows, vec![row(json!({"id": "a", "name": "Beta"}))]);
    }

    #[test]
    fn test_insert_existing_row_fails() {
        let store = Store::in_memory();
        let mut tx = store.begin().unwrap();
        tx.insert("customers", "a", Row::new()).unwrap();
        let err = tx.insert("customers", "a", Row::new()).unwrap_err();
        assert!(err.is_storage_failure());
    }

    #[test]
    fn test_update_missing_row_fails() {
        let store = Store::in_memory();
        let mut tx = store.begin().unwrap();
        let err = tx.update("customers", "a", Row::new()).unwrap_err();
        assert!(err.is_storage_failure());
    }

    #[test]
    fn test_rows_without_identity_are_rejected() {
        let store = Store::in_memory();
        let mut tx = store.begin().unwrap();
        assert!(tx.insert("customers", MISSING_ROW_ID, Row::new()).is_err());
        assert!(tx.insert("customers", "", Row::new()).is_err());
    }

    #[test]
    fn test_conflicting_insert_detected_at_commit() {
        let store = Store::in_memory();
        let mut first = store.begin().unwrap();
        let mut second = store.begin().unwrap();
        first.insert("customers", "a", Row::new()).unwrap();
        second.insert("customers", "a", Row::new()).unwrap();

        first.commit().unwrap();
        assert!(second.commit().is_err());
    }

    #[test]
    fn test_update_merges_onto_latest_commit() {
        let store = Store::in_memory();
        let mut tx = store.begin().unwrap();
        tx.insert("customers", "a", row(json!({"name": "Acme", "tier": 1})))
            .unwrap();
        tx.commit().unwrap();

        let mut renamer = store.begin().unwrap();
        let mut promoter = store.begin().unwrap();
        renamer
            .update("customers", "a", row(json!({"name": "Beta"})))
            .unwrap();
        promoter
            .update("customers", "a", row(json!({"tier": 2})))
            .unwrap();
        renamer.commit().unwrap();
        promoter.commit().unwrap();

        let tx = store.begin().unwrap();
        let stored = tx.fetch("customers", "a", RawRead::grant()).unwrap().unwrap();
        assert_eq!(stored, row(json!({"name": "Beta", "tier": 2})));
    }
}
