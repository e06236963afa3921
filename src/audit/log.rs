//! Change-log reader
//!
//! Reads the change-log kind through the query pipeline like any other read.
//! The log itself is only ever written by the unit of work at commit.

use crate::error::AuditResult;
use crate::models::ChangeId;
use crate::query::{Query, QueryPipeline};
use crate::storage::StorageEngine;

use super::entry::{ChangeAction, ChangeLogEntry};

/// Read access to committed change-log entries
pub struct ChangeLog<'db> {
    engine: &'db dyn StorageEngine,
    pipeline: &'db QueryPipeline,
    kind: &'db str,
}

impl<'db> ChangeLog<'db> {
    pub fn new(engine: &'db dyn StorageEngine, pipeline: &'db QueryPipeline, kind: &'db str) -> Self {
        Self {
            engine,
            pipeline,
            kind,
        }
    }

    fn read(&self, query: Query) -> AuditResult<Vec<ChangeLogEntry>> {
        let tx = self.engine.begin()?;
        let rows = self.pipeline.rows(tx.as_ref(), query);
        tx.rollback();

        let mut entries = rows?
            .into_iter()
            .map(ChangeLogEntry::from_row)
            .collect::<AuditResult<Vec<_>>>()?;

        entries.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.entity_kind.cmp(&b.entity_kind))
                .then_with(|| a.row_id.cmp(&b.row_id))
        });
        Ok(entries)
    }

    /// Every entry, oldest first
    pub fn read_all(&self) -> AuditResult<Vec<ChangeLogEntry>> {
        self.read(Query::new(self.kind))
    }

    /// The most recent `count` entries, oldest first
    pub fn read_recent(&self, count: usize) -> AuditResult<Vec<ChangeLogEntry>> {
        let all_entries = self.read_all()?;
        let start = all_entries.len().saturating_sub(count);
        Ok(all_entries[start..].to_vec())
    }

    /// History of one row
    pub fn for_row(&self, entity_kind: &str, row_id: &str) -> AuditResult<Vec<ChangeLogEntry>> {
        self.read(
            Query::new(self.kind)
                .eq("entity_kind", entity_kind)
                .eq("row_id", row_id),
        )
    }

    /// Every entry for one kind
    pub fn for_kind(&self, entity_kind: &str) -> AuditResult<Vec<ChangeLogEntry>> {
        self.read(Query::new(self.kind).eq("entity_kind", entity_kind))
    }

    /// Every entry with the given action
    pub fn for_action(&self, action: ChangeAction) -> AuditResult<Vec<ChangeLogEntry>> {
        self.read(Query::new(self.kind).eq("action", action.to_string()))
    }

    pub fn get(&self, id: ChangeId) -> AuditResult<Option<ChangeLogEntry>> {
        Ok(self.read(Query::new(self.kind).eq("id", id))?.into_iter().next())
    }

    pub fn count(&self) -> AuditResult<usize> {
        let tx = self.engine.begin()?;
        let rows = self.pipeline.rows(tx.as_ref(), Query::new(self.kind));
        tx.rollback();
        Ok(rows?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Row;
    use crate::storage::Store;
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn seeded() -> Store {
        let store = Store::in_memory();
        let now = Utc::now();
        let entries = [
            ChangeLogEntry::insert("customers", "a", Row::new(), now - Duration::seconds(10)),
            ChangeLogEntry::insert("contacts", "k", Row::new(), now - Duration::seconds(10)),
            ChangeLogEntry::update(
                "customers",
                "a",
                serde_json::from_value(json!({"name": "b"})).unwrap(),
                now,
            ),
        ];

        let mut tx = store.begin().unwrap();
        for entry in &entries {
            tx.insert("data_changes", &entry.id.to_key(), entry.to_row().unwrap())
                .unwrap();
        }
        tx.commit().unwrap();
        store
    }

    #[test]
    fn test_read_all_is_ordered() {
        let store = seeded();
        let pipeline = QueryPipeline::new();
        let log = ChangeLog::new(&store, &pipeline, "data_changes");

        let entries = log.read_all().unwrap();
        let order: Vec<_> = entries
            .iter()
            .map(|e| (e.entity_kind.as_str(), e.action))
            .collect();
        assert_eq!(
            order,
            vec![
                ("contacts", ChangeAction::Insert),
                ("customers", ChangeAction::Insert),
                ("customers", ChangeAction::Update),
            ]
        );
        assert_eq!(log.count().unwrap(), 3);
    }

    #[test]
    fn test_filters() {
        let store = seeded();
        let pipeline = QueryPipeline::new();
        let log = ChangeLog::new(&store, &pipeline, "data_changes");

        assert_eq!(log.for_row("customers", "a").unwrap().len(), 2);
        assert_eq!(log.for_kind("contacts").unwrap().len(), 1);
        assert_eq!(log.for_action(ChangeAction::Update).unwrap().len(), 1);

        let recent = log.read_recent(1).unwrap();
        assert_eq!(recent[0].action, ChangeAction::Update);
        assert_eq!(log.get(recent[0].id).unwrap(), Some(recent[0].clone()));
    }
}
