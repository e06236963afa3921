//! Unit of work
//!
//! A `UnitOfWork` owns one storage transaction and tracks every entity
//! created, loaded or deleted through it. Nothing reaches storage before
//! `commit`, which runs the fixed pipeline
//!
//! 1. classify tracked entities (NEW / MODIFIED / DELETED / UNCHANGED)
//! 2. stamp creation and update metadata
//! 3. cascade soft deletes through owned relations
//! 4. record one change-log entry per pending entity
//! 5. write entities and change-log rows, then commit the transaction
//!
//! Any failure rolls the transaction back and is returned as the single
//! error of the commit.

mod cascade;
mod recorder;
mod stamper;

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};

use crate::audit::{changed_columns, ChangeLogEntry};
use crate::config::AuditSettings;
use crate::error::{AuditError, AuditResult};
use crate::models::stamps::IS_DELETED;
use crate::models::{
    ActorContext, DynamicEntity, EntityId, EntityKey, EntityState, Record, Row, TrackedEntity,
    ID_COLUMN,
};
use crate::query::pipeline::RowOverlay;
use crate::query::{ExecutionOptions, Query, QueryPipeline, QueryRow};
use crate::registry::Registry;
use crate::storage::StorageTransaction;

use recorder::PendingChange;

/// What a successful commit wrote
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitReport {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Change-log entries written by the commit
    pub entries: Vec<ChangeLogEntry>,
}

impl CommitReport {
    pub fn is_empty(&self) -> bool {
        self.inserted + self.updated + self.deleted == 0
    }
}

/// An entity held by the unit of work
struct TrackedSlot {
    entity: Box<dyn TrackedEntity>,
    state: EntityState,
    /// Row as stored when the entity was loaded; `None` for new entities
    original: Option<Row>,
    /// Whether the stored row was already soft-deleted
    deleted_before: bool,
}

impl TrackedSlot {
    fn is_deleted(&mut self) -> bool {
        self.entity
            .as_soft_deletable()
            .map_or(false, |deletable| deletable.is_deleted())
    }
}

/// Tracked entities as reads inside the unit of work see them
///
/// Stored rows of tracked entities are replaced by their current columns,
/// pending delete markers included, and entities created here are added.
/// Cascades are only resolved at commit.
struct TrackedView<'a> {
    slots: &'a [TrackedSlot],
    identity: &'a HashMap<EntityKey, usize>,
}

impl RowOverlay for TrackedView<'_> {
    fn overlay(&self, kind: &str, stored: Vec<Row>) -> AuditResult<Vec<Row>> {
        let mut seen = HashSet::new();
        let mut rows = Vec::with_capacity(stored.len());

        for row in stored {
            let tracked = row
                .get(ID_COLUMN)
                .and_then(Value::as_str)
                .and_then(|id| EntityId::parse(id).ok())
                .and_then(|id| self.identity.get(&EntityKey::new(kind, id)));
            match tracked {
                Some(&index) => {
                    seen.insert(index);
                    rows.push(self.slots[index].entity.columns()?);
                }
                None => rows.push(row),
            }
        }

        for (index, slot) in self.slots.iter().enumerate() {
            if slot.state == EntityState::New
                && slot.entity.kind() == kind
                && slot.entity.id().is_some()
                && !seen.contains(&index)
            {
                rows.push(slot.entity.columns()?);
            }
        }
        Ok(rows)
    }
}

/// Transaction-scoped entity tracker with a single commit point
pub struct UnitOfWork<'db> {
    tx: Option<Box<dyn StorageTransaction + 'db>>,
    actor: ActorContext,
    registry: &'db Registry,
    pipeline: &'db QueryPipeline,
    settings: &'db AuditSettings,
    slots: Vec<TrackedSlot>,
    identity: HashMap<EntityKey, usize>,
}

fn decode<T: Record>(row: Row) -> AuditResult<Box<dyn TrackedEntity>> {
    serde_json::from_value::<T>(Value::Object(row))
        .map(|record| Box::new(record) as Box<dyn TrackedEntity>)
        .map_err(|e| AuditError::Storage(format!("Failed to load {} row: {}", T::KIND, e)))
}

fn stored_as_deleted(row: &Row) -> bool {
    matches!(row.get(IS_DELETED), Some(Value::Bool(true)))
}

impl<'db> UnitOfWork<'db> {
    pub(crate) fn new(
        tx: Box<dyn StorageTransaction + 'db>,
        actor: ActorContext,
        registry: &'db Registry,
        pipeline: &'db QueryPipeline,
        settings: &'db AuditSettings,
    ) -> Self {
        debug!(%actor, "unit of work started");
        Self {
            tx: Some(tx),
            actor,
            registry,
            pipeline,
            settings,
            slots: Vec::new(),
            identity: HashMap::new(),
        }
    }

    /// Identity every mutation of this unit of work is attributed to
    pub fn actor(&self) -> ActorContext {
        self.actor
    }

    fn view(&self) -> TrackedView<'_> {
        TrackedView {
            slots: &self.slots,
            identity: &self.identity,
        }
    }

    fn tx(&self) -> AuditResult<&(dyn StorageTransaction + 'db)> {
        self.tx
            .as_deref()
            .ok_or_else(|| AuditError::Storage("Unit of work already finished".into()))
    }

    fn push_slot(
        &mut self,
        entity: Box<dyn TrackedEntity>,
        state: EntityState,
        original: Option<Row>,
    ) -> usize {
        let index = self.slots.len();
        if let Some(key) = entity.key() {
            self.identity.insert(key, index);
        }
        let deleted_before = original.as_ref().map_or(false, stored_as_deleted);
        self.slots.push(TrackedSlot {
            entity,
            state,
            original,
            deleted_before,
        });
        index
    }

    /// Fetch one stored row through the pipeline
    fn fetch_row(
        &self,
        kind: &str,
        id: EntityId,
        options: ExecutionOptions,
    ) -> AuditResult<Option<Row>> {
        let query = Query::new(kind).eq(ID_COLUMN, id).with_options(options);
        Ok(self.pipeline.rows(self.tx()?, query)?.into_iter().next())
    }

    /// Slot index of `kind`/`id`, loading it from storage if needed
    ///
    /// Tracked entities take precedence over storage. A tracked entity
    /// that is soft-deleted is only returned when `options` includes
    /// deleted rows.
    fn load_slot<F>(
        &mut self,
        kind: &str,
        id: EntityId,
        options: ExecutionOptions,
        materialize: F,
    ) -> AuditResult<Option<usize>>
    where
        F: FnOnce(Row) -> AuditResult<Box<dyn TrackedEntity>>,
    {
        let key = EntityKey::new(kind, id);
        if let Some(&index) = self.identity.get(&key) {
            if !options.includes_deleted() && self.slots[index].is_deleted() {
                return Ok(None);
            }
            return Ok(Some(index));
        }

        let Some(row) = self.fetch_row(kind, id, options)? else {
            return Ok(None);
        };
        let entity = materialize(row.clone())?;
        Ok(Some(self.push_slot(entity, EntityState::Unchanged, Some(row))))
    }

    /// Start tracking an entity
    ///
    /// An entity whose row already exists is tracked as loaded, so its
    /// differences from the stored row are committed as an update;
    /// otherwise it is inserted.
    pub fn track<E: TrackedEntity>(&mut self, entity: E) -> AuditResult<Option<EntityKey>> {
        self.track_boxed(Box::new(entity))
    }

    pub fn track_boxed(
        &mut self,
        entity: Box<dyn TrackedEntity>,
    ) -> AuditResult<Option<EntityKey>> {
        if entity.kind() == self.settings.change_log_kind {
            return Err(AuditError::Validation(format!(
                "'{}' is written by the unit of work only",
                self.settings.change_log_kind
            )));
        }

        let key = entity.key();
        let stored = match &key {
            Some(key) if self.identity.contains_key(key) => {
                return Err(AuditError::duplicate(&key.kind, key.id.to_key()));
            }
            Some(key) => self.fetch_row(&key.kind, key.id, ExecutionOptions::including_deleted())?,
            None => None,
        };

        let state = if stored.is_some() {
            EntityState::Unchanged
        } else {
            EntityState::New
        };
        debug!(kind = entity.kind(), row_id = %entity.row_id(), %state, "tracking entity");
        self.push_slot(entity, state, stored);
        Ok(key)
    }

    /// Load a typed record, hiding soft-deleted rows
    pub fn load<T: Record>(&mut self, id: EntityId) -> AuditResult<Option<&mut T>> {
        self.load_with::<T>(id, ExecutionOptions::default())
    }

    /// Load a typed record with explicit execution options
    pub fn load_with<T: Record>(
        &mut self,
        id: EntityId,
        options: ExecutionOptions,
    ) -> AuditResult<Option<&mut T>> {
        let Some(index) = self.load_slot(T::KIND, id, options, decode::<T>)? else {
            return Ok(None);
        };
        self.slots[index]
            .entity
            .as_any_mut()
            .downcast_mut::<T>()
            .map(Some)
            .ok_or_else(|| {
                AuditError::Validation(format!("{} {} is not a typed record", T::KIND, id))
            })
    }

    /// Load any registered kind, hiding soft-deleted rows
    pub fn get_mut(
        &mut self,
        kind: &str,
        id: EntityId,
    ) -> AuditResult<Option<&mut dyn TrackedEntity>> {
        let registry = self.registry;
        let index = self.load_slot(kind, id, ExecutionOptions::default(), |row| {
            registry.materialize(kind, row)
        })?;
        Ok(index.map(|i| self.slots[i].entity.as_mut()))
    }

    /// Load a schema-declared kind for editing
    pub fn load_dynamic(
        &mut self,
        kind: &str,
        id: EntityId,
    ) -> AuditResult<Option<&mut DynamicEntity>> {
        match self.get_mut(kind, id)? {
            None => Ok(None),
            Some(entity) => entity
                .as_any_mut()
                .downcast_mut::<DynamicEntity>()
                .map(Some)
                .ok_or_else(|| {
                    AuditError::Validation(format!("{} is not a schema-declared kind", kind))
                }),
        }
    }

    /// Mark an entity soft-deleted
    ///
    /// Returns `false` if it already was, in which case nothing cascades and
    /// nothing is logged.
    pub fn delete(&mut self, kind: &str, id: EntityId) -> AuditResult<bool> {
        let registry = self.registry;
        let index = self
            .load_slot(kind, id, ExecutionOptions::including_deleted(), |row| {
                registry.materialize(kind, row)
            })?
            .ok_or_else(|| AuditError::not_found(kind, id.to_key()))?;

        let deletable = self.slots[index]
            .entity
            .as_soft_deletable()
            .ok_or_else(|| AuditError::Validation(format!("{} is not soft-deletable", kind)))?;
        Ok(deletable.mark_deleted())
    }

    /// Typed shorthand for `delete(T::KIND, id)`
    pub fn delete_record<T: Record>(&mut self, id: EntityId) -> AuditResult<bool> {
        let index = self
            .load_slot(T::KIND, id, ExecutionOptions::including_deleted(), decode::<T>)?
            .ok_or_else(|| AuditError::not_found(T::KIND, id.to_key()))?;

        let deletable = self.slots[index].entity.as_soft_deletable().ok_or_else(|| {
            AuditError::Validation(format!("{} is not soft-deletable", T::KIND))
        })?;
        Ok(deletable.mark_deleted())
    }

    /// Run a query against committed state and the entities tracked here
    ///
    /// A row deleted in this unit of work is hidden like a committed delete.
    /// Rows it only reaches through a cascade stay visible until commit.
    pub fn query(&self, query: Query) -> AuditResult<Vec<QueryRow>> {
        self.pipeline.execute_overlaid(self.tx()?, query, &self.view())
    }

    /// Rows reachable from a stored entity along one of its relations
    pub fn related(
        &mut self,
        kind: &str,
        id: EntityId,
        relation: &str,
        options: ExecutionOptions,
    ) -> AuditResult<Vec<Row>> {
        let registry = self.registry;
        let index = self
            .load_slot(kind, id, options.clone(), |row| registry.materialize(kind, row))?
            .ok_or_else(|| AuditError::not_found(kind, id.to_key()))?;

        let found = self.slots[index]
            .entity
            .relations()
            .into_iter()
            .find(|r| r.name == relation)
            .ok_or_else(|| {
                AuditError::Validation(format!("{} has no relation '{}'", kind, relation))
            })?;

        match Query::for_relation(&found, Some(id)) {
            Some(query) => Ok(self
                .query(query.with_options(options))?
                .into_iter()
                .map(|r| r.row)
                .collect()),
            None => Ok(Vec::new()),
        }
    }

    /// Current state of a tracked entity, `None` if it is not tracked
    pub fn state_of(&mut self, kind: &str, id: EntityId) -> AuditResult<Option<EntityState>> {
        match self.identity.get(&EntityKey::new(kind, id)) {
            Some(&index) => classify(&mut self.slots[index]).map(Some),
            None => Ok(None),
        }
    }

    /// Number of tracked entities
    pub fn tracked(&self) -> usize {
        self.slots.len()
    }

    /// Run the commit pipeline
    pub fn commit(mut self) -> AuditResult<CommitReport> {
        match self.run_commit() {
            Ok(report) => Ok(report),
            Err(e) => {
                if let Some(tx) = self.tx.take() {
                    tx.rollback();
                }
                debug!(error = %e, "commit failed, transaction rolled back");
                Err(e)
            }
        }
    }

    fn run_commit(&mut self) -> AuditResult<CommitReport> {
        let now = Utc::now();

        for slot in &mut self.slots {
            slot.state = classify(slot)?;
        }

        let stamped = stamper::stamp(&mut self.slots, self.actor, now);
        debug!(stamped, "audit stamps applied");

        let cascaded = cascade::cascade_deletes(self, now)?;
        debug!(cascaded, "soft deletes cascaded");

        let mut snapshots = Vec::new();
        for (index, slot) in self.slots.iter().enumerate() {
            if slot.state.is_pending() {
                snapshots.push((index, slot.entity.columns()?));
            }
        }

        let changes: Vec<PendingChange<'_>> = snapshots
            .iter()
            .map(|(index, columns)| {
                let slot = &self.slots[*index];
                PendingChange {
                    kind: slot.entity.kind(),
                    row_id: slot.entity.row_id(),
                    state: slot.state,
                    columns,
                    original: slot.original.as_ref(),
                }
            })
            .collect();

        let entries = recorder::record_changes(&changes, self.settings, now);
        debug!(entries = entries.len(), "changes recorded");

        let mut report = CommitReport::default();
        let tx = self
            .tx
            .as_deref_mut()
            .ok_or_else(|| AuditError::Storage("Unit of work already finished".into()))?;

        for change in &changes {
            match change.state {
                EntityState::New => {
                    tx.insert(change.kind, &change.row_id, change.columns.clone())?;
                    report.inserted += 1;
                }
                EntityState::Modified | EntityState::Deleted => {
                    let written = match change.original {
                        Some(original) => changed_columns(original, change.columns),
                        None => change.columns.clone(),
                    };
                    if !written.is_empty() {
                        tx.update(change.kind, &change.row_id, written)?;
                    }
                    if change.state == EntityState::Deleted {
                        report.deleted += 1;
                    } else {
                        report.updated += 1;
                    }
                }
                EntityState::Unchanged => {}
            }
        }

        for entry in &entries {
            tx.insert(
                &self.settings.change_log_kind,
                &entry.id.to_key(),
                entry.to_row()?,
            )?;
        }

        drop(changes);
        let tx = self
            .tx
            .take()
            .ok_or_else(|| AuditError::Storage("Unit of work already finished".into()))?;
        tx.commit()?;

        for slot in &mut self.slots {
            slot.state = EntityState::Unchanged;
        }

        info!(
            actor = %self.actor,
            inserted = report.inserted,
            updated = report.updated,
            deleted = report.deleted,
            logged = entries.len(),
            "unit of work committed"
        );
        report.entries = entries;
        Ok(report)
    }

    /// Discard every tracked change
    pub fn rollback(mut self) {
        if let Some(tx) = self.tx.take() {
            tx.rollback();
        }
        debug!(discarded = self.slots.len(), "unit of work rolled back");
    }
}

impl Drop for UnitOfWork<'_> {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            tx.rollback();
            debug!("uncommitted unit of work rolled back on drop");
        }
    }
}

/// Work out what a tracked entity needs at commit
fn classify(slot: &mut TrackedSlot) -> AuditResult<EntityState> {
    if slot.state == EntityState::New {
        return Ok(EntityState::New);
    }

    let is_deleted = slot.is_deleted();
    if slot.deleted_before && !is_deleted {
        return Err(AuditError::Validation(format!(
            "{} {} is deleted and cannot be restored",
            slot.entity.kind(),
            slot.entity.row_id()
        )));
    }
    if !slot.deleted_before && is_deleted {
        return Ok(EntityState::Deleted);
    }

    let columns = slot.entity.columns()?;
    match &slot.original {
        Some(original) if !changed_columns(original, &columns).is_empty() => {
            Ok(EntityState::Modified)
        }
        _ => Ok(EntityState::Unchanged),
    }
}
