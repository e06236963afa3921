//! Soft-delete propagation
//!
//! Breadth-first walk over cascade relations starting from every entity
//! whose delete marker was set in this unit of work. Relation targets come
//! from the identity map first and from storage otherwise; targets loaded
//! from storage become tracked entities so they are written and logged like
//! any other. The visited set makes cycles harmless.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::error::AuditResult;
use crate::models::{EntityId, EntityKey, EntityState, Relation, RelationLink, ID_COLUMN};
use crate::query::{ExecutionOptions, Query};

use super::UnitOfWork;

/// Propagate soft deletes; returns how many entities were newly marked
pub(super) fn cascade_deletes(uow: &mut UnitOfWork<'_>, now: DateTime<Utc>) -> AuditResult<usize> {
    let actor = uow.actor.id();
    let mut visited: HashSet<usize> = HashSet::new();
    let mut queue: VecDeque<usize> = VecDeque::new();

    for (index, slot) in uow.slots.iter_mut().enumerate() {
        if slot.deleted_before {
            continue;
        }
        let Some(deletable) = slot.entity.as_soft_deletable() else {
            continue;
        };
        let marker = deletable.delete_marker();
        if marker.is_deleted && marker.deleted_at.is_none() {
            visited.insert(index);
            queue.push_back(index);
        }
    }

    let mut cascaded = 0;
    while let Some(index) = queue.pop_front() {
        let slot = &mut uow.slots[index];
        if let Some(deletable) = slot.entity.as_soft_deletable() {
            let marker = deletable.delete_marker_mut();
            if marker.deleted_at.is_none() {
                marker.deleted_at = Some(now);
            }
            if marker.deleted_by.is_none() {
                marker.deleted_by = actor;
            }
        }

        let parent_id = slot.entity.id();
        let parent = slot.entity.key();
        let relations: Vec<Relation> = slot
            .entity
            .relations()
            .into_iter()
            .filter(|r| r.cascade)
            .collect();

        for relation in &relations {
            for target in resolve_relation(uow, relation, parent_id)? {
                if !visited.insert(target) {
                    continue;
                }

                let slot = &mut uow.slots[target];
                let Some(deletable) = slot.entity.as_soft_deletable() else {
                    debug!(
                        relation = %relation.name,
                        kind = %relation.target_kind,
                        "cascade target is not soft-deletable"
                    );
                    continue;
                };
                if !deletable.mark_deleted() {
                    continue;
                }
                if slot.state != EntityState::New {
                    slot.state = EntityState::Deleted;
                }

                debug!(
                    parent = ?parent,
                    relation = %relation.name,
                    target = %slot.entity.row_id(),
                    "soft delete cascaded"
                );
                cascaded += 1;
                queue.push_back(target);
            }
        }
    }

    Ok(cascaded)
}

/// Slot indices of every entity `relation` points at
fn resolve_relation(
    uow: &mut UnitOfWork<'_>,
    relation: &Relation,
    parent: Option<EntityId>,
) -> AuditResult<Vec<usize>> {
    let kind = relation.target_kind.as_str();
    match &relation.link {
        RelationLink::One(None) => Ok(Vec::new()),
        RelationLink::One(Some(id)) => Ok(load_including_deleted(uow, kind, *id)?
            .into_iter()
            .collect()),
        RelationLink::Many(ids) => {
            let mut targets = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(index) = load_including_deleted(uow, kind, *id)? {
                    targets.push(index);
                }
            }
            Ok(targets)
        }
        RelationLink::Referenced { foreign_key } => {
            let Some(parent) = parent else {
                return Ok(Vec::new());
            };
            referencing(uow, kind, foreign_key, parent)
        }
    }
}

fn load_including_deleted(
    uow: &mut UnitOfWork<'_>,
    kind: &str,
    id: EntityId,
) -> AuditResult<Option<usize>> {
    let registry = uow.registry;
    let index = uow.load_slot(kind, id, ExecutionOptions::including_deleted(), |row| {
        registry.materialize(kind, row)
    })?;
    if index.is_none() {
        debug!(kind, id = %id.to_key(), "cascade target not found");
    }
    Ok(index)
}

/// Rows of `kind` whose `foreign_key` holds `parent`
///
/// Tracked entities are matched on their in-memory value so reassignments
/// made in this unit of work are honoured.
fn referencing(
    uow: &mut UnitOfWork<'_>,
    kind: &str,
    foreign_key: &str,
    parent: EntityId,
) -> AuditResult<Vec<usize>> {
    let wanted = Value::from(parent);
    let mut targets = Vec::new();

    for (index, slot) in uow.slots.iter().enumerate() {
        if slot.entity.kind() == kind
            && slot.entity.columns()?.get(foreign_key) == Some(&wanted)
        {
            targets.push(index);
        }
    }

    let query = Query::new(kind)
        .eq(foreign_key, parent)
        .include_deleted();
    let rows = uow.pipeline.rows(uow.tx()?, query)?;

    let registry = uow.registry;
    for row in rows {
        let id = row
            .get(ID_COLUMN)
            .and_then(Value::as_str)
            .and_then(|s| EntityId::parse(s).ok());
        if let Some(id) = id {
            if uow.identity.contains_key(&EntityKey::new(kind, id)) {
                continue;
            }
        }

        let entity = registry.materialize(kind, row.clone())?;
        targets.push(uow.push_slot(entity, EntityState::Unchanged, Some(row)));
    }

    Ok(targets)
}
