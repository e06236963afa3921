//! Entity service
//!
//! Insert, update, delete and read rows of schema-declared kinds. Each
//! mutating call runs in its own unit of work attributed to the given actor.

use std::sync::Arc;

use serde_json::Value;

use crate::database::Database;
use crate::error::{AuditError, AuditResult};
use crate::models::{
    ActorContext, DynamicEntity, EntityId, KindSchema, LinkSchema, Row, TrackedEntity,
};
use crate::query::{ExecutionOptions, Join, Predicate, Query, QueryRow};
use crate::uow::CommitReport;

/// Service for dynamic entities
pub struct EntityService<'a> {
    db: &'a Database,
}

impl<'a> EntityService<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    fn schema(&self, kind: &str) -> AuditResult<Arc<KindSchema>> {
        self.db
            .registry()
            .schema(kind)
            .ok_or_else(|| AuditError::UnknownKind(kind.to_string()))
    }

    /// Insert a new row; returns its id and the commit report
    pub fn insert(
        &self,
        actor: ActorContext,
        kind: &str,
        fields: Row,
    ) -> AuditResult<(EntityId, CommitReport)> {
        let entity = DynamicEntity::new(self.schema(kind)?, fields)?;
        let id = entity
            .id()
            .ok_or_else(|| AuditError::Validation(format!("{} row has no id", kind)))?;

        let mut uow = self.db.begin(actor)?;
        uow.track(entity)?;
        let report = uow.commit()?;
        Ok((id, report))
    }

    /// Overwrite some columns of an existing, non-deleted row
    pub fn update(
        &self,
        actor: ActorContext,
        kind: &str,
        id: EntityId,
        patch: Row,
    ) -> AuditResult<CommitReport> {
        self.schema(kind)?;
        if patch.is_empty() {
            return Err(AuditError::Validation("No changes specified".into()));
        }

        let mut uow = self.db.begin(actor)?;
        let entity = uow
            .load_dynamic(kind, id)?
            .ok_or_else(|| AuditError::not_found(kind, id.to_key()))?;
        entity.apply_patch(patch)?;
        uow.commit()
    }

    /// Soft-delete a row and everything it owns
    ///
    /// Deleting a row that is already deleted commits nothing.
    pub fn delete(&self, actor: ActorContext, kind: &str, id: EntityId) -> AuditResult<CommitReport> {
        self.schema(kind)?;
        let mut uow = self.db.begin(actor)?;
        if !uow.delete(kind, id)? {
            uow.rollback();
            return Ok(CommitReport::default());
        }
        uow.commit()
    }

    pub fn show(
        &self,
        kind: &str,
        id: EntityId,
        options: ExecutionOptions,
    ) -> AuditResult<Option<Row>> {
        self.schema(kind)?;
        self.db.get_row(kind, id, options)
    }

    /// Rows of `kind` matching every `column = value` filter
    pub fn list(
        &self,
        kind: &str,
        filters: Row,
        options: ExecutionOptions,
    ) -> AuditResult<Vec<Row>> {
        self.schema(kind)?;
        let query = filters
            .into_iter()
            .fold(Query::new(kind), |query, (column, value)| {
                query.filter(Predicate::Eq(column, value))
            })
            .with_options(options);
        self.db.rows(query)
    }

    /// Rows reachable along a declared relation
    pub fn related(
        &self,
        kind: &str,
        id: EntityId,
        relation: &str,
        options: ExecutionOptions,
    ) -> AuditResult<Vec<Row>> {
        self.schema(kind)?;
        self.db.related(kind, id, relation, options)
    }

    /// Rows of `kind` with every declared relation eagerly joined
    pub fn list_with_relations(
        &self,
        kind: &str,
        options: ExecutionOptions,
    ) -> AuditResult<Vec<QueryRow>> {
        let schema = self.schema(kind)?;
        let query = schema
            .relations
            .iter()
            .fold(Query::new(kind), |query, rel| {
                let join = match &rel.link {
                    LinkSchema::Referenced { foreign_key } => {
                        Join::referenced(&rel.name, &rel.target, foreign_key)
                    }
                    LinkSchema::Column { column } => {
                        Join::column(&rel.name, &rel.target, column)
                    }
                };
                query.join(join)
            })
            .with_options(options);
        self.db.query(query)
    }
}

/// Parse a `column=value` argument
///
/// The value is read as JSON when it parses (`3`, `true`, `null`,
/// `"quoted"`), otherwise it is taken as a plain string.
pub fn parse_assignment(arg: &str) -> AuditResult<(String, Value)> {
    let (column, raw) = arg.split_once('=').ok_or_else(|| {
        AuditError::Validation(format!("Expected column=value, got '{}'", arg))
    })?;

    let column = column.trim();
    if column.is_empty() {
        return Err(AuditError::Validation(format!(
            "Missing column name in '{}'",
            arg
        )));
    }

    Ok((column.to_string(), parse_value(raw)))
}

/// Read a cell as a JSON scalar if possible, otherwise as a string
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Collect `column=value` arguments into a row
pub fn parse_assignments<S: AsRef<str>>(args: &[S]) -> AuditResult<Row> {
    let mut row = Row::new();
    for arg in args {
        let (column, value) = parse_assignment(arg.as_ref())?;
        row.insert(column, value);
    }
    Ok(row)
}
