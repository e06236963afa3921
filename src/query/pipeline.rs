//! The read path
//!
//! Every read goes `Query` → `QueryPipeline::prepare` → `PreparedQuery` →
//! execute. `PreparedQuery` has no public constructor, so a query that has
//! not passed through the pipeline, and with it the soft-delete filter,
//! cannot reach storage.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::error::AuditResult;
use crate::models::{Row, ID_COLUMN};
use crate::storage::{RawRead, StorageTransaction};

use super::predicate::{compare_rows, Predicate};
use super::select::{Join, JoinOn, Query, SortOrder};

/// A rewrite applied to every query before execution
pub trait QueryStage: Send + Sync {
    fn name(&self) -> &str;

    fn rewrite(&self, query: Query) -> AuditResult<Query>;
}

/// Hides soft-deleted rows from the root kind and from every join
///
/// Lifted only when the query's options carry `include_deleted = true`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftDeleteFilter;

impl QueryStage for SoftDeleteFilter {
    fn name(&self) -> &str {
        "soft_delete_filter"
    }

    fn rewrite(&self, mut query: Query) -> AuditResult<Query> {
        if query.options.includes_deleted() {
            return Ok(query);
        }

        query.predicates.push(Predicate::NotDeleted);
        for join in &mut query.joins {
            join.predicates.push(Predicate::NotDeleted);
        }
        Ok(query)
    }
}

/// Ordered query rewrites ending in the soft-delete filter
///
/// Extra stages run first, in the order they were added; the soft-delete
/// filter always runs last and cannot be removed.
pub struct QueryPipeline {
    stages: Vec<Box<dyn QueryStage>>,
    filter: SoftDeleteFilter,
}

impl Default for QueryPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryPipeline {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            filter: SoftDeleteFilter,
        }
    }

    /// Append a stage ahead of the soft-delete filter
    pub fn with_stage(mut self, stage: impl QueryStage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Names of all stages in execution order
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages
            .iter()
            .map(|stage| stage.name())
            .chain(std::iter::once(self.filter.name()))
            .collect()
    }

    /// Run every stage over `query`
    pub fn prepare(&self, query: Query) -> AuditResult<PreparedQuery> {
        let mut query = query;
        for stage in &self.stages {
            query = stage.rewrite(query)?;
        }
        query = self.filter.rewrite(query)?;
        Ok(PreparedQuery { query })
    }

    /// Prepare and run `query` in `tx`
    pub fn execute(
        &self,
        tx: &dyn StorageTransaction,
        query: Query,
    ) -> AuditResult<Vec<QueryRow>> {
        self.prepare(query)?.execute(tx)
    }

    /// Prepare and run `query` with `overlay` applied to every scan
    pub(crate) fn execute_overlaid(
        &self,
        tx: &dyn StorageTransaction,
        query: Query,
        overlay: &dyn RowOverlay,
    ) -> AuditResult<Vec<QueryRow>> {
        self.prepare(query)?.execute_overlaid(tx, overlay)
    }

    /// Prepare and run `query`, discarding joined rows
    pub fn rows(&self, tx: &dyn StorageTransaction, query: Query) -> AuditResult<Vec<Row>> {
        Ok(self
            .execute(tx, query)?
            .into_iter()
            .map(|r| r.row)
            .collect())
    }
}

/// Uncommitted state laid over stored rows before filtering
///
/// Given every stored row of a kind, returns the rows as the reader should
/// see them. Used by a unit of work so its own reads reflect the entities
/// it tracks.
pub(crate) trait RowOverlay {
    fn overlay(&self, kind: &str, stored: Vec<Row>) -> AuditResult<Vec<Row>>;
}

/// One root row and the rows joined to it, keyed by join alias
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRow {
    pub row: Row,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub related: BTreeMap<String, Vec<Row>>,
}

/// A query that has passed through the pipeline
#[derive(Debug, Clone)]
pub struct PreparedQuery {
    query: Query,
}

impl PreparedQuery {
    /// The rewritten query
    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn execute(&self, tx: &dyn StorageTransaction) -> AuditResult<Vec<QueryRow>> {
        self.run(tx, None)
    }

    pub(crate) fn execute_overlaid(
        &self,
        tx: &dyn StorageTransaction,
        overlay: &dyn RowOverlay,
    ) -> AuditResult<Vec<QueryRow>> {
        self.run(tx, Some(overlay))
    }

    fn scan(
        tx: &dyn StorageTransaction,
        kind: &str,
        overlay: Option<&dyn RowOverlay>,
    ) -> AuditResult<Vec<Row>> {
        let stored = tx.scan(kind, RawRead::grant())?;
        match overlay {
            Some(overlay) => overlay.overlay(kind, stored),
            None => Ok(stored),
        }
    }

    fn run(
        &self,
        tx: &dyn StorageTransaction,
        overlay: Option<&dyn RowOverlay>,
    ) -> AuditResult<Vec<QueryRow>> {
        let query = &self.query;

        let mut rows: Vec<Row> = Self::scan(tx, &query.kind, overlay)?
            .into_iter()
            .filter(|row| query.predicates.iter().all(|p| p.matches(row)))
            .collect();

        if let Some((column, order)) = &query.order_by {
            rows.sort_by(|a, b| {
                let ordering = compare_rows(a, b, column);
                match order {
                    SortOrder::Ascending => ordering,
                    SortOrder::Descending => ordering.reverse(),
                }
            });
        }

        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }

        let mut joined: Vec<(&Join, Vec<Row>)> = Vec::with_capacity(query.joins.len());
        for join in &query.joins {
            let candidates = Self::scan(tx, &join.target_kind, overlay)?
                .into_iter()
                .filter(|row| join.predicates.iter().all(|p| p.matches(row)))
                .collect();
            joined.push((join, candidates));
        }

        debug!(
            kind = %query.kind,
            rows = rows.len(),
            joins = joined.len(),
            include_deleted = query.options.includes_deleted(),
            "query executed"
        );

        Ok(rows
            .into_iter()
            .map(|row| {
                let related = joined
                    .iter()
                    .map(|(join, candidates)| {
                        let matched = candidates
                            .iter()
                            .filter(|candidate| join_matches(&join.on, &row, candidate))
                            .cloned()
                            .collect();
                        (join.alias.clone(), matched)
                    })
                    .collect();
                QueryRow { row, related }
            })
            .collect())
    }
}

fn join_matches(on: &JoinOn, root: &Row, candidate: &Row) -> bool {
    let (left, right) = match on {
        JoinOn::Referenced { foreign_key } => (root.get(ID_COLUMN), candidate.get(foreign_key)),
        JoinOn::Column { column } => (root.get(column), candidate.get(ID_COLUMN)),
    };
    match (left, right) {
        (Some(l), Some(r)) => !l.is_null() && l == r,
        _ => false,
    }
}
