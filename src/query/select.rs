//! Query descriptions
//!
//! A `Query` only describes what to read. It cannot be executed directly;
//! it has to be prepared by a `QueryPipeline` first.

use serde_json::Value;

use crate::models::{EntityId, Relation, RelationLink, ID_COLUMN};

use super::options::ExecutionOptions;
use super::predicate::Predicate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// How joined rows are matched to the root row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOn {
    /// Joined rows hold the root row's id in `foreign_key`
    Referenced { foreign_key: String },
    /// The root row holds the joined row's id in `column`
    Column { column: String },
}

/// Rows of another kind loaded alongside each root row
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub(crate) alias: String,
    pub(crate) target_kind: String,
    pub(crate) on: JoinOn,
    pub(crate) predicates: Vec<Predicate>,
}

impl Join {
    pub fn referenced(
        alias: impl Into<String>,
        target_kind: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            alias: alias.into(),
            target_kind: target_kind.into(),
            on: JoinOn::Referenced {
                foreign_key: foreign_key.into(),
            },
            predicates: Vec::new(),
        }
    }

    pub fn column(
        alias: impl Into<String>,
        target_kind: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self {
            alias: alias.into(),
            target_kind: target_kind.into(),
            on: JoinOn::Column {
                column: column.into(),
            },
            predicates: Vec::new(),
        }
    }

    /// Restrict the joined rows
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn target_kind(&self) -> &str {
        &self.target_kind
    }

    pub fn on(&self) -> &JoinOn {
        &self.on
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }
}

/// A read against one kind
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub(crate) kind: String,
    pub(crate) predicates: Vec<Predicate>,
    pub(crate) joins: Vec<Join>,
    pub(crate) options: ExecutionOptions,
    pub(crate) order_by: Option<(String, SortOrder)>,
    pub(crate) limit: Option<usize>,
}

impl Query {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            predicates: Vec::new(),
            joins: Vec::new(),
            options: ExecutionOptions::default(),
            order_by: None,
            limit: None,
        }
    }

    /// Rows reachable from `parent` along `relation`
    ///
    /// Returns `None` when the relation currently points at nothing.
    pub fn for_relation(relation: &Relation, parent: Option<EntityId>) -> Option<Self> {
        let query = Self::new(&relation.target_kind);
        match &relation.link {
            RelationLink::One(target) => {
                target.map(|id| query.filter(Predicate::eq(ID_COLUMN, id)))
            }
            RelationLink::Many(targets) if targets.is_empty() => None,
            RelationLink::Many(targets) => Some(query.filter(Predicate::is_in(
                ID_COLUMN,
                targets.iter().map(|&id| Value::from(id)).collect(),
            ))),
            RelationLink::Referenced { foreign_key } => {
                parent.map(|id| query.filter(Predicate::eq(foreign_key.as_str(), id)))
            }
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Shorthand for `filter(Predicate::eq(column, value))`
    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Predicate::eq(column, value))
    }

    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    /// Return soft-deleted rows too
    pub fn include_deleted(mut self) -> Self {
        self.options = ExecutionOptions::including_deleted();
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.order_by = Some((column.into(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }
}
