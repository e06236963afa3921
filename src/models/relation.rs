//! Ownership edges between entities
//!
//! An edge points from a parent to the rows it owns. Only edges flagged
//! `cascade` carry the soft-delete marker; the graph may contain cycles.

use super::ids::EntityId;

/// How the owned rows are located
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationLink {
    /// The parent holds the id of a single owned row
    One(Option<EntityId>),
    /// The parent holds the ids of a collection of owned rows
    Many(Vec<EntityId>),
    /// Owned rows hold the parent's id in `foreign_key`
    Referenced { foreign_key: String },
}

/// A named, directed ownership edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub name: String,
    pub target_kind: String,
    pub link: RelationLink,
    pub cascade: bool,
}

impl Relation {
    /// Edge to a single row whose id the parent stores
    pub fn one(
        name: impl Into<String>,
        target_kind: impl Into<String>,
        target: Option<EntityId>,
    ) -> Self {
        Self {
            name: name.into(),
            target_kind: target_kind.into(),
            link: RelationLink::One(target),
            cascade: false,
        }
    }

    /// Edge to a collection of rows whose ids the parent stores
    pub fn many(
        name: impl Into<String>,
        target_kind: impl Into<String>,
        targets: Vec<EntityId>,
    ) -> Self {
        Self {
            name: name.into(),
            target_kind: target_kind.into(),
            link: RelationLink::Many(targets),
            cascade: false,
        }
    }

    /// Edge to every row of `target_kind` whose `foreign_key` column holds the parent id
    pub fn referenced(
        name: impl Into<String>,
        target_kind: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target_kind: target_kind.into(),
            link: RelationLink::Referenced {
                foreign_key: foreign_key.into(),
            },
            cascade: false,
        }
    }

    /// Enable soft-delete cascading along this edge
    pub fn cascade(mut self) -> Self {
        self.cascade = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let rel = Relation::referenced("contacts", "contacts", "customer_id").cascade();
        assert!(rel.cascade);
        assert_eq!(
            rel.link,
            RelationLink::Referenced {
                foreign_key: "customer_id".into()
            }
        );

        let rel = Relation::one("owner", "customers", None);
        assert!(!rel.cascade);
        assert_eq!(rel.link, RelationLink::One(None));
    }
}
