//! Tracked entities
//!
//! `TrackedEntity` is the object-safe view the unit of work holds. Typed
//! domain structs implement the smaller `Record` trait and get
//! `TrackedEntity` for free; schema-driven rows use `DynamicEntity`.

use std::any::Any;
use std::fmt;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::error::{AuditError, AuditResult};

use super::ids::EntityId;
use super::relation::Relation;
use super::stamps::{CreationAudited, SoftDeletable, UpdateAudited};

/// A persisted row: column name to JSON value
pub type Row = serde_json::Map<String, Value>;

/// Identity column shared by every kind
pub const ID_COLUMN: &str = "id";

/// Row id recorded for entities that have no identity
pub const MISSING_ROW_ID: &str = "None";

/// Stable identity of an entity across kinds
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub kind: String,
    pub id: EntityId,
}

impl EntityKey {
    pub fn new(kind: impl Into<String>, id: EntityId) -> Self {
        Self {
            kind: kind.into(),
            id,
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id.to_key())
    }
}

/// Transaction-local state of a tracked entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    New,
    Modified,
    Deleted,
    Unchanged,
}

impl EntityState {
    /// Whether the entity produces a write and a change-log entry at commit
    pub fn is_pending(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "NEW"),
            Self::Modified => write!(f, "MODIFIED"),
            Self::Deleted => write!(f, "DELETED"),
            Self::Unchanged => write!(f, "UNCHANGED"),
        }
    }
}

/// Anything the unit of work can track, stamp, cascade through and log
pub trait TrackedEntity: fmt::Debug + Send + 'static {
    /// Kind (table) name
    fn kind(&self) -> &str;

    fn id(&self) -> Option<EntityId>;

    /// Persisted scalar columns, relationships excluded
    fn columns(&self) -> AuditResult<Row>;

    /// Outgoing ownership edges
    fn relations(&self) -> Vec<Relation> {
        Vec::new()
    }

    fn as_creation_audited(&mut self) -> Option<&mut dyn CreationAudited> {
        None
    }

    fn as_update_audited(&mut self) -> Option<&mut dyn UpdateAudited> {
        None
    }

    fn as_soft_deletable(&mut self) -> Option<&mut dyn SoftDeletable> {
        None
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn key(&self) -> Option<EntityKey> {
        self.id().map(|id| EntityKey::new(self.kind(), id))
    }

    /// Identity rendered for the change log, "None" when absent
    fn row_id(&self) -> String {
        self.id()
            .map(|id| id.to_key())
            .unwrap_or_else(|| MISSING_ROW_ID.to_string())
    }
}

/// Typed entities stored through serde
///
/// Capabilities are declared by overriding the accessor for each trait the
/// type implements, e.g. `fn soft_delete(&mut self) -> Option<&mut dyn
/// SoftDeletable> { Some(self) }`.
pub trait Record: Serialize + DeserializeOwned + fmt::Debug + Send + 'static {
    const KIND: &'static str;

    fn record_id(&self) -> Option<EntityId>;

    fn record_relations(&self) -> Vec<Relation> {
        Vec::new()
    }

    fn creation_audit(&mut self) -> Option<&mut dyn CreationAudited> {
        None
    }

    fn update_audit(&mut self) -> Option<&mut dyn UpdateAudited> {
        None
    }

    fn soft_delete(&mut self) -> Option<&mut dyn SoftDeletable> {
        None
    }
}

impl<T: Record> TrackedEntity for T {
    fn kind(&self) -> &str {
        T::KIND
    }

    fn id(&self) -> Option<EntityId> {
        self.record_id()
    }

    fn columns(&self) -> AuditResult<Row> {
        match serde_json::to_value(self) {
            Ok(Value::Object(row)) => Ok(row),
            Ok(other) => Err(AuditError::serialization(
                T::KIND,
                self.row_id(),
                format!("expected a column map, got {}", json_type(&other)),
            )),
            Err(e) => Err(AuditError::serialization(
                T::KIND,
                self.row_id(),
                e.to_string(),
            )),
        }
    }

    fn relations(&self) -> Vec<Relation> {
        self.record_relations()
    }

    fn as_creation_audited(&mut self) -> Option<&mut dyn CreationAudited> {
        self.creation_audit()
    }

    fn as_update_audited(&mut self) -> Option<&mut dyn UpdateAudited> {
        self.update_audit()
    }

    fn as_soft_deletable(&mut self) -> Option<&mut dyn SoftDeletable> {
        self.soft_delete()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Name of a JSON value's type, for error messages
pub fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::stamps::SoftDeleteMarker;
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Debug, Serialize, Deserialize)]
    struct Widget {
        id: EntityId,
        name: String,
        #[serde(flatten)]
        deletion: SoftDeleteMarker,
    }

    impl Record for Widget {
        const KIND: &'static str = "widgets";

        fn record_id(&self) -> Option<EntityId> {
            Some(self.id)
        }

        fn soft_delete(&mut self) -> Option<&mut dyn SoftDeletable> {
            Some(self)
        }
    }

    impl SoftDeletable for Widget {
        fn delete_marker(&self) -> &SoftDeleteMarker {
            &self.deletion
        }

        fn delete_marker_mut(&mut self) -> &mut SoftDeleteMarker {
            &mut self.deletion
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Unencodable {
        weights: HashMap<Vec<u8>, u8>,
    }

    impl Record for Unencodable {
        const KIND: &'static str = "unencodable";

        fn record_id(&self) -> Option<EntityId> {
            None
        }
    }

    #[test]
    fn test_record_columns_are_flat() {
        let widget = Widget {
            id: EntityId::new(),
            name: "gear".into(),
            deletion: SoftDeleteMarker::default(),
        };
        let row = widget.columns().unwrap();
        assert_eq!(row["name"], "gear");
        assert_eq!(row["is_deleted"], false);
        assert_eq!(row[ID_COLUMN], Value::from(widget.id));
    }

    #[test]
    fn test_capabilities_through_trait_object() {
        let mut boxed: Box<dyn TrackedEntity> = Box::new(Widget {
            id: EntityId::new(),
            name: "gear".into(),
            deletion: SoftDeleteMarker::default(),
        });
        assert!(boxed.as_creation_audited().is_none());
        let deletable = boxed.as_soft_deletable().unwrap();
        assert!(deletable.mark_deleted());
        assert!(boxed.as_any().downcast_ref::<Widget>().unwrap().deletion.is_deleted);
    }

    #[test]
    fn test_missing_identity_renders_none() {
        let entity = Unencodable {
            weights: HashMap::new(),
        };
        assert_eq!(entity.row_id(), MISSING_ROW_ID);
        assert!(entity.key().is_none());
    }

    #[test]
    fn test_unencodable_columns_fail() {
        let mut weights = HashMap::new();
        weights.insert(vec![1u8, 2], 3u8);
        let entity = Unencodable { weights };
        let err = entity.columns().unwrap_err();
        assert!(err.is_storage_failure());
    }
}
