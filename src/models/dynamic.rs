//! Schema-driven entities
//!
//! Kinds declared in the settings file have no Rust type; their rows are held
//! as `DynamicEntity` values whose capabilities and relations come from a
//! `KindSchema`.

use std::any::Any;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AuditError, AuditResult};

use super::entity::{json_type, Row, TrackedEntity, ID_COLUMN};
use super::ids::EntityId;
use super::relation::Relation;
use super::stamps::{
    CreationAudited, CreationStamp, SoftDeletable, SoftDeleteMarker, UpdateAudited, UpdateStamp,
    AUDIT_COLUMNS, CREATED_AT, CREATED_BY, DELETED_AT, DELETED_BY, IS_DELETED, UPDATED_AT,
    UPDATED_BY,
};

/// How a schema relation finds its target rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "link", rename_all = "snake_case")]
pub enum LinkSchema {
    /// This row stores the target id in `column`
    Column { column: String },
    /// Target rows store this row's id in `foreign_key`
    Referenced { foreign_key: String },
}

/// A relation declared in the settings schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationSchema {
    pub name: String,
    pub target: String,
    #[serde(flatten)]
    pub link: LinkSchema,
    #[serde(default)]
    pub cascade: bool,
}

/// Declaration of one dynamic kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindSchema {
    pub name: String,
    #[serde(default)]
    pub creation_audit: bool,
    #[serde(default)]
    pub update_audit: bool,
    #[serde(default)]
    pub soft_delete: bool,
    #[serde(default)]
    pub relations: Vec<RelationSchema>,
}

impl KindSchema {
    /// A kind with no capabilities and no relations
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            creation_audit: false,
            update_audit: false,
            soft_delete: false,
            relations: Vec::new(),
        }
    }

    /// Enable creation and update stamping
    pub fn audited(mut self) -> Self {
        self.creation_audit = true;
        self.update_audit = true;
        self
    }

    pub fn soft_deletable(mut self) -> Self {
        self.soft_delete = true;
        self
    }

    /// Add a relation whose targets reference this kind through `foreign_key`
    pub fn owns(
        mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
        cascade: bool,
    ) -> Self {
        self.relations.push(RelationSchema {
            name: name.into(),
            target: target.into(),
            link: LinkSchema::Referenced {
                foreign_key: foreign_key.into(),
            },
            cascade,
        });
        self
    }

    /// Add a relation to the single row whose id is stored in `column`
    pub fn links(
        mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        column: impl Into<String>,
        cascade: bool,
    ) -> Self {
        self.relations.push(RelationSchema {
            name: name.into(),
            target: target.into(),
            link: LinkSchema::Column {
                column: column.into(),
            },
            cascade,
        });
        self
    }
}

/// A row of a schema-declared kind
#[derive(Debug, Clone)]
pub struct DynamicEntity {
    schema: Arc<KindSchema>,
    id: Option<EntityId>,
    fields: Row,
    creation: Option<CreationStamp>,
    update: Option<UpdateStamp>,
    deletion: Option<SoftDeleteMarker>,
}

impl DynamicEntity {
    /// Build a new entity from caller-supplied fields
    ///
    /// A fresh id is assigned when `fields` has none. Audit columns are
    /// rejected: they are owned by the stamper and the cascader.
    pub fn new(schema: Arc<KindSchema>, mut fields: Row) -> AuditResult<Self> {
        if let Some(column) = fields.keys().find(|k| AUDIT_COLUMNS.contains(&k.as_str())) {
            return Err(AuditError::Validation(format!(
                "column '{}' is managed by the audit layer",
                column
            )));
        }
        if !fields.contains_key(ID_COLUMN) {
            fields.insert(ID_COLUMN.to_string(), Value::from(EntityId::new()));
        }
        Self::from_row(schema, fields)
    }

    /// Rebuild an entity from a stored row
    pub fn from_row(schema: Arc<KindSchema>, mut row: Row) -> AuditResult<Self> {
        let id = match row.remove(ID_COLUMN) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(EntityId::parse(&s).map_err(|e| {
                AuditError::Validation(format!("invalid id '{}' for {}: {}", s, schema.name, e))
            })?),
            Some(other) => {
                return Err(AuditError::Validation(format!(
                    "id for {} must be a string, got {}",
                    schema.name,
                    json_type(&other)
                )))
            }
        };

        let creation = if schema.creation_audit {
            Some(take_columns(&mut row, &[CREATED_AT, CREATED_BY], &schema.name)?)
        } else {
            None
        };
        let update = if schema.update_audit {
            Some(take_columns(&mut row, &[UPDATED_AT, UPDATED_BY], &schema.name)?)
        } else {
            None
        };
        let deletion = if schema.soft_delete {
            Some(take_columns(
                &mut row,
                &[IS_DELETED, DELETED_AT, DELETED_BY],
                &schema.name,
            )?)
        } else {
            None
        };

        Ok(Self {
            schema,
            id,
            fields: row,
            creation,
            update,
            deletion,
        })
    }

    pub fn schema(&self) -> &KindSchema {
        &self.schema
    }

    /// Non-audit columns
    pub fn fields(&self) -> &Row {
        &self.fields
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }

    /// Set a plain column
    pub fn set(&mut self, column: impl Into<String>, value: Value) -> AuditResult<()> {
        let column = column.into();
        if column == ID_COLUMN || AUDIT_COLUMNS.contains(&column.as_str()) {
            return Err(AuditError::Validation(format!(
                "column '{}' cannot be set directly",
                column
            )));
        }
        self.fields.insert(column, value);
        Ok(())
    }

    /// Apply every column of `patch`; nothing is applied if any column is rejected
    pub fn apply_patch(&mut self, patch: Row) -> AuditResult<()> {
        if let Some(column) = patch
            .keys()
            .find(|k| k.as_str() == ID_COLUMN || AUDIT_COLUMNS.contains(&k.as_str()))
        {
            return Err(AuditError::Validation(format!(
                "column '{}' cannot be set directly",
                column
            )));
        }
        self.fields.extend(patch);
        Ok(())
    }
}

fn take_columns<S: DeserializeOwned>(
    row: &mut Row,
    columns: &[&str],
    kind: &str,
) -> AuditResult<S> {
    let mut part = Row::new();
    for column in columns {
        if let Some(value) = row.remove(*column) {
            part.insert(column.to_string(), value);
        }
    }
    serde_json::from_value(Value::Object(part))
        .map_err(|e| AuditError::Storage(format!("Malformed audit columns in {}: {}", kind, e)))
}

fn merge_columns<S: Serialize>(row: &mut Row, part: &S, kind: &str, row_id: &str) -> AuditResult<()> {
    match serde_json::to_value(part) {
        Ok(Value::Object(columns)) => {
            row.extend(columns);
            Ok(())
        }
        Ok(other) => Err(AuditError::serialization(
            kind,
            row_id,
            format!("expected a column map, got {}", json_type(&other)),
        )),
        Err(e) => Err(AuditError::serialization(kind, row_id, e.to_string())),
    }
}

impl TrackedEntity for DynamicEntity {
    fn kind(&self) -> &str {
        &self.schema.name
    }

    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn columns(&self) -> AuditResult<Row> {
        let row_id = self.row_id();
        let mut row = self.fields.clone();
        row.insert(
            ID_COLUMN.to_string(),
            self.id.map(Value::from).unwrap_or(Value::Null),
        );
        if let Some(stamp) = &self.creation {
            merge_columns(&mut row, stamp, &self.schema.name, &row_id)?;
        }
        if let Some(stamp) = &self.update {
            merge_columns(&mut row, stamp, &self.schema.name, &row_id)?;
        }
        if let Some(marker) = &self.deletion {
            merge_columns(&mut row, marker, &self.schema.name, &row_id)?;
        }
        Ok(row)
    }

    fn relations(&self) -> Vec<Relation> {
        self.schema
            .relations
            .iter()
            .map(|rel| {
                let relation = match &rel.link {
                    LinkSchema::Column { column } => {
                        let target = self
                            .fields
                            .get(column)
                            .and_then(Value::as_str)
                            .and_then(|s| EntityId::parse(s).ok());
                        Relation::one(&rel.name, &rel.target, target)
                    }
                    LinkSchema::Referenced { foreign_key } => {
                        Relation::referenced(&rel.name, &rel.target, foreign_key)
                    }
                };
                if rel.cascade {
                    relation.cascade()
                } else {
                    relation
                }
            })
            .collect()
    }

    fn as_creation_audited(&mut self) -> Option<&mut dyn CreationAudited> {
        if self.creation.is_some() {
            Some(self)
        } else {
            None
        }
    }

    fn as_update_audited(&mut self) -> Option<&mut dyn UpdateAudited> {
        if self.update.is_some() {
            Some(self)
        } else {
            None
        }
    }

    fn as_soft_deletable(&mut self) -> Option<&mut dyn SoftDeletable> {
        if self.deletion.is_some() {
            Some(self)
        } else {
            None
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// The capability impls are only handed out when the matching column group
// exists, so the `get_or_insert_with` fallbacks never run in practice.

impl CreationAudited for DynamicEntity {
    fn creation_stamp(&self) -> &CreationStamp {
        static EMPTY: CreationStamp = CreationStamp {
            created_at: None,
            created_by: None,
        };
        self.creation.as_ref().unwrap_or(&EMPTY)
    }

    fn creation_stamp_mut(&mut self) -> &mut CreationStamp {
        self.creation.get_or_insert_with(CreationStamp::default)
    }
}

impl UpdateAudited for DynamicEntity {
    fn update_stamp(&self) -> &UpdateStamp {
        static EMPTY: UpdateStamp = UpdateStamp {
            updated_at: None,
            updated_by: None,
        };
        self.update.as_ref().unwrap_or(&EMPTY)
    }

    fn update_stamp_mut(&mut self) -> &mut UpdateStamp {
        self.update.get_or_insert_with(UpdateStamp::default)
    }
}

impl SoftDeletable for DynamicEntity {
    fn delete_marker(&self) -> &SoftDeleteMarker {
        static EMPTY: SoftDeleteMarker = SoftDeleteMarker {
            is_deleted: false,
            deleted_at: None,
            deleted_by: None,
        };
        self.deletion.as_ref().unwrap_or(&EMPTY)
    }

    fn delete_marker_mut(&mut self) -> &mut SoftDeleteMarker {
        self.deletion.get_or_insert_with(SoftDeleteMarker::default)
    }
}
