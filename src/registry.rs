//! Kind registry
//!
//! Maps kind names to loaders that turn stored rows back into tracked
//! entities. The cascader needs this to materialize relation targets that
//! were never loaded in the current unit of work.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::config::Settings;
use crate::error::{AuditError, AuditResult};
use crate::models::{
    DynamicEntity, KindSchema, Record, Row, TrackedEntity, ID_COLUMN, MISSING_ROW_ID,
};

type Loader = Box<dyn Fn(Row) -> AuditResult<Box<dyn TrackedEntity>> + Send + Sync>;

/// Known entity kinds
#[derive(Default)]
pub struct Registry {
    loaders: HashMap<String, Loader>,
    schemas: HashMap<String, Arc<KindSchema>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.loaders.keys().collect();
        kinds.sort();
        f.debug_struct("Registry").field("kinds", &kinds).finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every dynamic kind declared in `settings`
    pub fn from_settings(settings: &Settings) -> Self {
        let mut registry = Self::new();
        for schema in &settings.schema {
            registry.register_schema(schema.clone());
        }
        registry
    }

    /// Register a typed record kind
    pub fn register<T: Record>(&mut self) -> &mut Self {
        self.loaders.insert(
            T::KIND.to_string(),
            Box::new(|row: Row| {
                let row_id = row
                    .get(ID_COLUMN)
                    .and_then(Value::as_str)
                    .unwrap_or(MISSING_ROW_ID)
                    .to_string();
                serde_json::from_value::<T>(Value::Object(row))
                    .map(|record| Box::new(record) as Box<dyn TrackedEntity>)
                    .map_err(|e| {
                        AuditError::Storage(format!(
                            "Failed to load {} row {}: {}",
                            T::KIND,
                            row_id,
                            e
                        ))
                    })
            }),
        );
        self
    }

    /// Register a schema-driven kind
    pub fn register_schema(&mut self, schema: KindSchema) -> &mut Self {
        let schema = Arc::new(schema);
        let captured = Arc::clone(&schema);
        self.loaders.insert(
            schema.name.clone(),
            Box::new(move |row: Row| {
                DynamicEntity::from_row(Arc::clone(&captured), row)
                    .map(|entity| Box::new(entity) as Box<dyn TrackedEntity>)
            }),
        );
        self.schemas.insert(schema.name.clone(), schema);
        self
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.loaders.contains_key(kind)
    }

    /// Schema of a dynamic kind
    pub fn schema(&self, kind: &str) -> Option<Arc<KindSchema>> {
        self.schemas.get(kind).cloned()
    }

    /// Turn a stored row into an entity of `kind`
    pub fn materialize(&self, kind: &str, row: Row) -> AuditResult<Box<dyn TrackedEntity>> {
        let loader = self
            .loaders
            .get(kind)
            .ok_or_else(|| AuditError::UnknownKind(kind.to_string()))?;
        loader(row)
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.loaders.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}
