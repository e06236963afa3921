//! Per-query execution options

use std::collections::BTreeMap;

use serde_json::Value;

/// Option key that lifts the soft-delete filter for one query
pub const INCLUDE_DELETED: &str = "include_deleted";

/// Named options carried by a query
///
/// Only an explicit boolean `true` under `include_deleted` disables the
/// soft-delete filter; absent keys, `false`, or values of any other type keep
/// it on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionOptions {
    values: BTreeMap<String, Value>,
}

impl ExecutionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options that return soft-deleted rows as well
    pub fn including_deleted() -> Self {
        Self::new().with(INCLUDE_DELETED, Value::Bool(true))
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn includes_deleted(&self) -> bool {
        matches!(self.values.get(INCLUDE_DELETED), Some(Value::Bool(true)))
    }
}

impl From<bool> for ExecutionOptions {
    /// `true` means include deleted rows
    fn from(include_deleted: bool) -> Self {
        Self::new().with(INCLUDE_DELETED, Value::Bool(include_deleted))
    }
}
