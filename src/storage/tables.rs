//! Committed table contents
//!
//! Rows are keyed by kind, then by row id. Both levels are ordered so scans
//! and snapshots come out in a stable order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::Row;

/// A full row image written by one commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowWrite {
    pub kind: String,
    pub row_id: String,
    pub row: Row,
}

/// All committed rows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tables {
    kinds: BTreeMap<String, BTreeMap<String, Row>>,
}

impl Tables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: &str, row_id: &str) -> Option<&Row> {
        self.kinds.get(kind).and_then(|rows| rows.get(row_id))
    }

    pub fn contains(&self, kind: &str, row_id: &str) -> bool {
        self.get(kind, row_id).is_some()
    }

    /// Rows of one kind, ordered by row id
    pub fn rows(&self, kind: &str) -> impl Iterator<Item = (&String, &Row)> {
        self.kinds.get(kind).into_iter().flat_map(|rows| rows.iter())
    }

    /// Store a full row image, replacing any previous one
    pub fn apply(&mut self, write: RowWrite) {
        self.kinds
            .entry(write.kind)
            .or_default()
            .insert(write.row_id, write.row);
    }

    pub fn kinds(&self) -> impl Iterator<Item = &String> {
        self.kinds.keys()
    }

    pub fn row_count(&self) -> usize {
        self.kinds.values().map(|rows| rows.len()).sum()
    }
}
