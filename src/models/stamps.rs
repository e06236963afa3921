//! Audit columns and the capability traits that expose them
//!
//! Entity types opt into auditing by embedding these column groups (usually
//! with `#[serde(flatten)]`) and implementing the matching capability trait.
//! The stamper and the cascader only ever talk to entities through these
//! traits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::ActorId;

pub const CREATED_AT: &str = "created_at";
pub const CREATED_BY: &str = "created_by";
pub const UPDATED_AT: &str = "updated_at";
pub const UPDATED_BY: &str = "updated_by";
pub const IS_DELETED: &str = "is_deleted";
pub const DELETED_AT: &str = "deleted_at";
pub const DELETED_BY: &str = "deleted_by";

/// Every column owned by the audit layer
pub const AUDIT_COLUMNS: [&str; 7] = [
    CREATED_AT, CREATED_BY, UPDATED_AT, UPDATED_BY, IS_DELETED, DELETED_AT, DELETED_BY,
];

/// Columns rewritten on every insert and update
pub const UPDATE_STAMP_COLUMNS: [&str; 2] = [UPDATED_AT, UPDATED_BY];

/// Creation metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreationStamp {
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by: Option<ActorId>,
}

/// Last-update metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStamp {
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_by: Option<ActorId>,
}

/// Logical-delete marker
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftDeleteMarker {
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted_by: Option<ActorId>,
}

impl SoftDeleteMarker {
    /// Flip the flag; returns false when the row was already deleted
    ///
    /// `deleted_at` and `deleted_by` are filled in by the cascader at commit.
    pub fn mark(&mut self) -> bool {
        if self.is_deleted {
            return false;
        }
        self.is_deleted = true;
        true
    }
}

/// Entities that record when and by whom they were created
pub trait CreationAudited {
    fn creation_stamp(&self) -> &CreationStamp;
    fn creation_stamp_mut(&mut self) -> &mut CreationStamp;
}

/// Entities that record their last update
pub trait UpdateAudited {
    fn update_stamp(&self) -> &UpdateStamp;
    fn update_stamp_mut(&mut self) -> &mut UpdateStamp;
}

/// Entities that are logically deleted instead of removed
pub trait SoftDeletable {
    fn delete_marker(&self) -> &SoftDeleteMarker;
    fn delete_marker_mut(&mut self) -> &mut SoftDeleteMarker;

    fn is_deleted(&self) -> bool {
        self.delete_marker().is_deleted
    }

    /// Mark deleted; returns false if it already was
    fn mark_deleted(&mut self) -> bool {
        self.delete_marker_mut().mark()
    }
}
