//! Core data model for the audit layer
//!
//! Identities, the actor context, audit column groups with their capability
//! traits, ownership relations, and the entity traits the unit of work
//! operates on.

pub mod actor;
pub mod dynamic;
pub mod entity;
pub mod ids;
pub mod relation;
pub mod stamps;

pub use actor::ActorContext;
pub use dynamic::{DynamicEntity, KindSchema, LinkSchema, RelationSchema};
pub use entity::{EntityKey, EntityState, Record, Row, TrackedEntity, ID_COLUMN, MISSING_ROW_ID};
pub use ids::{ActorId, ChangeId, EntityId};
pub use relation::{Relation, RelationLink};
pub use stamps::{
    CreationAudited, CreationStamp, SoftDeletable, SoftDeleteMarker, UpdateAudited, UpdateStamp,
};
