//! Creation and update stamps

use chrono::{DateTime, Utc};

use crate::models::{ActorContext, EntityState};

use super::TrackedSlot;

/// Stamp every NEW and MODIFIED entity; returns how many were touched
///
/// NEW entities get `created_at`/`created_by` unless already set. NEW and
/// MODIFIED entities get `updated_at = now` and, when an actor is bound,
/// `updated_by`. DELETED entities are left to the cascader.
pub(super) fn stamp(slots: &mut [TrackedSlot], actor: ActorContext, now: DateTime<Utc>) -> usize {
    let mut stamped = 0;

    for slot in slots.iter_mut() {
        match slot.state {
            EntityState::New => {
                if let Some(audited) = slot.entity.as_creation_audited() {
                    let stamp = audited.creation_stamp_mut();
                    if stamp.created_at.is_none() {
                        stamp.created_at = Some(now);
                    }
                    if stamp.created_by.is_none() {
                        stamp.created_by = actor.id();
                    }
                }
            }
            EntityState::Modified => {}
            EntityState::Deleted | EntityState::Unchanged => continue,
        }

        if let Some(audited) = slot.entity.as_update_audited() {
            let stamp = audited.update_stamp_mut();
            stamp.updated_at = Some(now);
            if let Some(id) = actor.id() {
                stamp.updated_by = Some(id);
            }
        }
        stamped += 1;
    }

    stamped
}
