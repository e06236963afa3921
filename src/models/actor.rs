//! Actor context
//!
//! The identity a unit of work attributes its mutations to. It is passed
//! explicitly to `Database::begin` and never read from ambient state.

use std::fmt;

use super::ids::ActorId;

/// Identity bound to one unit of work; `None` marks a system-initiated action
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActorContext {
    actor: Option<ActorId>,
}

impl ActorContext {
    /// Context for actions performed by the system itself
    pub fn system() -> Self {
        Self { actor: None }
    }

    /// Context for actions performed by a known actor
    pub fn actor(id: ActorId) -> Self {
        Self { actor: Some(id) }
    }

    /// The acting identity, if any
    pub fn id(&self) -> Option<ActorId> {
        self.actor
    }

    pub fn is_system(&self) -> bool {
        self.actor.is_none()
    }
}

impl From<ActorId> for ActorContext {
    fn from(id: ActorId) -> Self {
        Self::actor(id)
    }
}

impl From<Option<ActorId>> for ActorContext {
    fn from(actor: Option<ActorId>) -> Self {
        Self { actor }
    }
}

impl fmt::Display for ActorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.actor {
            Some(id) => write!(f, "{}", id),
            None => write!(f, "system"),
        }
    }
}
