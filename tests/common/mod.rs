//! Shared fixtures for the integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use softaudit::config::AuditSettings;
use softaudit::models::{CreationStamp, Row, SoftDeleteMarker, UpdateStamp};
use softaudit::storage::{RawRead, StorageEngine, StorageTransaction, Store};
use softaudit::{
    AuditError, AuditResult, CreationAudited, Database, EntityId, Record, Registry, Relation,
    SoftDeletable, UpdateAudited,
};

/// Owns contacts (cascading) and notes (not cascading)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: EntityId,
    pub name: String,
    #[serde(flatten)]
    pub creation: CreationStamp,
    #[serde(flatten)]
    pub update: UpdateStamp,
    #[serde(flatten)]
    pub deletion: SoftDeleteMarker,
}

impl Customer {
    pub fn new(name: &str) -> Self {
        Self {
            id: EntityId::new(),
            name: name.to_string(),
            creation: CreationStamp::default(),
            update: UpdateStamp::default(),
            deletion: SoftDeleteMarker::default(),
        }
    }
}

impl Record for Customer {
    const KIND: &'static str = "customers";

    fn record_id(&self) -> Option<EntityId> {
        Some(self.id)
    }

    fn record_relations(&self) -> Vec<Relation> {
        vec![
            Relation::referenced("contacts", Contact::KIND, "customer_id").cascade(),
            Relation::referenced("notes", Note::KIND, "customer_id"),
        ]
    }

    fn creation_audit(&mut self) -> Option<&mut dyn CreationAudited> {
        Some(self)
    }

    fn update_audit(&mut self) -> Option<&mut dyn UpdateAudited> {
        Some(self)
    }

    fn soft_delete(&mut self) -> Option<&mut dyn SoftDeletable> {
        Some(self)
    }
}

impl CreationAudited for Customer {
    fn creation_stamp(&self) -> &CreationStamp {
        &self.creation
    }

    fn creation_stamp_mut(&mut self) -> &mut CreationStamp {
        &mut self.creation
    }
}

impl UpdateAudited for Customer {
    fn update_stamp(&self) -> &UpdateStamp {
        &self.update
    }

    fn update_stamp_mut(&mut self) -> &mut UpdateStamp {
        &mut self.update
    }
}

impl SoftDeletable for Customer {
    fn delete_marker(&self) -> &SoftDeleteMarker {
        &self.deletion
    }

    fn delete_marker_mut(&mut self) -> &mut SoftDeleteMarker {
        &mut self.deletion
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: EntityId,
    pub customer_id: EntityId,
    pub name: String,
    #[serde(flatten)]
    pub creation: CreationStamp,
    #[serde(flatten)]
    pub deletion: SoftDeleteMarker,
}

impl Contact {
    pub fn new(customer: &Customer, name: &str) -> Self {
        Self {
            id: EntityId::new(),
            customer_id: customer.id,
            name: name.to_string(),
            creation: CreationStamp::default(),
            deletion: SoftDeleteMarker::default(),
        }
    }
}

impl Record for Contact {
    const KIND: &'static str = "contacts";

    fn record_id(&self) -> Option<EntityId> {
        Some(self.id)
    }

    fn creation_audit(&mut self) -> Option<&mut dyn CreationAudited> {
        Some(self)
    }

    fn soft_delete(&mut self) -> Option<&mut dyn SoftDeletable> {
        Some(self)
    }
}

impl CreationAudited for Contact {
    fn creation_stamp(&self) -> &CreationStamp {
        &self.creation
    }

    fn creation_stamp_mut(&mut self) -> &mut CreationStamp {
        &mut self.creation
    }
}

impl SoftDeletable for Contact {
    fn delete_marker(&self) -> &SoftDeleteMarker {
        &self.deletion
    }

    fn delete_marker_mut(&mut self) -> &mut SoftDeleteMarker {
        &mut self.deletion
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: EntityId,
    pub customer_id: EntityId,
    pub text: String,
    #[serde(flatten)]
    pub deletion: SoftDeleteMarker,
}

impl Note {
    pub fn new(customer: &Customer, text: &str) -> Self {
        Self {
            id: EntityId::new(),
            customer_id: customer.id,
            text: text.to_string(),
            deletion: SoftDeleteMarker::default(),
        }
    }
}

impl Record for Note {
    const KIND: &'static str = "notes";

    fn record_id(&self) -> Option<EntityId> {
        Some(self.id)
    }

    fn soft_delete(&mut self) -> Option<&mut dyn SoftDeletable> {
        Some(self)
    }
}

impl SoftDeletable for Note {
    fn delete_marker(&self) -> &SoftDeleteMarker {
        &self.deletion
    }

    fn delete_marker_mut(&mut self) -> &mut SoftDeleteMarker {
        &mut self.deletion
    }
}

/// Linked through a cascading `next` edge, so nodes can form cycles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: EntityId,
    pub label: String,
    pub next: Option<EntityId>,
    #[serde(flatten)]
    pub deletion: SoftDeleteMarker,
}

impl Node {
    pub fn new(label: &str) -> Self {
        Self {
            id: EntityId::new(),
            label: label.to_string(),
            next: None,
            deletion: SoftDeleteMarker::default(),
        }
    }
}

impl Record for Node {
    const KIND: &'static str = "nodes";

    fn record_id(&self) -> Option<EntityId> {
        Some(self.id)
    }

    fn record_relations(&self) -> Vec<Relation> {
        vec![Relation::one("next", Node::KIND, self.next).cascade()]
    }

    fn soft_delete(&mut self) -> Option<&mut dyn SoftDeletable> {
        Some(self)
    }
}

impl SoftDeletable for Node {
    fn delete_marker(&self) -> &SoftDeleteMarker {
        &self.deletion
    }

    fn delete_marker_mut(&mut self) -> &mut SoftDeleteMarker {
        &mut self.deletion
    }
}

/// No audit capabilities at all
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: EntityId,
    pub label: String,
}

impl Tag {
    pub fn new(label: &str) -> Self {
        Self {
            id: EntityId::new(),
            label: label.to_string(),
        }
    }
}

impl Record for Tag {
    const KIND: &'static str = "tags";

    fn record_id(&self) -> Option<EntityId> {
        Some(self.id)
    }
}

pub fn registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .register::<Customer>()
        .register::<Contact>()
        .register::<Note>()
        .register::<Node>()
        .register::<Tag>();
    registry
}

pub fn database() -> Database {
    Database::in_memory(registry())
}

/// Engine whose commits fail while the switch is on
pub struct FailingEngine {
    inner: Store,
    fail_commit: Arc<AtomicBool>,
}

impl FailingEngine {
    pub fn new() -> (Self, Arc<AtomicBool>) {
        let switch = Arc::new(AtomicBool::new(false));
        let engine = Self {
            inner: Store::in_memory(),
            fail_commit: Arc::clone(&switch),
        };
        (engine, switch)
    }
}

impl StorageEngine for FailingEngine {
    fn begin(&self) -> AuditResult<Box<dyn StorageTransaction + '_>> {
        Ok(Box::new(FailingTransaction {
            inner: self.inner.begin()?,
            fail: self.fail_commit.load(Ordering::SeqCst),
        }))
    }
}

struct FailingTransaction<'a> {
    inner: Box<dyn StorageTransaction + 'a>,
    fail: bool,
}

impl StorageTransaction for FailingTransaction<'_> {
    fn scan(&self, kind: &str, read: RawRead) -> AuditResult<Vec<Row>> {
        self.inner.scan(kind, read)
    }

    fn fetch(&self, kind: &str, row_id: &str, read: RawRead) -> AuditResult<Option<Row>> {
        self.inner.fetch(kind, row_id, read)
    }

    fn insert(&mut self, kind: &str, row_id: &str, row: Row) -> AuditResult<()> {
        self.inner.insert(kind, row_id, row)
    }

    fn update(&mut self, kind: &str, row_id: &str, changes: Row) -> AuditResult<()> {
        self.inner.update(kind, row_id, changes)
    }

    fn commit(self: Box<Self>) -> AuditResult<()> {
        let this = *self;
        if this.fail {
            this.inner.rollback();
            return Err(AuditError::Storage("disk full".into()));
        }
        this.inner.commit()
    }

    fn rollback(self: Box<Self>) {
        let this = *self;
        this.inner.rollback()
    }
}

pub fn failing_database() -> (Database, Arc<AtomicBool>) {
    let (engine, switch) = FailingEngine::new();
    (
        Database::new(Box::new(engine), registry(), AuditSettings::default()),
        switch,
    )
}
