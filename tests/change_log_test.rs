mod common;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use common::{database, registry, Contact, Customer, Tag};
use softaudit::config::AuditSettings;
use softaudit::models::{DynamicEntity, KindSchema, Row};
use softaudit::storage::Store;
use softaudit::{ActorContext, ActorId, ChangeAction, Database, EntityId, Record};

fn fields(value: serde_json::Value) -> Row {
    match value {
        serde_json::Value::Object(map) => map,
        _ => panic!("expected an object"),
    }
}

#[test]
fn test_one_entry_per_pending_entity() {
    let db = database();
    let customer = Customer::new("Acme");
    let contact = Contact::new(&customer, "Jo");

    let mut uow = db.begin(ActorContext::system()).unwrap();
    uow.track(customer.clone()).unwrap();
    uow.track(contact.clone()).unwrap();
    let report = uow.commit().unwrap();

    assert_eq!(report.inserted, 2);
    assert_eq!(report.entries.len(), 2);
    assert!(report.entries.iter().all(|e| e.action == ChangeAction::Insert && e.success));
    assert_eq!(db.change_log().count().unwrap(), 2);

    let entry = db
        .change_log()
        .for_row("customers", &customer.id.to_key())
        .unwrap()
        .pop()
        .unwrap();
    assert_eq!(entry.changed_data["name"], "Acme");
    assert_eq!(entry.changed_data["id"], customer.id.to_key());
}

#[test]
fn test_update_payload_holds_only_changed_fields() {
    let db = database();
    let customer = Customer::new("a");
    db.with_unit_of_work(ActorContext::system(), |uow| {
        uow.track(customer.clone())?;
        Ok(())
    })
    .unwrap();

    let actor = ActorId::new();
    let mut uow = db.begin(actor).unwrap();
    uow.load::<Customer>(customer.id).unwrap().unwrap().name = "b".into();
    let report = uow.commit().unwrap();

    assert_eq!(report.updated, 1);
    assert_eq!(report.entries.len(), 1);
    assert_eq!(report.entries[0].action, ChangeAction::Update);
    assert_eq!(report.entries[0].changed_data, json!({"name": "b"}));

    let stored = db
        .get::<Customer>(customer.id, Default::default())
        .unwrap()
        .unwrap();
    assert_eq!(stored.name, "b");
    assert_eq!(stored.update.updated_by, Some(actor));
    assert!(stored.update.updated_at.is_some());
    assert_eq!(stored.creation.created_by, None);
}

#[test]
fn test_update_stamps_can_be_recorded() {
    let audit = AuditSettings {
        record_update_stamps: true,
        ..AuditSettings::default()
    };
    let db = Database::new(Box::new(Store::in_memory()), registry(), audit);
    let customer = Customer::new("a");
    db.with_unit_of_work(ActorContext::system(), |uow| {
        uow.track(customer.clone())?;
        Ok(())
    })
    .unwrap();

    let actor = ActorId::new();
    let mut uow = db.begin(actor).unwrap();
    uow.load::<Customer>(customer.id).unwrap().unwrap().name = "b".into();
    let report = uow.commit().unwrap();

    let payload = &report.entries[0].changed_data;
    assert_eq!(payload["name"], "b");
    assert_eq!(payload["updated_by"], actor.to_key());
    assert!(payload.get("updated_at").is_some());
}

#[test]
fn test_unchanged_entities_are_not_logged() {
    let db = database();
    let customer = Customer::new("Acme");
    db.with_unit_of_work(ActorContext::system(), |uow| {
        uow.track(customer.clone())?;
        Ok(())
    })
    .unwrap();

    let mut uow = db.begin(ActorId::new()).unwrap();
    let loaded = uow.load::<Customer>(customer.id).unwrap().unwrap();
    loaded.name = "Acme".into();
    let report = uow.commit().unwrap();

    assert!(report.is_empty());
    assert_eq!(db.change_log().count().unwrap(), 1);
}

#[test]
fn test_creation_stamps() {
    let db = database();
    let actor = ActorId::new();
    let customer = Customer::new("Acme");
    let tag = Tag::new("vip");

    let mut uow = db.begin(actor).unwrap();
    uow.track(customer.clone()).unwrap();
    uow.track(tag.clone()).unwrap();
    let report = uow.commit().unwrap();
    assert_eq!(report.entries.len(), 2);

    let stored = db
        .get::<Customer>(customer.id, Default::default())
        .unwrap()
        .unwrap();
    assert_eq!(stored.creation.created_by, Some(actor));
    assert_eq!(stored.update.updated_by, Some(actor));
    assert_eq!(stored.creation.created_at, stored.update.updated_at);

    // kinds without audit columns are still logged
    let entry = report
        .entries
        .iter()
        .find(|e| e.entity_kind == "tags")
        .unwrap();
    assert_eq!(entry.changed_data, json!({"id": tag.id.to_key(), "label": "vip"}));
}

#[test]
fn test_history_of_a_row() {
    let db = database();
    let customer = Customer::new("a");
    db.with_unit_of_work(ActorContext::system(), |uow| {
        uow.track(customer.clone())?;
        Ok(())
    })
    .unwrap();
    db.with_unit_of_work(ActorContext::system(), |uow| {
        if let Some(c) = uow.load::<Customer>(customer.id)? {
            c.name = "b".into();
        }
        Ok(())
    })
    .unwrap();
    db.with_unit_of_work(ActorContext::system(), |uow| {
        uow.delete_record::<Customer>(customer.id)?;
        Ok(())
    })
    .unwrap();

    let history = db
        .change_log()
        .for_row("customers", &customer.id.to_key())
        .unwrap();
    let actions: Vec<_> = history.iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![ChangeAction::Insert, ChangeAction::Update, ChangeAction::Delete]
    );
    assert_eq!(history[2].changed_data["is_deleted"], true);
    assert_eq!(db.change_log().for_action(ChangeAction::Update).unwrap().len(), 1);
    assert_eq!(db.change_log().read_recent(2).unwrap().len(), 2);

    let id = history[1].id;
    assert_eq!(db.change_log().get(id).unwrap().unwrap(), history[1]);
}

#[test]
fn test_excluded_kinds_are_not_logged() {
    let mut registry = registry();
    registry.register_schema(KindSchema::new("user_actions"));
    let db = Database::in_memory(registry);
    let schema = db.registry().schema("user_actions").unwrap();

    let mut uow = db.begin(ActorContext::system()).unwrap();
    uow.track(DynamicEntity::new(Arc::clone(&schema), fields(json!({"what": "login"}))).unwrap())
        .unwrap();
    uow.track(Customer::new("Acme")).unwrap();
    let report = uow.commit().unwrap();

    assert_eq!(report.inserted, 2);
    assert_eq!(report.entries.len(), 1);
    assert_eq!(report.entries[0].entity_kind, "customers");
    assert_eq!(db.rows(softaudit::Query::new("user_actions")).unwrap().len(), 1);
}

#[test]
fn test_change_log_kind_cannot_be_tracked() {
    let mut registry = registry();
    registry.register_schema(KindSchema::new("data_changes"));
    let db = Database::in_memory(registry);
    let schema = db.registry().schema("data_changes").unwrap();

    let mut uow = db.begin(ActorContext::system()).unwrap();
    let err = uow
        .track(DynamicEntity::new(schema, Row::new()).unwrap())
        .unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn test_duplicate_tracking_is_rejected() {
    let db = database();
    let customer = Customer::new("Acme");

    let mut uow = db.begin(ActorContext::system()).unwrap();
    uow.track(customer.clone()).unwrap();
    let err = uow.track(customer).unwrap_err();
    assert!(matches!(err, softaudit::AuditError::Duplicate { .. }));
}

#[derive(Debug, Serialize, Deserialize)]
struct Draft {
    id: Option<EntityId>,
    body: String,
}

impl Record for Draft {
    const KIND: &'static str = "drafts";

    fn record_id(&self) -> Option<EntityId> {
        self.id
    }
}

#[test]
fn test_entity_without_identity_cannot_be_written() {
    let db = database();
    let mut uow = db.begin(ActorContext::system()).unwrap();
    let key = uow
        .track(Draft {
            id: None,
            body: "unsaved".into(),
        })
        .unwrap();
    assert!(key.is_none());

    let err = uow.commit().unwrap_err();
    assert!(err.is_storage_failure());
    assert_eq!(db.change_log().count().unwrap(), 0);
}

#[derive(Debug, Serialize, Deserialize)]
struct Profile {
    id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nickname: Option<String>,
}

impl Record for Profile {
    const KIND: &'static str = "profiles";

    fn record_id(&self) -> Option<EntityId> {
        Some(self.id)
    }
}

#[test]
fn test_cleared_optional_field_is_updated() {
    let db = database();
    let id = EntityId::new();
    db.with_unit_of_work(ActorContext::system(), |uow| {
        uow.track(Profile {
            id,
            nickname: Some("x".into()),
        })?;
        Ok(())
    })
    .unwrap();

    let mut uow = db.begin(ActorContext::system()).unwrap();
    uow.load::<Profile>(id).unwrap().unwrap().nickname = None;
    let report = uow.commit().unwrap();

    assert_eq!(report.updated, 1);
    assert_eq!(report.entries.len(), 1);
    assert_eq!(report.entries[0].changed_data, json!({"nickname": null}));
    let stored = db.get::<Profile>(id, Default::default()).unwrap().unwrap();
    assert_eq!(stored.nickname, None);

    // the stored null and the skipped field agree on the next load
    let mut uow = db.begin(ActorContext::system()).unwrap();
    uow.load::<Profile>(id).unwrap().unwrap();
    assert!(uow.commit().unwrap().is_empty());
}
