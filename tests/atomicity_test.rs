mod common;

use std::sync::atomic::Ordering;
use std::thread;

use tempfile::TempDir;

use common::{database, failing_database, registry, Contact, Customer};
use softaudit::config::AuditSettings;
use softaudit::storage::{Store, StoreOptions};
use softaudit::{ActorContext, ActorId, AuditError, ChangeAction, Database, ExecutionOptions, Query};

fn seed(db: &Database) -> (Customer, Contact) {
    let customer = Customer::new("Acme");
    let contact = Contact::new(&customer, "Jo");
    db.with_unit_of_work(ActorContext::system(), |uow| {
        uow.track(customer.clone())?;
        uow.track(contact.clone())?;
        Ok(())
    })
    .unwrap();
    (customer, contact)
}

#[test]
fn test_failed_commit_persists_nothing() {
    let (db, fail) = failing_database();
    let (customer, contact) = seed(&db);
    let logged = db.change_log().count().unwrap();

    fail.store(true, Ordering::SeqCst);
    let mut uow = db.begin(ActorId::new()).unwrap();
    uow.delete_record::<Customer>(customer.id).unwrap();
    let err = uow.commit().unwrap_err();
    assert!(err.is_storage_failure());

    fail.store(false, Ordering::SeqCst);
    assert_eq!(db.rows(Query::new("customers")).unwrap().len(), 1);
    let stored = db
        .get::<Contact>(contact.id, ExecutionOptions::default())
        .unwrap()
        .unwrap();
    assert!(!stored.deletion.is_deleted);
    assert_eq!(db.change_log().count().unwrap(), logged);
}

#[test]
fn test_failed_commit_can_be_retried() {
    let (db, fail) = failing_database();
    let customer = Customer::new("Acme");

    fail.store(true, Ordering::SeqCst);
    let mut uow = db.begin(ActorContext::system()).unwrap();
    uow.track(customer.clone()).unwrap();
    assert!(uow.commit().is_err());

    fail.store(false, Ordering::SeqCst);
    let mut uow = db.begin(ActorContext::system()).unwrap();
    uow.track(customer).unwrap();
    let report = uow.commit().unwrap();
    assert_eq!(report.inserted, 1);
    assert_eq!(db.change_log().count().unwrap(), 1);
}

#[test]
fn test_dropped_unit_of_work_rolls_back() {
    let db = database();
    {
        let mut uow = db.begin(ActorContext::system()).unwrap();
        uow.track(Customer::new("Forgotten")).unwrap();
    }
    assert!(db.rows(Query::new("customers")).unwrap().is_empty());
    assert_eq!(db.change_log().count().unwrap(), 0);
}

#[test]
fn test_rollback_discards_cascade() {
    let db = database();
    let (customer, _) = seed(&db);

    let mut uow = db.begin(ActorContext::system()).unwrap();
    uow.delete_record::<Customer>(customer.id).unwrap();
    uow.rollback();

    assert_eq!(db.rows(Query::new("customers")).unwrap().len(), 1);
    assert_eq!(db.rows(Query::new("contacts")).unwrap().len(), 1);
    assert_eq!(db.change_log().count().unwrap(), 2);
}

#[test]
fn test_concurrent_units_of_work() {
    let db = database();

    thread::scope(|scope| {
        for i in 0..8 {
            let db = &db;
            scope.spawn(move || {
                let actor = ActorId::new();
                db.with_unit_of_work(actor, |uow| {
                    let customer = Customer::new(&format!("customer {}", i));
                    uow.track(Contact::new(&customer, "Jo"))?;
                    uow.track(customer)?;
                    Ok(())
                })
                .unwrap();
            });
        }
    });

    assert_eq!(db.rows(Query::new("customers")).unwrap().len(), 8);
    assert_eq!(db.rows(Query::new("contacts")).unwrap().len(), 8);
    assert_eq!(db.change_log().count().unwrap(), 16);
}

#[test]
fn test_conflicting_inserts_fail_without_log_rows() {
    let db = database();
    let customer = Customer::new("Acme");

    let mut first = db.begin(ActorContext::system()).unwrap();
    let mut second = db.begin(ActorContext::system()).unwrap();
    first.track(customer.clone()).unwrap();
    second.track(customer.clone()).unwrap();

    first.commit().unwrap();
    let err = second.commit().unwrap_err();
    assert!(matches!(err, AuditError::Storage(_)));
    assert_eq!(db.change_log().count().unwrap(), 1);
}

#[test]
fn test_overlapping_update_and_delete_both_land() {
    let db = database();
    let (customer, _) = seed(&db);

    let mut renamer = db.begin(ActorId::new()).unwrap();
    let mut deleter = db.begin(ActorId::new()).unwrap();
    renamer.load::<Customer>(customer.id).unwrap().unwrap().name = "Acme Ltd".into();
    deleter.delete_record::<Customer>(customer.id).unwrap();

    renamer.commit().unwrap();
    deleter.commit().unwrap();

    let stored = db
        .get::<Customer>(customer.id, ExecutionOptions::including_deleted())
        .unwrap()
        .unwrap();
    assert_eq!(stored.name, "Acme Ltd");
    assert!(stored.deletion.is_deleted);

    let history = db
        .change_log()
        .for_row("customers", &customer.id.to_key())
        .unwrap();
    let actions: Vec<_> = history.iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![ChangeAction::Insert, ChangeAction::Update, ChangeAction::Delete]
    );
}

#[test]
fn test_file_backed_store_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let options = StoreOptions {
        sync_journal: false,
        compact_after_commits: None,
    };
    let open = || {
        Database::new(
            Box::new(Store::open(temp_dir.path(), options).unwrap()),
            registry(),
            AuditSettings::default(),
        )
    };

    let customer = {
        let db = open();
        let (customer, _) = seed(&db);
        let mut uow = db.begin(ActorId::new()).unwrap();
        uow.delete_record::<Customer>(customer.id).unwrap();
        uow.commit().unwrap();
        customer
    };

    let db = open();
    assert!(db.rows(Query::new("customers")).unwrap().is_empty());
    assert!(db.rows(Query::new("contacts")).unwrap().is_empty());
    assert_eq!(db.rows(Query::new("contacts").include_deleted()).unwrap().len(), 1);
    assert_eq!(db.change_log().count().unwrap(), 4);
    db.compact().unwrap();

    let db = open();
    let stored = db
        .get::<Customer>(customer.id, ExecutionOptions::including_deleted())
        .unwrap()
        .unwrap();
    assert!(stored.deletion.is_deleted);
    assert_eq!(db.change_log().count().unwrap(), 4);
}
