//! Identity-preserving lookups through the instance cache.

mod common;

use common::{test_db, User};
use docmodel::{doc, CacheKey, DocumentStore, QuerySpec, StoreRequest, Value};
use std::sync::Arc;

#[test]
fn test_equal_queries_share_instance() {
    let (db, _store) = test_db();
    let users = db.model::<User>().unwrap();
    let id = users.insert_id(doc! { "login" => "ben", "name" => "Ben" }).unwrap();

    let a = users.get_cached(id.clone()).unwrap().unwrap();
    let b = users.get_cached(id.clone()).unwrap().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(db.trace().of_operation("findOne").len(), 1);

    // Mutations through one handle are visible through the other.
    a.lock().set("name", "Benjamin").unwrap();
    assert_eq!(b.lock().get("name"), Some(&Value::from("Benjamin")));
}

#[test]
fn test_filter_key_order_is_part_of_the_key() {
    let (db, _store) = test_db();
    let users = db.model::<User>().unwrap();
    users.insert(doc! { "login" => "ben", "name" => "Ben" }).unwrap();

    let a = users.get_cached(doc! { "login" => "ben", "name" => "Ben" }).unwrap().unwrap();
    let b = users.get_cached(doc! { "name" => "Ben", "login" => "ben" }).unwrap().unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(a.lock().id(), b.lock().id());
}

#[test]
fn test_different_queries_get_different_instances() {
    let (db, _store) = test_db();
    let users = db.model::<User>().unwrap();
    let id = users.insert_id(doc! { "login" => "ben", "name" => "Ben" }).unwrap();

    let by_id = users.get_cached(id).unwrap().unwrap();
    let by_login = users.get_cached(doc! { "login" => "ben" }).unwrap().unwrap();
    assert!(!Arc::ptr_eq(&by_id, &by_login));
    assert_eq!(db.cache().len(), 2);
}

#[test]
fn test_miss_is_not_cached() {
    let (db, store) = test_db();
    let users = db.model::<User>().unwrap();

    assert!(users.get_cached("ghost").unwrap().is_none());
    assert!(db.cache().is_empty());

    store
        .execute("users", &StoreRequest::insert_one(doc! { "_id" => "ghost", "login" => "g", "name" => "Ghost" }))
        .unwrap();
    let found = users.get_cached("ghost").unwrap();
    assert!(found.is_some());
    assert_eq!(db.trace().of_operation("findOne").len(), 2);
}

#[test]
fn test_invalid_query_not_cached() {
    let (db, _store) = test_db();
    let users = db.model::<User>().unwrap();

    assert!(users.get_cached(QuerySpec::All).is_err());
    assert!(db.cache().is_empty());
    assert!(db.trace().is_empty());
}

#[test]
fn test_invalidate_forces_reload() {
    let (db, _store) = test_db();
    let users = db.model::<User>().unwrap();
    let id = users.insert_id(doc! { "login" => "ben", "name" => "Ben" }).unwrap();

    let first = users.get_cached(id.clone()).unwrap().unwrap();
    let key = CacheKey::new(users.schema().model_name(), &QuerySpec::from(id.clone()));
    assert!(db.cache().invalidate(&key));

    let second = users.get_cached(id).unwrap().unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
}

#[test]
fn test_concurrent_lookups_share_one_load() {
    let (db, _store) = test_db();
    let users = db.model::<User>().unwrap();
    let id = users.insert_id(doc! { "login" => "ben", "name" => "Ben" }).unwrap();

    let records = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let users = users.clone();
                let id = id.clone();
                scope.spawn(move || users.get_cached(id).unwrap().unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect::<Vec<_>>()
    });

    assert!(records.iter().all(|r| Arc::ptr_eq(r, &records[0])));
    assert_eq!(db.trace().of_operation("findOne").len(), 1);
}
