//! Integration tests for the record engine.

mod common;

use common::{last_update_fields, test_db, write_count, User};
use docmodel::{
    doc, Database, DatabaseConfig, DocumentStore, FieldDescriptor, FieldType, MemoryStore, Model,
    ObjectId, QuerySpec, Record, RecordHooks, SchemaBuilder, StoreRequest, Value,
};
use parking_lot::Mutex;
use std::sync::Arc;

const HEX: &str = "507f1f77bcf86cd799439011";

fn ben() -> docmodel::Document {
    doc! {
        "login" => "ben",
        "name" => "Ben",
        "password" => "secret",
        "rating" => 12,
        "balance" => 10.5,
        "active" => false,
        "tags" => vec!["admin", "staff"],
        "phones" => vec![doc! { "number" => "555-0101", "kind" => "home" }],
        "contact" => doc! { "city" => "Riga", "zip" => "LV-1010" },
        "birthday" => "1990-05-17 08:30:00",
    }
}

// --- Round Trip ---

#[test]
fn test_insert_and_load_round_trip() {
    let (db, _store) = test_db();
    let users = db.model::<User>().unwrap();

    let inserted = users.insert(ben()).unwrap();
    assert!(!inserted.is_new());

    let loaded = users.get(inserted.id().clone()).unwrap().unwrap();
    for name in ["userId", "login", "name", "password", "rating", "balance", "active", "tags", "phones", "contact", "birthday", "timeCreate", "timeUpdate"] {
        assert_eq!(loaded.get(name), inserted.get(name), "field {}", name);
    }
    assert_eq!(loaded.get("birthday"), Some(&Value::from("1990-05-17 08:30:00")));
    assert_eq!(loaded.get("balance"), Some(&Value::Float(10.5)));
    assert_eq!(loaded.get("active"), Some(&Value::Bool(false)));
    assert_eq!(loaded.get("history"), Some(&Value::Array(vec![])));
}

#[test]
fn test_generated_identifier_is_native_in_store() {
    let (db, store) = test_db();
    let users = db.model::<User>().unwrap();

    let id = users.insert_id(ben()).unwrap();
    let hex = id.as_str().unwrap().to_string();
    assert_eq!(hex.len(), 24);

    let stored = store.documents("users");
    assert_eq!(stored[0].get("_id"), Some(&Value::ObjectId(ObjectId::parse_str(&hex).unwrap())));
    assert!(!stored[0].contains_key("userId"));
    assert!(matches!(stored[0].get("birthday"), Some(Value::DateTime(_))));
}

#[test]
fn test_malformed_collection_loads_empty() {
    let (db, store) = test_db();
    store
        .execute(
            "users",
            &StoreRequest::insert_one(doc! {
                "_id" => "u1", "login" => "u1", "name" => "U", "tags" => "not-a-list", "rating" => "7 stars",
            }),
        )
        .unwrap();

    let user = db.model::<User>().unwrap().get("u1").unwrap().unwrap();
    assert_eq!(user.get("tags"), Some(&Value::Array(vec![])));
    assert_eq!(user.get("rating"), Some(&Value::Int(7)));
    assert_eq!(user.get("contact"), Some(&Value::Object(doc! {})));
}

// --- Identifier Typing ---

#[test]
fn test_literal_identifier_matched_literally() {
    let (db, store) = test_db();
    store
        .execute("users", &StoreRequest::insert_one(doc! { "_id" => "user_test", "login" => "t", "name" => "Test" }))
        .unwrap();

    let user = db.model::<User>().unwrap().get("user_test").unwrap().unwrap();
    assert_eq!(user.id(), &Value::from("user_test"));

    let lookup = db.trace().of_operation("findOne").pop().unwrap();
    assert_eq!(lookup.filter, doc! { "_id" => "user_test" });
}

#[test]
fn test_canonical_identifier_converted() {
    let (db, store) = test_db();
    let oid = ObjectId::parse_str(HEX).unwrap();
    store
        .execute("users", &StoreRequest::insert_one(doc! { "_id" => oid, "login" => "x", "name" => "X" }))
        .unwrap();

    let user = db.model::<User>().unwrap().get(HEX).unwrap().unwrap();
    assert_eq!(user.id(), &Value::from(HEX));

    let lookup = db.trace().of_operation("findOne").pop().unwrap();
    assert_eq!(lookup.filter, doc! { "_id" => oid });
    assert_eq!(lookup.filter_json, format!(r#"{{"_id":{{"$oid":"{}"}}}}"#, HEX));
}

#[test]
fn test_get_missing_is_none() {
    let (db, _store) = test_db();
    let users = db.model::<User>().unwrap();
    assert!(users.get("nobody").unwrap().is_none());
    assert!(users.get(doc! { "login" => "nobody" }).unwrap().is_none());
}

// --- Full Save ---

#[test]
fn test_full_save_writes_changed_fields_only() {
    let (db, _store) = test_db();
    let users = db.model::<User>().unwrap();
    let mut user = users.insert(ben()).unwrap();

    user.set("balance", 99.0).unwrap();
    user.save(&db).unwrap();

    assert_eq!(last_update_fields(&db), vec!["balance", "timeUpdate"]);
}

#[test]
fn test_save_without_changes_refreshes_time_update_only() {
    let (db, _store) = test_db();
    let users = db.model::<User>().unwrap();
    let mut user = users.insert(ben()).unwrap();

    user.save(&db).unwrap();
    assert_eq!(last_update_fields(&db), vec!["timeUpdate"]);
}

#[test]
fn test_save_with_assignments() {
    let (db, _store) = test_db();
    let users = db.model::<User>().unwrap();
    let mut user = users.insert(ben()).unwrap();

    user.save_with(&db, doc! { "balance" => "20.25", "nickname" => "ignored", "name" => Value::Null })
        .unwrap();
    assert_eq!(user.get("balance"), Some(&Value::Float(20.25)));
    assert_eq!(user.get("name"), Some(&Value::from("Ben")));

    let reloaded = users.get(user.id().clone()).unwrap().unwrap();
    assert_eq!(reloaded.get("balance"), Some(&Value::Float(20.25)));
}

#[test]
fn test_time_create_kept_on_update() {
    let (db, _store) = test_db();
    let users = db.model::<User>().unwrap();
    let mut user = users.insert(ben()).unwrap();
    let created = user.get("timeCreate").cloned().unwrap();
    assert!(created.as_str().is_some_and(|s| s.len() == 19));

    user.set("rating", 1).unwrap();
    user.save(&db).unwrap();
    assert_eq!(user.get("timeCreate"), Some(&created));
    assert!(!last_update_fields(&db).contains(&"timeCreate".to_string()));
}

// --- Partial Save ---

#[test]
fn test_save_fields_without_marks_is_noop() {
    let (db, _store) = test_db();
    let users = db.model::<User>().unwrap();
    let mut user = users.insert(ben()).unwrap();
    let writes = write_count(&db);

    user.save_fields::<&str>(&db, &[]).unwrap();
    assert_eq!(write_count(&db), writes);
}

#[test]
fn test_unchanged_field_elided_from_partial_save() {
    let (db, _store) = test_db();
    let users = db.model::<User>().unwrap();
    let mut user = users.insert(ben()).unwrap();
    let writes = write_count(&db);

    user.save_field(&db, "name", Some("Ben".into())).unwrap();
    assert_eq!(write_count(&db), writes);

    user.set("tags", vec!["admin", "staff"]).unwrap();
    user.save_fields(&db, &["tags"]).unwrap();
    assert_eq!(write_count(&db), writes);
    assert!(user.changed_fields().is_empty());
}

#[test]
fn test_partial_save_writes_changes_history_ignores() {
    let (db, store) = test_db();
    let users = db.model::<User>().unwrap();
    let mut user = users.insert(ben()).unwrap();

    // Reordered tags and a phone differing only outside its projection path.
    user.save_field(&db, "tags", Some(vec!["staff", "admin"].into())).unwrap();
    assert_eq!(last_update_fields(&db), vec!["tags"]);
    user.save_field(
        &db,
        "phones",
        Some(vec![doc! { "number" => "555-0101", "kind" => "work" }].into()),
    )
    .unwrap();
    assert_eq!(last_update_fields(&db), vec!["phones"]);

    let reloaded = users.get(user.id().clone()).unwrap().unwrap();
    assert_eq!(reloaded.get("tags"), Some(&Value::from(vec!["staff", "admin"])));
    assert_eq!(
        reloaded.get("phones"),
        Some(&Value::from(vec![doc! { "number" => "555-0101", "kind" => "work" }]))
    );
    assert_eq!(store.documents("users").len(), 1);
}

#[test]
fn test_partial_save_writes_marked_fields() {
    let (db, store) = test_db();
    let users = db.model::<User>().unwrap();
    let mut user = users.insert(ben()).unwrap();

    user.set("name", "Benjamin").unwrap();
    user.set("rating", "40").unwrap();
    user.mark_dirty(&["name"]);
    user.save_fields(&db, &["rating"]).unwrap();

    let update = db.trace().of_operation("updateOne").pop().unwrap();
    assert_eq!(update.updated_fields(), vec!["name", "rating"]);
    assert_eq!(
        update.options.unwrap(),
        doc! { "$set" => doc! { "name" => "Benjamin", "rating" => 40 } }
    );
    assert!(user.changed_fields().is_empty());
    assert_eq!(user.snapshot_update_value("name"), Some(&Value::from("Benjamin")));
    // Partial saves never touch the history.
    assert!(user.history().is_empty());
    assert_eq!(store.documents("users")[0].get("rating"), Some(&Value::Int(40)));
}

#[test]
fn test_save_field_keeps_other_pending_fields() {
    let (db, _store) = test_db();
    let users = db.model::<User>().unwrap();
    let mut user = users.insert(ben()).unwrap();

    user.mark_dirty(&["name"]);
    user.save_field(&db, "rating", Some(Value::Int(3))).unwrap();

    assert_eq!(last_update_fields(&db), vec!["rating"]);
    assert_eq!(user.changed_fields(), &["name".to_string()]);
}

// --- Cursor Queries ---

fn seed(db: &Database, count: i64) {
    let users = db.model::<User>().unwrap();
    for rating in 1..=count {
        users
            .insert(doc! { "login" => format!("user{}", rating), "name" => format!("User {}", rating), "rating" => rating })
            .unwrap();
    }
}

#[test]
fn test_pagination_descending() {
    let (db, _store) = test_db();
    seed(&db, 12);
    let users = db.model::<User>().unwrap();

    let page = users
        .items(QuerySpec::All)
        .sort(("rating", "desc"))
        .page((5, 5))
        .fetch()
        .unwrap();
    let ratings: Vec<i64> = page
        .iter()
        .map(|(_, user)| user.get("rating").and_then(Value::as_i64).unwrap())
        .collect();
    // ranks 6 to 10 of 12
    assert_eq!(ratings, vec![7, 6, 5, 4, 3]);

    for (id, user) in &page {
        assert_eq!(&Value::from(id.as_str()), user.id());
        assert!(!user.is_new());
    }
}

#[test]
fn test_limit_and_ascending_sort() {
    let (db, _store) = test_db();
    seed(&db, 6);
    let users = db.model::<User>().unwrap();

    let values = users
        .items(doc! { "rating" => doc! { "$gt" => 2 } })
        .sort("rating")
        .page(2)
        .fetch_values("rating")
        .unwrap();
    let ratings: Vec<Value> = values.into_iter().map(|(_, v)| v).collect();
    assert_eq!(ratings, vec![Value::Int(3), Value::Int(4)]);

    let options = db.trace().of_operation("find").pop().unwrap().options.unwrap();
    assert_eq!(
        options,
        doc! {
            "skip" => 0,
            "limit" => 2,
            "sort" => doc! { "rating" => 1 },
            "projection" => doc! { "_id" => 1, "rating" => 1 },
        }
    );
}

#[test]
fn test_fetch_primary_key_values_keep_native_type() {
    let (db, store) = test_db();
    let oid = ObjectId::parse_str(HEX).unwrap();
    store
        .execute("users", &StoreRequest::insert_one(doc! { "_id" => 42, "login" => "n", "name" => "Num" }))
        .unwrap();
    store
        .execute("users", &StoreRequest::insert_one(doc! { "_id" => oid, "login" => "o", "name" => "Oid" }))
        .unwrap();

    let values = db.model::<User>().unwrap().items(QuerySpec::All).fetch_values("userId").unwrap();
    assert_eq!(
        values,
        vec![
            ("42".to_string(), Value::Int(42)),
            (HEX.to_string(), Value::from(HEX)),
        ]
    );
}

#[test]
fn test_fetch_partial_includes_key_and_score() {
    let (db, store) = test_db();
    store
        .execute(
            "users",
            &StoreRequest::insert_one(doc! { "_id" => "u1", "login" => "a", "name" => "Ann", "rating" => 5, "score" => 1.5 }),
        )
        .unwrap();
    let users = db.model::<User>().unwrap();

    let items = users
        .items(vec!["u1"])
        .settings(doc! { "projection" => doc! { "score" => 1 } })
        .fetch_partial(&["name", "active"])
        .unwrap();
    assert_eq!(items.len(), 1);
    let (id, item) = &items[0];
    assert_eq!(id, "u1");
    assert_eq!(
        item,
        &doc! { "userId" => "u1", "score" => 1.5, "name" => "Ann", "active" => true }
    );

    let full = users.items(QuerySpec::All).fetch().unwrap();
    assert_eq!(full[0].1.score(), Some(&Value::Float(1.5)));
    assert_eq!(full[0].1.to_view(Some(&["card"]), true).get("score"), Some(&Value::Float(1.5)));
}

#[test]
fn test_count_exists_and_delete_many() {
    let (db, _store) = test_db();
    seed(&db, 5);
    let users = db.model::<User>().unwrap();

    assert_eq!(users.count(QuerySpec::All, doc! {}).unwrap(), 5);
    assert_eq!(users.count(doc! { "rating" => doc! { "$lte" => 2 } }, doc! {}).unwrap(), 2);
    assert_eq!(users.count(QuerySpec::All, doc! { "limit" => 3 }).unwrap(), 3);
    assert!(users.exists(doc! { "login" => "user3" }).unwrap());
    assert!(!users.exists(doc! { "login" => "user9" }).unwrap());

    let projection = db.trace().of_operation("findOne").pop().unwrap().options.unwrap();
    assert_eq!(projection, doc! { "projection" => doc! { "_id" => 1 } });

    assert_eq!(users.delete_many(doc! { "rating" => doc! { "$in" => vec![1, 2] } }).unwrap(), 2);
    assert_eq!(users.delete_many(QuerySpec::All).unwrap(), 3);
    assert!(!users.exists(QuerySpec::All).unwrap());
}

#[test]
fn test_delete_record() {
    let (db, store) = test_db();
    let users = db.model::<User>().unwrap();

    let mut fresh = users.create(ben());
    assert!(!fresh.delete(&db).unwrap());

    let mut user = users.insert(ben()).unwrap();
    assert!(user.delete(&db).unwrap());
    assert!(store.documents("users").is_empty());
}

#[test]
fn test_primary_key_filter_rewritten() {
    let (db, _store) = test_db();
    let users = db.model::<User>().unwrap();
    let id = users.insert_id(ben()).unwrap();

    let found = users.get(doc! { "userId" => id.clone() }).unwrap().unwrap();
    assert_eq!(found.id(), &id);
    let found = users.items(doc! { "userId" => doc! { "$in" => vec![id.clone()] } }).fetch().unwrap();
    assert_eq!(found.len(), 1);
}

#[test]
fn test_collection_stats() {
    let (db, _store) = test_db();
    seed(&db, 3);

    let stats = db.collection_stats("users").unwrap();
    assert_eq!(stats.count, 3);
    assert!(stats.size > 0);
    assert_eq!(stats.avg_obj_size, stats.size / 3);
    let record = db.trace().last().unwrap();
    assert_eq!(record.operation, "collStats");
    assert_eq!(record.database, "test");
}

// --- Views ---

#[test]
fn test_view_skips_hidden_fields() {
    let (db, _store) = test_db();
    let user = db.model::<User>().unwrap().create(ben());

    let view = user.to_view(None, true);
    assert!(!view.contains_key("password"));
    assert!(!view.contains_key("history"));

    let card = user.to_view(Some(&["card"]), true);
    assert_eq!(card.keys().collect::<Vec<_>>(), vec!["userId", "name"]);

    let json: serde_json::Value = serde_json::from_str(&user.to_string()).unwrap();
    assert_eq!(json["name"], "Ben");
    assert!(json.get("password").is_none());
}

// --- Hooks ---

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<String>>,
}

struct Audited;

static AUDIT: std::sync::OnceLock<Arc<Recorder>> = std::sync::OnceLock::new();

struct AuditHooks(Arc<Recorder>);

impl RecordHooks for AuditHooks {
    fn after_create(&self, _record: &mut Record) {
        self.0.calls.lock().push("after_create".into());
    }

    fn after_load(&self, _record: &mut Record) {
        self.0.calls.lock().push("after_load".into());
    }

    fn pre_save(&self, record: &mut Record) {
        self.0.calls.lock().push("pre_save".into());
        let upper = record.get("title").and_then(Value::as_str).map(str::to_uppercase);
        if let Some(upper) = upper {
            record.set("title", upper).unwrap();
        }
    }

    fn after_save(&self, _record: &mut Record, fields: &[String]) {
        self.0.calls.lock().push(format!("after_save {}", fields.join(",")));
    }
}

impl Model for Audited {
    fn schema() -> SchemaBuilder {
        let recorder = Arc::clone(AUDIT.get_or_init(Default::default));
        SchemaBuilder::new("notes")
            .primary_key("noteId")
            .field(FieldDescriptor::new("noteId", FieldType::String).required())
            .field(FieldDescriptor::new("title", FieldType::String))
            .hooks(AuditHooks(recorder))
    }
}

#[test]
fn test_lifecycle_hooks() {
    let store = Arc::new(MemoryStore::default());
    let db = Database::new(store.clone(), DatabaseConfig::default());
    let notes = db.model::<Audited>().unwrap();
    let recorder = Arc::clone(AUDIT.get().unwrap());
    recorder.calls.lock().clear();

    let mut note = notes.insert(doc! { "noteId" => "n1", "title" => "draft" }).unwrap();
    assert_eq!(note.get("title"), Some(&Value::from("DRAFT")));
    note.save_field(&db, "title", Some("final".into())).unwrap();
    notes.get("n1").unwrap().unwrap();

    assert_eq!(
        *recorder.calls.lock(),
        vec![
            "after_create".to_string(),
            "pre_save".to_string(),
            "after_save _id,title".to_string(),
            "after_save title".to_string(),
            "after_load".to_string(),
        ]
    );
    assert_eq!(store.documents("notes")[0], doc! { "_id" => "n1", "title" => "final" });
}
