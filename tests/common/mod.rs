//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use docmodel::{
    Database, DatabaseConfig, FieldDescriptor, FieldType, MemoryStore, MemoryStoreConfig, Model,
    SchemaBuilder, Value,
};
use std::sync::Arc;

/// A user account with a realistic field table.
pub struct User;

impl Model for User {
    fn schema() -> SchemaBuilder {
        SchemaBuilder::new("users")
            .primary_key("userId")
            .field(FieldDescriptor::new("userId", FieldType::String).tag("card"))
            .field(FieldDescriptor::new("login", FieldType::String).required().only_creation())
            .field(
                FieldDescriptor::new("name", FieldType::String)
                    .required()
                    .history()
                    .tag("card"),
            )
            .field(FieldDescriptor::new("password", FieldType::String).hidden())
            .field(FieldDescriptor::new("rating", FieldType::Int).default_value(0).history())
            .field(FieldDescriptor::new("balance", FieldType::Float))
            .field(FieldDescriptor::new("active", FieldType::Boolean).default_value(true))
            .field(FieldDescriptor::new("tags", FieldType::Array).history())
            .field(
                FieldDescriptor::new("phones", FieldType::Array)
                    .history()
                    .project_by("number")
                    .history_value(phone_numbers),
            )
            .field(FieldDescriptor::new("contact", FieldType::Object).history())
            .field(FieldDescriptor::new("birthday", FieldType::DateTime))
            .field(FieldDescriptor::new("timeCreate", FieldType::DateTime).time_create())
            .field(FieldDescriptor::new("timeUpdate", FieldType::DateTime).time_update())
            .field(FieldDescriptor::new("history", FieldType::History).hidden())
    }
}

/// Phone objects reduced to their numbers.
fn phone_numbers(value: &Value) -> Value {
    match value.as_array() {
        Some(phones) => Value::Array(
            phones
                .iter()
                .filter_map(|phone| phone.as_document().and_then(|p| p.get("number")).cloned())
                .collect(),
        ),
        None => Value::Array(Vec::new()),
    }
}

/// Route engine logs to the test harness once per binary.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Fresh database over an empty in-memory store, with tracing enabled.
pub fn test_db() -> (Database, Arc<MemoryStore>) {
    init_logging();
    let store = Arc::new(MemoryStore::new(MemoryStoreConfig {
        database: "test".to_string(),
    }));
    let db = Database::new(
        store.clone(),
        DatabaseConfig {
            database: "test".to_string(),
            debug: true,
            capture_backtrace: false,
        },
    );
    (db, store)
}

/// Names of the fields written by the most recent update.
pub fn last_update_fields(db: &Database) -> Vec<String> {
    db.trace()
        .of_operation("updateOne")
        .last()
        .map(|record| record.updated_fields())
        .unwrap_or_default()
}

/// Number of write operations traced so far.
pub fn write_count(db: &Database) -> usize {
    db.trace()
        .records()
        .iter()
        .filter(|record| matches!(record.operation.as_str(), "insertOne" | "updateOne" | "deleteOne" | "deleteMany"))
        .count()
}
