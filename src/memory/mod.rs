//! In-memory document store.
//!
//! Implements [`DocumentStore`] over plain vectors of documents so the
//! engine runs without a server. Collections are created on first insert.

mod filter;

pub use filter::matches;

use crate::error::StoreFailure;
use crate::gateway::{CollectionStats, DocumentStore, Operation, StoreReply, StoreRequest};
use crate::types::{Document, ObjectId, Value, ID_KEY};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;

/// In-memory store configuration.
#[derive(Clone, Debug)]
pub struct MemoryStoreConfig {
    /// Database name reported by the driver.
    pub database: String,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            database: "default".to_string(),
        }
    }
}

/// Store keeping every collection in memory.
pub struct MemoryStore {
    config: MemoryStoreConfig,
    collections: RwLock<HashMap<String, Vec<Document>>>,
    /// One-shot failures keyed by operation.
    failures: Mutex<HashMap<Operation, String>>,
}

impl MemoryStore {
    pub fn new(config: MemoryStoreConfig) -> Self {
        Self {
            config,
            collections: RwLock::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Make the next `operation` fail with `message`.
    pub fn fail_next(&self, operation: Operation, message: impl Into<String>) {
        self.failures.lock().insert(operation, message.into());
    }

    /// Raw stored documents of a collection, in insertion order.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .read()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    fn find(&self, collection: &str, filter: &Document, options: &Document) -> Result<Vec<Document>, StoreFailure> {
        let collections = self.collections.read();
        let mut found = Vec::new();
        for doc in collections.get(collection).into_iter().flatten() {
            if filter::matches(doc, filter)? {
                found.push(doc.clone());
            }
        }
        drop(collections);

        if let Some(Value::Object(spec)) = options.get("sort") {
            filter::sort(&mut found, spec);
        }
        let mut found = filter::window(
            found,
            filter::option_u64(options, "skip"),
            filter::option_u64(options, "limit"),
        );
        if let Some(Value::Object(projection)) = options.get("projection") {
            found = found.iter().map(|doc| filter::project(doc, projection)).collect();
        }
        Ok(found)
    }

    fn insert(&self, collection: &str, mut document: Document) -> Result<Value, StoreFailure> {
        let existing = document.get(ID_KEY).filter(|id| !id.is_null()).cloned();
        let id = match existing {
            Some(id) => id,
            None => {
                let id = Value::ObjectId(ObjectId::new());
                let mut with_id = Document::with_capacity(document.len() + 1);
                with_id.insert(ID_KEY, id.clone());
                for (key, value) in document {
                    if key != ID_KEY {
                        with_id.insert(key, value);
                    }
                }
                document = with_id;
                id
            }
        };

        let mut collections = self.collections.write();
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.iter().any(|doc| doc.get(ID_KEY) == Some(&id)) {
            return Err(StoreFailure::new(format!(
                "E11000 duplicate key error collection: {}.{} index: _id_ dup key: {}",
                self.config.database,
                collection,
                id.to_json_string()
            )));
        }
        docs.push(document);
        Ok(id)
    }

    fn update_one(&self, collection: &str, filter: &Document, update: &Document) -> Result<StoreReply, StoreFailure> {
        let set = match update.get("$set") {
            Some(Value::Object(set)) => set,
            _ => return Err(StoreFailure::new("update document must contain $set")),
        };
        if set.contains_key(ID_KEY) {
            return Err(StoreFailure::new("performing an update on the path '_id' would modify the immutable field '_id'"));
        }

        let mut collections = self.collections.write();
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(StoreReply::Updated { matched: 0, modified: 0 });
        };
        for doc in docs.iter_mut() {
            if filter::matches(doc, filter)? {
                let mut modified = false;
                for (key, value) in set.iter() {
                    modified |= filter::set_path(doc, key, value.clone());
                }
                return Ok(StoreReply::Updated {
                    matched: 1,
                    modified: modified as u64,
                });
            }
        }
        Ok(StoreReply::Updated { matched: 0, modified: 0 })
    }

    fn delete(&self, collection: &str, filter: &Document, many: bool) -> Result<u64, StoreFailure> {
        let mut collections = self.collections.write();
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let mut deleted = 0;
        let mut kept = Vec::with_capacity(docs.len());
        for doc in docs.drain(..) {
            if (many || deleted == 0) && filter::matches(&doc, filter)? {
                deleted += 1;
            } else {
                kept.push(doc);
            }
        }
        *docs = kept;
        Ok(deleted)
    }

    fn stats(&self, collection: &str) -> CollectionStats {
        let collections = self.collections.read();
        let docs = collections.get(collection).map(Vec::as_slice).unwrap_or_default();
        let count = docs.len() as u64;
        let size: u64 = docs.iter().map(|doc| doc.to_json_string().len() as u64).sum();
        let index_size: u64 = docs
            .iter()
            .filter_map(|doc| doc.get(ID_KEY))
            .map(|id| id.to_json_string().len() as u64)
            .sum();
        CollectionStats {
            count,
            storage_size: size,
            index_size,
            index_count: collections.contains_key(collection) as u64,
            size,
            avg_obj_size: if count == 0 { 0 } else { size / count },
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(MemoryStoreConfig::default())
    }
}

impl DocumentStore for MemoryStore {
    fn execute(&self, collection: &str, request: &StoreRequest) -> Result<StoreReply, StoreFailure> {
        if let Some(message) = self.failures.lock().remove(&request.operation) {
            return Err(StoreFailure::new(message));
        }

        match request.operation {
            Operation::FindOne => {
                let mut options = request.options.clone();
                options.insert("limit", 1);
                let mut found = self.find(collection, &request.filter, &options)?;
                Ok(StoreReply::Document(found.pop()))
            }
            Operation::Find => Ok(StoreReply::Documents(self.find(
                collection,
                &request.filter,
                &request.options,
            )?)),
            Operation::CountDocuments => {
                let mut options = request.options.clone();
                options.remove("projection");
                options.remove("sort");
                Ok(StoreReply::Count(self.find(collection, &request.filter, &options)?.len() as u64))
            }
            Operation::InsertOne => Ok(StoreReply::Inserted(Some(
                self.insert(collection, request.filter.clone())?,
            ))),
            Operation::UpdateOne => self.update_one(collection, &request.filter, &request.options),
            Operation::DeleteOne => Ok(StoreReply::Deleted(self.delete(collection, &request.filter, false)?)),
            Operation::DeleteMany => Ok(StoreReply::Deleted(self.delete(collection, &request.filter, true)?)),
            Operation::CollStats => Ok(StoreReply::Stats(self.stats(collection))),
        }
    }
}
