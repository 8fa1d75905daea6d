//! Driver boundary: the commands a document store must execute.

use crate::error::StoreFailure;
use crate::types::{Document, Value};
use serde::Serialize;
use std::fmt;

/// Store operations issued by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    FindOne,
    Find,
    CountDocuments,
    InsertOne,
    UpdateOne,
    DeleteOne,
    DeleteMany,
    CollStats,
}

impl Operation {
    /// Name as spelled in the store's shell dialect.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::FindOne => "findOne",
            Operation::Find => "find",
            Operation::CountDocuments => "countDocuments",
            Operation::InsertOne => "insertOne",
            Operation::UpdateOne => "updateOne",
            Operation::DeleteOne => "deleteOne",
            Operation::DeleteMany => "deleteMany",
            Operation::CollStats => "collStats",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One command against a collection.
///
/// `filter` is the first argument in shell terms (the document itself for
/// inserts), `options` the second (the update document for updates) and
/// `settings` the third.
#[derive(Clone, Debug, PartialEq)]
pub struct StoreRequest {
    pub operation: Operation,
    pub filter: Document,
    pub options: Document,
    pub settings: Document,
}

impl StoreRequest {
    pub fn new(operation: Operation, filter: Document) -> Self {
        Self {
            operation,
            filter,
            options: Document::new(),
            settings: Document::new(),
        }
    }

    pub fn with_options(mut self, options: Document) -> Self {
        self.options = options;
        self
    }

    pub fn with_settings(mut self, settings: Document) -> Self {
        self.settings = settings;
        self
    }

    pub fn find_one(filter: Document, options: Document) -> Self {
        Self::new(Operation::FindOne, filter).with_options(options)
    }

    pub fn find(filter: Document, options: Document) -> Self {
        Self::new(Operation::Find, filter).with_options(options)
    }

    pub fn count(filter: Document, options: Document) -> Self {
        Self::new(Operation::CountDocuments, filter).with_options(options)
    }

    pub fn insert_one(document: Document) -> Self {
        Self::new(Operation::InsertOne, document)
    }

    /// `$set` update of the first document matching `filter`.
    pub fn update_one(filter: Document, set: Document) -> Self {
        Self::new(Operation::UpdateOne, filter).with_options(crate::doc! { "$set" => set })
    }

    pub fn delete_one(filter: Document) -> Self {
        Self::new(Operation::DeleteOne, filter)
    }

    pub fn delete_many(filter: Document) -> Self {
        Self::new(Operation::DeleteMany, filter)
    }

    pub fn coll_stats() -> Self {
        Self::new(Operation::CollStats, Document::new())
    }
}

/// Storage statistics of a collection.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CollectionStats {
    pub count: u64,
    pub storage_size: u64,
    pub index_size: u64,
    pub index_count: u64,
    pub size: u64,
    pub avg_obj_size: u64,
}

/// Driver reply; the variant depends on the operation.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreReply {
    /// `findOne`
    Document(Option<Document>),
    /// `find`
    Documents(Vec<Document>),
    /// `insertOne`: the generated or supplied identifier.
    Inserted(Option<Value>),
    /// `updateOne`
    Updated { matched: u64, modified: u64 },
    /// `deleteOne` / `deleteMany`
    Deleted(u64),
    /// `countDocuments`
    Count(u64),
    /// `collStats`
    Stats(CollectionStats),
}

/// A document store driver.
///
/// Implementations execute one command synchronously and report failures
/// as [`StoreFailure`]; they never retry.
pub trait DocumentStore: Send + Sync {
    fn execute(&self, collection: &str, request: &StoreRequest) -> Result<StoreReply, StoreFailure>;
}
