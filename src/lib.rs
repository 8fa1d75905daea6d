//! # Document Model
//!
//! A schema-driven record mapper for document stores: typed records with a
//! declarative field model, dirty tracking and an automatic change history.
//!
//! ## Core Concepts
//!
//! - **Schemas**: Per-type field tables (type tag, modifiers, defaults, hooks)
//! - **Records**: Instances with two snapshots driving full and partial saves
//! - **History**: Change records appended when tracked fields change
//! - **Gateway**: Every store call timed, logged and optionally traced
//!
//! ## Example
//!
//! ```ignore
//! use docmodel::{doc, Database, DatabaseConfig, FieldDescriptor, FieldType, MemoryStore, Model, SchemaBuilder};
//!
//! struct User;
//!
//! impl Model for User {
//!     fn schema() -> SchemaBuilder {
//!         SchemaBuilder::new("users")
//!             .primary_key("userId")
//!             .field(FieldDescriptor::new("userId", FieldType::String))
//!             .field(FieldDescriptor::new("name", FieldType::String).required().history())
//!             .field(FieldDescriptor::new("history", FieldType::History))
//!     }
//! }
//!
//! let db = Database::new(Arc::new(MemoryStore::default()), DatabaseConfig::default());
//! let users = db.model::<User>()?;
//!
//! // Insert, then update with history
//! let mut user = users.insert(doc! { "name" => "Ben" })?;
//! user.set("name", "Benjamin")?;
//! user.save(&db)?;
//!
//! // Second page of five, best rated first
//! let page = users.items(QuerySpec::All).sort(("rating", "DESC")).page((5, 5)).fetch()?;
//! ```

pub mod cache;
pub mod coerce;
pub mod database;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod query;
pub mod record;
pub mod schema;
pub mod types;

// Re-exports
pub use cache::{CacheKey, InstanceCache, SharedRecord};
pub use database::{Database, DatabaseConfig, ItemsQuery, ModelHandle};
pub use error::{ModelError, Result, StoreFailure, ValidationReason};
pub use gateway::{
    CollectionStats, DocumentStore, Gateway, Operation, StoreReply, StoreRequest, TraceLog,
    TraceRecord, TraceStatus,
};
pub use memory::{MemoryStore, MemoryStoreConfig};
pub use query::{Page, QuerySpec, Scope, SortDirection, SortSpec};
pub use record::{ChangeRecord, FieldChange, Record};
pub use schema::{
    DefaultValue, FieldDescriptor, FieldType, Model, ModelSchema, Modifier, NoHooks, Projector,
    RecordHooks, SchemaBuilder, SchemaRegistry,
};
pub use types::*;
