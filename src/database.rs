//! Top-level handle tying the store, gateway, registry and cache together.

use crate::cache::{CacheKey, InstanceCache, SharedRecord};
use crate::coerce::{decode_id, from_store, id_key};
use crate::error::{ModelError, Result};
use crate::gateway::{CollectionStats, DocumentStore, Gateway, Operation, StoreRequest, TraceLog};
use crate::query::{add_projection, find_options, normalize, Page, QuerySpec, Scope, SortSpec};
use crate::record::{Record, SCORE_KEY};
use crate::schema::{Model, ModelSchema, SchemaRegistry};
use crate::types::{Document, Value, ID_KEY};
use std::sync::Arc;

/// Database configuration.
#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    /// Database name reported in trace records.
    pub database: String,

    /// Record every store operation in the trace log.
    pub debug: bool,

    /// Capture a call-site backtrace per trace record.
    pub capture_backtrace: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database: "default".to_string(),
            debug: false,
            capture_backtrace: true,
        }
    }
}

/// Entry point of the engine.
///
/// Owns the persistence gateway, the schema registry and the instance
/// cache. Record types are reached through [`Database::model`].
pub struct Database {
    config: DatabaseConfig,
    gateway: Gateway,
    registry: SchemaRegistry,
    cache: InstanceCache,
}

impl Database {
    pub fn new(store: Arc<dyn DocumentStore>, config: DatabaseConfig) -> Self {
        let gateway = Gateway::new(store, config.database.clone())
            .with_debug(config.debug)
            .with_backtrace(config.capture_backtrace);
        Self {
            config,
            gateway,
            registry: SchemaRegistry::new(),
            cache: InstanceCache::new(),
        }
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Trace log; only filled when `debug` is set.
    pub fn trace(&self) -> &Arc<TraceLog> {
        self.gateway.trace()
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &InstanceCache {
        &self.cache
    }

    /// Schema of `M`, built on first use.
    pub fn schema<M: Model>(&self) -> Result<Arc<ModelSchema>> {
        self.registry.get::<M>()
    }

    /// Class-level operations of `M`.
    pub fn model<M: Model>(&self) -> Result<ModelHandle<'_>> {
        Ok(ModelHandle {
            db: self,
            schema: self.schema::<M>()?,
        })
    }

    /// Storage statistics of a collection.
    pub fn collection_stats(&self, collection: &str) -> Result<CollectionStats> {
        self.gateway
            .execute(collection, StoreRequest::coll_stats())?
            .into_stats(Operation::CollStats)
    }
}

/// Operations on one record type.
#[derive(Clone)]
pub struct ModelHandle<'db> {
    db: &'db Database,
    schema: Arc<ModelSchema>,
}

impl std::fmt::Debug for ModelHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle").field("schema", &self.schema).finish()
    }
}

impl<'db> ModelHandle<'db> {
    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    /// Unsaved record built from raw input data.
    pub fn create(&self, data: Document) -> Record {
        Record::new(Arc::clone(&self.schema), data)
    }

    /// Build and save a record.
    pub fn insert(&self, data: Document) -> Result<Record> {
        let mut record = self.create(data);
        record.save(self.db)?;
        Ok(record)
    }

    /// Build and save a record, returning only its identifier.
    pub fn insert_id(&self, data: Document) -> Result<Value> {
        Ok(self.insert(data)?.id().clone())
    }

    /// Load one record. `Ok(None)` when nothing matches.
    pub fn get(&self, spec: impl Into<QuerySpec>) -> Result<Option<Record>> {
        self.load(&spec.into())
    }

    fn load(&self, spec: &QuerySpec) -> Result<Option<Record>> {
        let filter = normalize(&self.schema, spec, Scope::Single)?;
        let found = self
            .db
            .gateway
            .execute(self.schema.collection(), StoreRequest::find_one(filter, Document::new()))?
            .into_document(Operation::FindOne)?;
        Ok(found
            .filter(has_identifier)
            .map(|doc| Record::from_document(Arc::clone(&self.schema), doc)))
    }

    /// Load through the instance cache. Equal queries share one instance.
    pub fn get_cached(&self, spec: impl Into<QuerySpec>) -> Result<Option<SharedRecord>> {
        let spec = spec.into();
        normalize(&self.schema, &spec, Scope::Single)?;
        let key = CacheKey::new(self.schema.model_name(), &spec);
        self.db.cache.get_or_load(key, || self.load(&spec))
    }

    /// Cursor query over matching records.
    pub fn items(&self, spec: impl Into<QuerySpec>) -> ItemsQuery<'db> {
        ItemsQuery {
            db: self.db,
            schema: Arc::clone(&self.schema),
            spec: spec.into(),
            sort: None,
            page: None,
            settings: Document::new(),
        }
    }

    /// Number of matching records. `options` go to the store as-is.
    pub fn count(&self, spec: impl Into<QuerySpec>, options: Document) -> Result<u64> {
        let filter = normalize(&self.schema, &spec.into(), Scope::Bulk)?;
        self.db
            .gateway
            .execute(self.schema.collection(), StoreRequest::count(filter, options))?
            .into_count(Operation::CountDocuments)
    }

    /// Whether any record matches, fetching only the identifier.
    pub fn exists(&self, spec: impl Into<QuerySpec>) -> Result<bool> {
        let filter = normalize(&self.schema, &spec.into(), Scope::Bulk)?;
        let options = crate::doc! { "projection" => crate::doc! { ID_KEY => 1 } };
        let found = self
            .db
            .gateway
            .execute(self.schema.collection(), StoreRequest::find_one(filter, options))?
            .into_document(Operation::FindOne)?;
        Ok(found.is_some_and(|doc| has_identifier(&doc)))
    }

    /// Remove every matching record. Returns the number removed.
    pub fn delete_many(&self, spec: impl Into<QuerySpec>) -> Result<u64> {
        let filter = normalize(&self.schema, &spec.into(), Scope::Bulk)?;
        self.db
            .gateway
            .execute(self.schema.collection(), StoreRequest::delete_many(filter))?
            .into_count(Operation::DeleteMany)
    }
}

fn has_identifier(doc: &Document) -> bool {
    doc.get(ID_KEY).is_some_and(Value::is_truthy)
}

/// Builder for cursor fetches.
///
/// Results are `(identifier, item)` pairs in cursor order; identifiers are
/// in their text form.
pub struct ItemsQuery<'db> {
    db: &'db Database,
    schema: Arc<ModelSchema>,
    spec: QuerySpec,
    sort: Option<SortSpec>,
    page: Option<Page>,
    settings: Document,
}

impl<'db> ItemsQuery<'db> {
    /// Sort by one field: `"rating"` or `("rating", "DESC")`.
    pub fn sort(mut self, sort: impl Into<SortSpec>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    /// `5` for the first five, `(5, 5)` for the second page of five.
    pub fn page(mut self, page: impl Into<Page>) -> Self {
        self.page = Some(page.into());
        self
    }

    /// Options overlaid on the computed ones.
    pub fn settings(mut self, settings: Document) -> Self {
        self.settings = settings;
        self
    }

    /// Full records.
    pub fn fetch(self) -> Result<Vec<(String, Record)>> {
        let options = self.options()?;
        let docs = self.run(options)?;
        Ok(docs
            .into_iter()
            .map(|doc| Record::from_document(Arc::clone(&self.schema), doc))
            .map(|record| (id_key(record.id()), record))
            .collect())
    }

    /// One coerced field per record.
    pub fn fetch_values(self, field: &str) -> Result<Vec<(String, Value)>> {
        let descriptor = self
            .schema
            .field(field)
            .ok_or_else(|| ModelError::QuerySpec(format!("{}: unknown field {}", self.schema.collection(), field)))?
            .clone();
        let mut options = self.options()?;
        add_projection(&self.schema, &mut options, &[field])?;

        let pk = self.schema.primary_key() == field;
        Ok(self
            .run(options)?
            .into_iter()
            .map(|doc| {
                let native = decode_id(doc.get(ID_KEY).unwrap_or(&Value::Null));
                let id = id_key(&native);
                let value = if pk {
                    native
                } else {
                    from_store(doc.get(field), &descriptor)
                };
                (id, value)
            })
            .collect())
    }

    /// Selected fields per record, plus the primary key and any score.
    pub fn fetch_partial(self, fields: &[&str]) -> Result<Vec<(String, Document)>> {
        let mut options = self.options()?;
        add_projection(&self.schema, &mut options, fields)?;

        let pk = self.schema.primary_key();
        let mut items = Vec::new();
        for doc in self.run(options)? {
            let id = doc_id(&doc);
            let mut item = Document::with_capacity(fields.len() + 2);
            item.insert(pk, decode_id(doc.get(ID_KEY).unwrap_or(&Value::Null)));
            if let Some(score) = doc.get(SCORE_KEY) {
                item.insert(SCORE_KEY, score.clone());
            }
            for name in fields.iter().filter(|name| **name != pk) {
                if let Some(descriptor) = self.schema.field(name) {
                    item.insert(*name, from_store(doc.get(name), descriptor));
                }
            }
            items.push((id, item));
        }
        Ok(items)
    }

    fn options(&self) -> Result<Document> {
        find_options(&self.schema, self.sort.as_ref(), self.page.as_ref(), &self.settings)
    }

    fn run(&self, options: Document) -> Result<Vec<Document>> {
        let filter = normalize(&self.schema, &self.spec, Scope::Bulk)?;
        let docs = self
            .db
            .gateway
            .execute(self.schema.collection(), StoreRequest::find(filter, options))?
            .into_documents(Operation::Find)?;
        Ok(docs.into_iter().filter(has_identifier).collect())
    }
}

fn doc_id(doc: &Document) -> String {
    id_key(&decode_id(doc.get(ID_KEY).unwrap_or(&Value::Null)))
}
