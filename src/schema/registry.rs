//! Model schemas and the registry that builds each one once.

use super::field::{FieldDescriptor, FieldType};
use crate::error::{ModelError, Result};
use crate::record::{FieldChange, Record};
use crate::types::ID_KEY;
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Lifecycle hooks of a record type. Every method defaults to a no-op.
pub trait RecordHooks: Send + Sync {
    /// After construction from input data or defaults.
    fn after_create(&self, _record: &mut Record) {}

    /// After a record was populated from the store.
    fn after_load(&self, _record: &mut Record) {}

    /// Before a full save builds its payload.
    fn pre_save(&self, _record: &mut Record) {}

    /// After a successful write; `fields` are the names written.
    fn after_save(&self, _record: &mut Record, _fields: &[String]) {}

    /// Record-level history policy. Returning false drops the change record.
    fn approve_history(&self, _record: &Record, _changes: &[FieldChange]) -> bool {
        true
    }
}

/// Hooks that do nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoHooks;

impl RecordHooks for NoHooks {}

/// Immutable field model of one record type.
pub struct ModelSchema {
    model: String,
    collection: String,
    primary_key: String,
    fields: Vec<FieldDescriptor>,
    positions: HashMap<String, usize>,
    history_field: Option<usize>,
    hooks: Arc<dyn RecordHooks>,
}

impl ModelSchema {
    pub fn builder(collection: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(collection)
    }

    /// Name used to key cached instances of this type.
    pub fn model_name(&self) -> &str {
        &self.model
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Fields in declared order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.position(name).map(|i| &self.fields[i])
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    pub fn primary_key_position(&self) -> usize {
        self.positions[&self.primary_key]
    }

    /// The field holding the change log, if the type records history.
    pub fn history_field(&self) -> Option<&FieldDescriptor> {
        self.history_field.map(|i| &self.fields[i])
    }

    pub fn hooks(&self) -> Arc<dyn RecordHooks> {
        Arc::clone(&self.hooks)
    }
}

impl fmt::Debug for ModelSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSchema")
            .field("model", &self.model)
            .field("collection", &self.collection)
            .field("primary_key", &self.primary_key)
            .field("fields", &self.fields)
            .finish()
    }
}

/// Builder for [`ModelSchema`]. Validation happens in [`SchemaBuilder::build`].
pub struct SchemaBuilder {
    model: Option<String>,
    collection: String,
    primary_key: Option<String>,
    fields: Vec<FieldDescriptor>,
    hooks: Arc<dyn RecordHooks>,
}

impl SchemaBuilder {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            model: None,
            collection: collection.into(),
            primary_key: None,
            fields: Vec::new(),
            hooks: Arc::new(NoHooks),
        }
    }

    /// Override the model name (defaults to the collection name).
    pub fn model_name(mut self, name: impl Into<String>) -> Self {
        self.model = Some(name.into());
        self
    }

    pub fn primary_key(mut self, name: impl Into<String>) -> Self {
        self.primary_key = Some(name.into());
        self
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn hooks(mut self, hooks: impl RecordHooks + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    pub fn build(self) -> Result<ModelSchema> {
        if self.collection.is_empty() {
            return Err(ModelError::Configuration("collection name is empty".into()));
        }

        let mut positions = HashMap::with_capacity(self.fields.len());
        let mut history_field = None;

        for (i, field) in self.fields.iter().enumerate() {
            let name = field.name();
            if name.is_empty() || name.starts_with('$') || name.contains('.') || name == ID_KEY {
                return Err(ModelError::Configuration(format!(
                    "{}: invalid field name {:?}",
                    self.collection, name
                )));
            }
            if positions.insert(name.to_string(), i).is_some() {
                return Err(ModelError::Configuration(format!(
                    "{}: duplicate field {}",
                    self.collection, name
                )));
            }
            if field.field_type() == FieldType::History {
                if history_field.is_some() {
                    return Err(ModelError::Configuration(format!(
                        "{}: more than one history field",
                        self.collection
                    )));
                }
                history_field = Some(i);
            }
        }

        let primary_key = self.primary_key.ok_or_else(|| {
            ModelError::Configuration(format!("{}: no primary key", self.collection))
        })?;
        if !positions.contains_key(&primary_key) {
            return Err(ModelError::Configuration(format!(
                "{}: primary key {} is not a declared field",
                self.collection, primary_key
            )));
        }

        Ok(ModelSchema {
            model: self.model.unwrap_or_else(|| self.collection.clone()),
            collection: self.collection,
            primary_key,
            fields: self.fields,
            positions,
            history_field,
            hooks: self.hooks,
        })
    }
}

/// A record type with a declarative field model.
pub trait Model: 'static {
    /// Describe the schema. Called at most once per registry on success.
    fn schema() -> SchemaBuilder;
}

/// Builds each model's schema on first use and shares it afterwards.
#[derive(Default)]
pub struct SchemaRegistry {
    schemas: RwLock<HashMap<TypeId, Arc<ModelSchema>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schema of `M`, built on first call. Configuration errors are
    /// returned on every call until the schema builds. A model name
    /// already taken by another type is a configuration error.
    pub fn get<M: Model>(&self) -> Result<Arc<ModelSchema>> {
        let key = TypeId::of::<M>();
        if let Some(schema) = self.schemas.read().get(&key) {
            return Ok(Arc::clone(schema));
        }

        let mut schemas = self.schemas.write();
        if let Some(schema) = schemas.get(&key) {
            return Ok(Arc::clone(schema));
        }
        let schema = Arc::new(M::schema().build()?);
        // Model names key the instance cache, so two types may not share one.
        if schemas.values().any(|other| other.model_name() == schema.model_name()) {
            return Err(ModelError::Configuration(format!(
                "model name `{}` is already registered by another type; \
                 set a distinct one with SchemaBuilder::model_name",
                schema.model_name()
            )));
        }
        tracing::debug!(
            model = schema.model_name(),
            collection = schema.collection(),
            fields = schema.fields().len(),
            "registered schema"
        );
        schemas.insert(key, Arc::clone(&schema));
        Ok(schema)
    }

    /// Number of schemas built so far.
    pub fn len(&self) -> usize {
        self.schemas.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.read().is_empty()
    }
}
