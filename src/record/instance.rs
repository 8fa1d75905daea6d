//! Record instances: construction, field access, full save and delete.

use super::history::{self, ChangeRecord, FieldChange};
use crate::coerce::{decode_id, encode_id, from_store, now_local, to_store};
use crate::database::Database;
use crate::error::{ModelError, Result, ValidationReason};
use crate::gateway::{Operation, StoreRequest};
use crate::schema::{FieldDescriptor, FieldType, ModelSchema, Modifier};
use crate::types::{Document, Value, ID_KEY};
use std::fmt;
use std::sync::Arc;

/// Name of the relevance score a store may attach to fetched documents.
pub const SCORE_KEY: &str = "score";

/// One schema-bound record.
///
/// Values are kept in schema order. Direct assignment through
/// [`Record::set`] is untracked; [`Record::save`] diffs against the last
/// persisted snapshot, and [`Record::save_fields`] writes explicitly marked
/// fields.
#[derive(Clone)]
pub struct Record {
    pub(super) schema: Arc<ModelSchema>,
    pub(super) values: Vec<Value>,
    pub(super) is_new: bool,
    pub(super) snapshot: Vec<Value>,
    pub(super) snapshot_update: Vec<Value>,
    pub(super) changed_fields: Vec<String>,
    pub(super) score: Option<Value>,
}

impl Record {
    /// Fresh, unsaved record. Fields absent from `data` take their defaults.
    pub fn new(schema: Arc<ModelSchema>, data: Document) -> Self {
        let values = schema
            .fields()
            .iter()
            .map(|field| from_store(data.get(field.name()), field))
            .collect();
        let mut record = Self::with_values(schema, values, true);
        record.schema.hooks().after_create(&mut record);
        record.capture_snapshot();
        record.capture_snapshot_update();
        record
    }

    /// Record populated from a stored document.
    pub(crate) fn from_document(schema: Arc<ModelSchema>, mut doc: Document) -> Self {
        let id = doc.remove(ID_KEY).map(|id| decode_id(&id)).unwrap_or_default();
        let pk = schema.primary_key_position();
        let values = schema
            .fields()
            .iter()
            .enumerate()
            .map(|(i, field)| {
                if i == pk {
                    id.clone()
                } else {
                    from_store(doc.get(field.name()), field)
                }
            })
            .collect();

        let mut record = Self::with_values(Arc::clone(&schema), values, false);
        if !schema.contains(SCORE_KEY) {
            record.score = doc.remove(SCORE_KEY);
        }
        record.schema.hooks().after_load(&mut record);
        record.capture_snapshot();
        record.capture_snapshot_update();
        record
    }

    fn with_values(schema: Arc<ModelSchema>, values: Vec<Value>, is_new: bool) -> Self {
        Self {
            schema,
            values,
            is_new,
            snapshot: Vec::new(),
            snapshot_update: Vec::new(),
            changed_fields: Vec::new(),
            score: None,
        }
    }

    // --- Access ---

    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    /// True until the first successful insert.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Primary-key value.
    pub fn id(&self) -> &Value {
        &self.values[self.schema.primary_key_position()]
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.schema.position(name).map(|i| &self.values[i])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.schema.position(name).map(move |i| &mut self.values[i])
    }

    /// Assign a field without marking it dirty.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let slot = self
            .get_mut(name)
            .ok_or_else(|| ModelError::validation(name, ValidationReason::Unknown))?;
        *slot = value.into();
        Ok(())
    }

    /// Relevance score attached by a text search, if any.
    pub fn score(&self) -> Option<&Value> {
        self.score.as_ref()
    }

    /// Entries of the history field, oldest first. Malformed entries are skipped.
    pub fn history(&self) -> Vec<ChangeRecord> {
        self.schema
            .history_field()
            .and_then(|field| self.get(field.name()))
            .and_then(Value::as_array)
            .map(|entries| entries.iter().filter_map(ChangeRecord::from_value).collect())
            .unwrap_or_default()
    }

    /// Fields paired with their current values, in schema order.
    pub fn fields(&self) -> impl Iterator<Item = (&FieldDescriptor, &Value)> {
        self.schema.fields().iter().zip(self.values.iter())
    }

    pub(crate) fn id_filter(&self) -> Result<Document> {
        let id = self.id();
        if id.is_null() {
            return Err(ModelError::InvalidOperation(format!(
                "{}: record has no identifier",
                self.schema.collection()
            )));
        }
        let mut filter = Document::new();
        filter.insert(ID_KEY, encode_id(id)?);
        Ok(filter)
    }

    // --- Full save ---

    /// Persist the record: insert when new, otherwise update changed fields.
    pub fn save(&mut self, db: &Database) -> Result<&mut Self> {
        self.save_with(db, Document::new())
    }

    /// Apply `assignments` (non-null values of schema fields), then save.
    pub fn save_with(&mut self, db: &Database, assignments: Document) -> Result<&mut Self> {
        for (name, value) in assignments.iter() {
            if value.is_null() {
                continue;
            }
            if let Some(i) = self.schema.position(name) {
                self.values[i] = from_store(Some(value), &self.schema.fields()[i]);
            }
        }

        let schema = Arc::clone(&self.schema);
        let hooks = schema.hooks();
        hooks.pre_save(self);

        let (mut payload, changes) = self.build_payload(&schema)?;

        if self.is_new {
            self.insert(db, payload)?;
            return Ok(self);
        }

        let mut prior_history = None;
        if let Some(history_field) = schema.history_field() {
            if !changes.is_empty() && hooks.approve_history(self, &changes) {
                let (datetime, _) = now_local();
                let entry = ChangeRecord::new(datetime, changes).to_value();
                let i = schema.position(history_field.name()).unwrap_or_default();
                prior_history = Some((i, self.values[i].clone()));
                match &mut self.values[i] {
                    Value::Array(entries) => entries.push(entry),
                    other => *other = Value::Array(vec![entry]),
                }
                payload.insert(history_field.name(), self.values[i].clone());
            }
        }

        if payload.is_empty() {
            return Ok(self);
        }
        if let Err(e) = self.send_update(db, payload) {
            // A failed write leaves no change record behind.
            if let Some((i, prior)) = prior_history {
                self.values[i] = prior;
            }
            return Err(e);
        }
        self.capture_snapshot_update();
        Ok(self)
    }

    /// Write payload of a full save, plus the history changes it implies.
    fn build_payload(&mut self, schema: &ModelSchema) -> Result<(Document, Vec<FieldChange>)> {
        let mut payload = Document::new();
        let mut changes = Vec::new();
        let pk = schema.primary_key_position();

        for (i, field) in schema.fields().iter().enumerate() {
            if field.has(Modifier::OnlyCreation) && !self.is_new {
                continue;
            }
            if i == pk {
                if self.is_new && field.is_required() {
                    let id = &self.values[i];
                    if is_absent(id) {
                        return Err(ModelError::validation(field.name(), ValidationReason::Required));
                    }
                    payload.insert(ID_KEY, encode_id(id)?);
                }
                continue;
            }
            // Written only together with a new change record.
            if field.field_type() == FieldType::History {
                continue;
            }

            let mut stored = to_store(&self.values[i], field)?;
            let stamp = field.has(Modifier::TimeUpdate)
                || (field.has(Modifier::TimeCreate) && (self.is_new || !self.values[i].is_truthy()));
            if stamp {
                let (text, ts) = now_local();
                self.values[i] = Value::String(text);
                stored = Value::DateTime(ts);
            }

            if field.is_required() && is_absent(&stored) {
                return Err(ModelError::validation(field.name(), ValidationReason::Required));
            }

            if !self.is_new && !field.has(Modifier::TimeUpdate) {
                let old = &self.snapshot_update[i];
                let new = &self.values[i];
                if history::project(field, old) == history::project(field, new) {
                    continue;
                }
                if field.has(Modifier::History) {
                    changes.push(FieldChange {
                        field: field.name().to_string(),
                        old: history_value(field, old),
                        new: history_value(field, new),
                    });
                }
            }
            payload.insert(field.name(), stored);
        }
        Ok((payload, changes))
    }

    fn insert(&mut self, db: &Database, payload: Document) -> Result<()> {
        let collection = self.schema.collection().to_string();
        let written: Vec<String> = payload.keys().map(str::to_string).collect();

        let id = db
            .gateway()
            .execute(&collection, StoreRequest::insert_one(payload))?
            .into_inserted_id(Operation::InsertOne)?
            .filter(Value::is_truthy)
            .ok_or(ModelError::InsertWithoutId(collection))?;

        let pk = self.schema.primary_key_position();
        self.values[pk] = decode_id(&id);
        self.is_new = false;

        self.schema.hooks().after_save(self, &written);
        self.capture_snapshot();
        self.capture_snapshot_update();
        Ok(())
    }

    /// `$set` update of this record's document.
    pub(super) fn send_update(&mut self, db: &Database, payload: Document) -> Result<()> {
        let written: Vec<String> = payload.keys().map(str::to_string).collect();
        let filter = self.id_filter()?;
        db.gateway().execute(
            self.schema.collection(),
            StoreRequest::update_one(filter, payload),
        )?;
        self.schema.hooks().after_save(self, &written);
        Ok(())
    }

    /// Remove the stored document. Unsaved records are left alone.
    pub fn delete(&mut self, db: &Database) -> Result<bool> {
        if self.is_new {
            return Ok(false);
        }
        let filter = self.id_filter()?;
        db.gateway()
            .execute(self.schema.collection(), StoreRequest::delete_one(filter))?
            .into_count(Operation::DeleteOne)?;
        Ok(true)
    }

    // --- External view ---

    /// Field name to value mapping for display.
    ///
    /// With `tags`, only fields carrying one of them (view tag, modifier
    /// name or type tag) are included. Hidden fields are skipped when
    /// `skip_hidden` is set. A relevance score is appended when present.
    pub fn to_view(&self, tags: Option<&[&str]>, skip_hidden: bool) -> Document {
        let active: Option<Vec<String>> = tags.map(|t| t.iter().map(|s| s.to_string()).collect());
        let mut view = Document::with_capacity(self.values.len() + 1);

        for (field, value) in self.fields() {
            if skip_hidden && field.has(Modifier::Hidden) {
                continue;
            }
            if let Some(tags) = tags {
                if !tags.iter().any(|tag| field.has_tag(tag)) {
                    continue;
                }
            }
            let shown = match field.format_fn() {
                Some(format) if !value.is_null() => format(self, field.name(), active.as_deref()),
                _ => value.clone(),
            };
            view.insert(field.name(), shown);
        }

        if let Some(score) = &self.score {
            view.insert(SCORE_KEY, score.clone());
        }
        view
    }
}

/// Null, empty string and false count as absent for required fields.
pub(super) fn is_absent(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Bool(b) => !b,
        _ => false,
    }
}

fn history_value(field: &FieldDescriptor, value: &Value) -> Value {
    match field.history_value_fn() {
        Some(map) => map(value),
        None => value.clone(),
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: Document = self
            .fields()
            .map(|(field, value)| (field.name(), value.clone()))
            .collect();
        f.debug_struct("Record")
            .field("model", &self.schema.model_name())
            .field("is_new", &self.is_new)
            .field("values", &values)
            .field("changed_fields", &self.changed_fields)
            .finish()
    }
}

/// JSON of the default view.
impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_view(None, true).to_json_string())
    }
}
