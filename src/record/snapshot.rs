//! Snapshots and dirty tracking.
//!
//! A record keeps two deep copies of its values: `snapshot`, taken when it
//! was created or loaded, and `snapshot_update`, refreshed after every
//! persisted write. Partial saves write the fields marked dirty and elide
//! those whose store form still equals that of `snapshot_update`.

use super::instance::{is_absent, Record};
use crate::coerce::to_store;
use crate::database::Database;
use crate::error::{ModelError, Result, ValidationReason};
use crate::schema::Modifier;
use crate::types::{Document, Value};

impl Record {
    pub(crate) fn capture_snapshot(&mut self) {
        self.snapshot = self.values.clone();
    }

    pub(crate) fn capture_snapshot_update(&mut self) {
        self.snapshot_update = self.values.clone();
        tracing::trace!(model = self.schema.model_name(), "captured update snapshot");
    }

    /// Value of `name` when the record was created or loaded.
    pub fn snapshot_value(&self, name: &str) -> Option<&Value> {
        self.schema.position(name).and_then(|i| self.snapshot.get(i))
    }

    /// Value of `name` as of the last persisted write.
    pub fn snapshot_update_value(&self, name: &str) -> Option<&Value> {
        self.schema.position(name).and_then(|i| self.snapshot_update.get(i))
    }

    /// Fields pending a partial save.
    pub fn changed_fields(&self) -> &[String] {
        &self.changed_fields
    }

    /// Add fields to the pending set. Empty names are ignored and
    /// duplicates collapse.
    pub fn mark_dirty<S: AsRef<str>>(&mut self, names: &[S]) {
        for name in names {
            let name = name.as_ref();
            if !name.is_empty() && !self.changed_fields.iter().any(|f| f == name) {
                self.changed_fields.push(name.to_string());
            }
        }
    }

    /// Assign (when `value` is given) and write a single field.
    ///
    /// Other pending fields stay pending.
    pub fn save_field(&mut self, db: &Database, name: &str, value: Option<Value>) -> Result<()> {
        if let Some(value) = value {
            self.set(name, value)?;
        }
        let pending = std::mem::take(&mut self.changed_fields);
        let outcome = self.save_fields(db, &[name]);
        self.changed_fields = pending;
        outcome
    }

    /// Mark `names` dirty and write every pending field.
    pub fn save_fields<S: AsRef<str>>(&mut self, db: &Database, names: &[S]) -> Result<()> {
        if self.is_new {
            return Err(ModelError::InvalidOperation(format!(
                "{}: partial save of an unsaved record",
                self.schema.collection()
            )));
        }
        self.mark_dirty(names);
        self.flush_dirty(db)
    }

    /// Write the pending fields in one update. No pending fields, no call.
    ///
    /// A field rejected by validation is dropped from the pending set so
    /// later partial saves are not blocked by it.
    pub(crate) fn flush_dirty(&mut self, db: &Database) -> Result<()> {
        if self.changed_fields.is_empty() {
            return Ok(());
        }

        let mut payload = Document::new();
        let mut written = Vec::new();
        for name in self.changed_fields.clone() {
            let stored = match self.pending_value(&name) {
                Ok(Some((i, stored))) => {
                    written.push(i);
                    stored
                }
                Ok(None) => continue,
                Err(e) => {
                    self.changed_fields.retain(|f| *f != name);
                    return Err(e);
                }
            };
            payload.insert(name, stored);
        }

        if payload.is_empty() {
            tracing::trace!(
                model = self.schema.model_name(),
                fields = ?self.changed_fields,
                "pending fields unchanged, skipping write"
            );
            self.changed_fields.clear();
            return Ok(());
        }

        self.send_update(db, payload)?;
        for i in written {
            self.snapshot_update[i] = self.values[i].clone();
        }
        self.changed_fields.clear();
        Ok(())
    }

    /// Validated store form of a pending field, or `None` when it matches
    /// what was last written.
    fn pending_value(&self, name: &str) -> Result<Option<(usize, Value)>> {
        let i = self
            .schema
            .position(name)
            .ok_or_else(|| ModelError::validation(name, ValidationReason::Unknown))?;
        let field = &self.schema.fields()[i];
        if name == self.schema.primary_key() {
            return Err(ModelError::validation(name, ValidationReason::PrimaryKey));
        }
        if field.has(Modifier::OnlyCreation) {
            return Err(ModelError::validation(name, ValidationReason::OnlyCreation));
        }

        let stored = to_store(&self.values[i], field)?;
        if field.is_required() && is_absent(&stored) {
            return Err(ModelError::validation(name, ValidationReason::Required));
        }

        let last_written = to_store(&self.snapshot_update[i], field).ok();
        if last_written.as_ref() == Some(&stored) {
            return Ok(None);
        }
        Ok(Some((i, stored)))
    }
}
