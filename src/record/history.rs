//! Change history: canonical projections and change records.

use crate::coerce::to_text;
use crate::schema::{FieldDescriptor, FieldType, Projector};
use crate::types::{Document, Value};

/// One field's old and new value within a change record.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldChange {
    pub field: String,
    pub old: Value,
    pub new: Value,
}

/// Entry of a record's history field.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeRecord {
    /// Local time of the save, `%Y-%m-%d %H:%M:%S`.
    pub datetime: String,
    pub changes: Vec<FieldChange>,
}

impl ChangeRecord {
    pub fn new(datetime: impl Into<String>, changes: Vec<FieldChange>) -> Self {
        Self {
            datetime: datetime.into(),
            changes,
        }
    }

    /// Stored shape: `{datetime, changes: {field: [old, new]}}`.
    pub fn to_value(&self) -> Value {
        let changes: Document = self
            .changes
            .iter()
            .map(|c| (c.field.as_str(), Value::Array(vec![c.old.clone(), c.new.clone()])))
            .collect();
        Value::Object(crate::doc! {
            "datetime" => self.datetime.as_str(),
            "changes" => changes,
        })
    }

    /// Parse a stored entry. Malformed entries yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let entry = value.as_document()?;
        let datetime = entry.get("datetime")?.as_str()?.to_string();
        let changes = entry
            .get("changes")?
            .as_document()?
            .iter()
            .map(|(field, pair)| match pair.as_array().map(Vec::as_slice) {
                Some([old, new]) => Some(FieldChange {
                    field: field.to_string(),
                    old: old.clone(),
                    new: new.clone(),
                }),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?;
        Some(Self { datetime, changes })
    }

    pub fn change(&self, field: &str) -> Option<&FieldChange> {
        self.changes.iter().find(|c| c.field == field)
    }
}

// --- Projection ---

/// Canonical comparable form of a field value.
///
/// Two values are considered unchanged exactly when their projections are
/// equal.
pub fn project(field: &FieldDescriptor, value: &Value) -> String {
    match field.projector() {
        Projector::Custom(projector) => projector(value),
        Projector::ByPath(path) => match value {
            Value::Array(_) => project_array(value, Some(path.as_str())),
            Value::Object(_) => project_object(value, Some(path.as_str())),
            _ => match field.field_type() {
                FieldType::Array | FieldType::History => project_array(value, Some(path.as_str())),
                FieldType::Object => project_object(value, Some(path.as_str())),
                _ => project_scalar(value),
            },
        },
        Projector::Default => match field.field_type() {
            FieldType::Array | FieldType::History => project_array(value, None),
            FieldType::Object => project_object(value, None),
            _ => project_scalar(value),
        },
    }
}

/// Sorted elements (or a sorted sub-property of each element) as JSON.
/// Non-arrays project to the empty string.
pub fn project_array(value: &Value, path: Option<&str>) -> String {
    let Value::Array(items) = value else {
        return String::new();
    };
    match path {
        None => {
            let mut sorted = items.clone();
            sorted.sort_by(Value::compare);
            Value::Array(sorted).to_json_string()
        }
        Some(path) => {
            let mut parts: Vec<String> = items
                .iter()
                .map(|item| {
                    let inner = item.as_document().and_then(|doc| doc.get(path));
                    inner.map_or_else(String::new, project_member)
                })
                .collect();
            parts.sort_unstable();
            Value::from(parts).to_json_string()
        }
    }
}

/// The object (or one of its properties) as text. Non-objects and missing
/// or null properties project to the empty string.
pub fn project_object(value: &Value, path: Option<&str>) -> String {
    let Value::Object(doc) = value else {
        return String::new();
    };
    match path {
        None => value.to_json_string(),
        Some(path) => match doc.get(path) {
            Some(inner) if !inner.is_null() => project_member(inner),
            _ => String::new(),
        },
    }
}

/// Text cast with booleans as `"1"` / `"0"`.
pub fn project_scalar(value: &Value) -> String {
    match value {
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => "0".to_string(),
        other => to_text(other),
    }
}

fn project_member(value: &Value) -> String {
    match value {
        Value::Array(_) | Value::Object(_) => value.to_json_string(),
        other => project_scalar(other),
    }
}
