//! Field descriptors: type tag, modifiers, defaults and per-field hooks.

use crate::record::Record;
use crate::types::Value;
use std::fmt;
use std::sync::Arc;

/// Storage type of a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldType {
    String,
    Int,
    Float,
    Boolean,
    DateTime,
    Array,
    Object,
    /// Append-only change log of the record.
    History,
}

impl FieldType {
    pub fn tag(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::DateTime => "datetime",
            FieldType::Array => "array",
            FieldType::Object => "object",
            FieldType::History => "history",
        }
    }

    /// Parse a type tag. `bool` is accepted as an alias of `boolean`.
    pub fn parse(tag: &str) -> Option<Self> {
        Some(match tag {
            "string" => FieldType::String,
            "int" => FieldType::Int,
            "float" => FieldType::Float,
            "bool" | "boolean" => FieldType::Boolean,
            "datetime" => FieldType::DateTime,
            "array" => FieldType::Array,
            "object" => FieldType::Object,
            "history" => FieldType::History,
            _ => return None,
        })
    }
}

/// Behavioural flags of a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Modifier {
    /// Null, empty string and false are rejected on save.
    Required,
    /// Skipped by the default external view.
    Hidden,
    /// Written on insert only; never part of an update.
    OnlyCreation,
    /// Changes are recorded in the history field.
    History,
    /// Set to the current time on insert, or when empty.
    TimeCreate,
    /// Set to the current time on every full save.
    TimeUpdate,
}

impl Modifier {
    pub fn tag(&self) -> &'static str {
        match self {
            Modifier::Required => "required",
            Modifier::Hidden => "hidden",
            Modifier::OnlyCreation => "onlyCreation",
            Modifier::History => "history",
            Modifier::TimeCreate => "timeCreate",
            Modifier::TimeUpdate => "timeUpdate",
        }
    }
}

/// Value a field takes when absent from the source document.
#[derive(Clone, Debug, PartialEq)]
pub enum DefaultValue {
    Value(Value),
    EmptyObject,
    EmptyArray,
}

/// Canonical projection used to compare a field's old and new value.
pub type ProjectFn = Arc<dyn Fn(&Value) -> String + Send + Sync>;

/// Mapping applied to raw values before they enter a change record.
pub type HistoryValueFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Formatting hook for the external view: `(record, field, active tags)`.
pub type FormatFn = Arc<dyn Fn(&Record, &str, Option<&[String]>) -> Value + Send + Sync>;

/// How a field is projected for change detection.
#[derive(Clone, Default)]
pub enum Projector {
    /// Type-driven canonical projection.
    #[default]
    Default,
    /// Canonical projection of a named sub-property of each element / of the object.
    ByPath(String),
    Custom(ProjectFn),
}

impl fmt::Debug for Projector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Projector::Default => write!(f, "Default"),
            Projector::ByPath(path) => write!(f, "ByPath({})", path),
            Projector::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Declaration of one field of a schema.
#[derive(Clone)]
pub struct FieldDescriptor {
    name: String,
    field_type: FieldType,
    modifiers: Vec<Modifier>,
    tags: Vec<String>,
    default: Option<DefaultValue>,
    projector: Projector,
    history_value: Option<HistoryValueFn>,
    format: Option<FormatFn>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            modifiers: Vec::new(),
            tags: Vec::new(),
            default: None,
            projector: Projector::Default,
            history_value: None,
            format: None,
        }
    }

    // --- Builder ---

    pub fn modifier(mut self, modifier: Modifier) -> Self {
        if !self.modifiers.contains(&modifier) {
            self.modifiers.push(modifier);
        }
        self
    }

    pub fn required(self) -> Self {
        self.modifier(Modifier::Required)
    }

    pub fn hidden(self) -> Self {
        self.modifier(Modifier::Hidden)
    }

    pub fn only_creation(self) -> Self {
        self.modifier(Modifier::OnlyCreation)
    }

    pub fn history(self) -> Self {
        self.modifier(Modifier::History)
    }

    pub fn time_create(self) -> Self {
        self.modifier(Modifier::TimeCreate)
    }

    pub fn time_update(self) -> Self {
        self.modifier(Modifier::TimeUpdate)
    }

    /// Add a caller-defined view tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Value(value.into()));
        self
    }

    pub fn default_empty_object(mut self) -> Self {
        self.default = Some(DefaultValue::EmptyObject);
        self
    }

    pub fn default_empty_array(mut self) -> Self {
        self.default = Some(DefaultValue::EmptyArray);
        self
    }

    /// Compare on a sub-property of each element (arrays) or of the object.
    pub fn project_by(mut self, path: impl Into<String>) -> Self {
        self.projector = Projector::ByPath(path.into());
        self
    }

    pub fn project_with<F>(mut self, projector: F) -> Self
    where
        F: Fn(&Value) -> String + Send + Sync + 'static,
    {
        self.projector = Projector::Custom(Arc::new(projector));
        self
    }

    pub fn history_value<F>(mut self, map: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.history_value = Some(Arc::new(map));
        self
    }

    pub fn format<F>(mut self, format: F) -> Self
    where
        F: Fn(&Record, &str, Option<&[String]>) -> Value + Send + Sync + 'static,
    {
        self.format = Some(Arc::new(format));
        self
    }

    // --- Accessors ---

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn modifiers(&self) -> &[Modifier] {
        &self.modifiers
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn declared_default(&self) -> Option<&DefaultValue> {
        self.default.as_ref()
    }

    pub fn projector(&self) -> &Projector {
        &self.projector
    }

    pub fn history_value_fn(&self) -> Option<&HistoryValueFn> {
        self.history_value.as_ref()
    }

    pub fn format_fn(&self) -> Option<&FormatFn> {
        self.format.as_ref()
    }

    pub fn has(&self, modifier: Modifier) -> bool {
        self.modifiers.contains(&modifier)
    }

    pub fn is_required(&self) -> bool {
        self.has(Modifier::Required)
    }

    /// Whether any attribute of the field carries this tag: a view tag,
    /// a modifier name or the type tag.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
            || self.modifiers.iter().any(|m| m.tag() == tag)
            || self.field_type.tag() == tag
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("field_type", &self.field_type)
            .field("modifiers", &self.modifiers)
            .field("tags", &self.tags)
            .field("default", &self.default)
            .field("projector", &self.projector)
            .field("history_value", &self.history_value.is_some())
            .field("format", &self.format.is_some())
            .finish()
    }
}
