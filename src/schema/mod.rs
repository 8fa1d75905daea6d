//! Field model registry.
//!
//! A schema maps field names to a type tag, a set of modifiers and an
//! optional default. Schemas are immutable once built; the registry builds
//! each record type's schema once and shares it.

mod field;
mod registry;

pub use field::{
    DefaultValue, FieldDescriptor, FieldType, FormatFn, HistoryValueFn, Modifier, ProjectFn,
    Projector,
};
pub use registry::{Model, ModelSchema, NoHooks, RecordHooks, SchemaBuilder, SchemaRegistry};
