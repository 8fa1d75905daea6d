//! Query filter normalization, sorting and pagination.
//!
//! Callers describe what they want loosely: nothing (every record), one
//! identifier, a list of identifiers, or a filter document. The normalizer
//! turns that into the filter document sent to the store.

use crate::coerce::encode_id;
use crate::error::{ModelError, Result};
use crate::schema::ModelSchema;
use crate::types::{Document, Value, ID_KEY};

/// Prefix of store operator keys (`$in`, `$gte`, ...).
pub const OPERATOR_PREFIX: char = '$';

/// Separator of nested-path keys (`contact.city`).
pub const PATH_SEPARATOR: char = '.';

/// Loosely shaped query input.
#[derive(Clone, Debug, PartialEq)]
pub enum QuerySpec {
    /// Match every record. Only valid for bulk operations.
    All,
    Id(Value),
    Ids(Vec<Value>),
    Filter(Document),
}

/// Whether an operation may run without narrowing the filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    /// Single-record operations: `All` is rejected.
    Single,
    /// Bulk operations: `All` matches every record.
    Bulk,
}

impl QuerySpec {
    /// Deterministic text form of the spec, used as part of cache keys.
    pub fn fingerprint(&self) -> String {
        match self {
            QuerySpec::All => "all".to_string(),
            QuerySpec::Id(id) => format!("id:{}", id.to_json_string()),
            QuerySpec::Ids(ids) => format!("ids:{}", Value::Array(ids.clone()).to_json_string()),
            QuerySpec::Filter(filter) => format!("filter:{}", filter.to_json_string()),
        }
    }
}

impl From<&str> for QuerySpec {
    fn from(id: &str) -> Self {
        QuerySpec::Id(id.into())
    }
}

impl From<String> for QuerySpec {
    fn from(id: String) -> Self {
        QuerySpec::Id(id.into())
    }
}

impl From<&String> for QuerySpec {
    fn from(id: &String) -> Self {
        QuerySpec::Id(id.as_str().into())
    }
}

impl From<i64> for QuerySpec {
    fn from(id: i64) -> Self {
        QuerySpec::Id(id.into())
    }
}

impl From<i32> for QuerySpec {
    fn from(id: i32) -> Self {
        QuerySpec::Id(id.into())
    }
}

impl From<Document> for QuerySpec {
    fn from(filter: Document) -> Self {
        QuerySpec::Filter(filter)
    }
}

impl<T: Into<Value>> From<Vec<T>> for QuerySpec {
    fn from(ids: Vec<T>) -> Self {
        QuerySpec::Ids(ids.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<QuerySpec>> From<Option<T>> for QuerySpec {
    fn from(spec: Option<T>) -> Self {
        spec.map(Into::into).unwrap_or(QuerySpec::All)
    }
}

impl From<Value> for QuerySpec {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => QuerySpec::All,
            Value::Array(ids) => QuerySpec::Ids(ids),
            Value::Object(filter) => QuerySpec::Filter(filter),
            id => QuerySpec::Id(id),
        }
    }
}

/// Build the store filter for a spec.
pub fn normalize(schema: &ModelSchema, spec: &QuerySpec, scope: Scope) -> Result<Document> {
    match spec {
        QuerySpec::All => match scope {
            Scope::Bulk => Ok(Document::new()),
            Scope::Single => Err(ModelError::QuerySpec(format!(
                "{}: a single-record lookup needs a filter",
                schema.collection()
            ))),
        },
        QuerySpec::Id(id) => {
            if !id.is_truthy() {
                return Err(ModelError::QuerySpec(format!(
                    "{}: empty identifier",
                    schema.collection()
                )));
            }
            let mut filter = Document::new();
            filter.insert(ID_KEY, encode_id(id)?);
            Ok(filter)
        }
        QuerySpec::Ids(ids) => {
            let ids = ids.iter().map(encode_id).collect::<Result<Vec<_>>>()?;
            let mut filter = Document::new();
            filter.insert(ID_KEY, crate::doc! { "$in" => Value::Array(ids) });
            Ok(filter)
        }
        QuerySpec::Filter(raw) => {
            let mut filter = Document::with_capacity(raw.len());
            for (key, value) in raw.iter() {
                if key == ID_KEY || key == schema.primary_key() {
                    filter.insert(ID_KEY, encode_id_condition(value)?);
                } else if is_recognized_key(schema, key) {
                    filter.insert(key, value.clone());
                } else {
                    tracing::trace!(collection = schema.collection(), key, "dropping unrecognized filter key");
                }
            }
            if filter.is_empty() {
                return Err(ModelError::QuerySpec(format!(
                    "{}: filter has no recognized keys",
                    schema.collection()
                )));
            }
            Ok(filter)
        }
    }
}

/// Schema fields, operator keys and nested paths pass through.
fn is_recognized_key(schema: &ModelSchema, key: &str) -> bool {
    schema.contains(key)
        || key.starts_with(OPERATOR_PREFIX)
        || key.find(PATH_SEPARATOR).is_some_and(|pos| pos > 0)
}

/// Identifier typing for the value of an `_id` condition.
fn encode_id_condition(value: &Value) -> Result<Value> {
    match value {
        Value::Object(condition) => {
            let mut encoded = Document::with_capacity(condition.len());
            for (op, operand) in condition.iter() {
                let operand = match (op, operand) {
                    ("$in" | "$nin", Value::Array(ids)) => {
                        Value::Array(ids.iter().map(encode_id).collect::<Result<_>>()?)
                    }
                    ("$eq" | "$ne", id) => encode_id(id)?,
                    (_, other) => other.clone(),
                };
                encoded.insert(op, operand);
            }
            Ok(Value::Object(encoded))
        }
        other => encode_id(other),
    }
}

// --- Sorting ---

/// Sort order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// `"DESC"` in any case is descending; anything else ascending.
    pub fn parse(direction: &str) -> Self {
        if direction.eq_ignore_ascii_case("desc") {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }

    pub fn as_i64(&self) -> i64 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

/// Single-field sort.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }

    /// Sort with a textual direction, e.g. `("rating", "DESC")`.
    pub fn new(field: impl Into<String>, direction: &str) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::parse(direction),
        }
    }

    /// Store sort document. The field must belong to the schema.
    pub fn to_document(&self, schema: &ModelSchema) -> Result<Document> {
        if !schema.contains(&self.field) {
            return Err(ModelError::QuerySpec(format!(
                "{}: cannot sort by unknown field {}",
                schema.collection(),
                self.field
            )));
        }
        let key = if self.field == schema.primary_key() {
            ID_KEY
        } else {
            self.field.as_str()
        };
        let mut sort = Document::new();
        sort.insert(key, self.direction.as_i64());
        Ok(sort)
    }
}

impl From<&str> for SortSpec {
    fn from(field: &str) -> Self {
        SortSpec::asc(field)
    }
}

impl From<(&str, &str)> for SortSpec {
    fn from((field, direction): (&str, &str)) -> Self {
        SortSpec::new(field, direction)
    }
}

// --- Pagination ---

/// Pagination request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Page {
    /// First `n` records.
    Limit(i64),
    /// `limit` records after skipping `offset`.
    Range { offset: i64, limit: i64 },
}

impl Page {
    pub fn range(offset: i64, limit: i64) -> Self {
        Page::Range { offset, limit }
    }

    /// Validated `(skip, limit)`.
    pub fn resolve(&self) -> Result<(u64, u64)> {
        match *self {
            Page::Limit(limit) if limit > 0 => Ok((0, limit as u64)),
            Page::Range { offset, limit } if offset >= 0 && limit > 0 => {
                Ok((offset as u64, limit as u64))
            }
            other => Err(ModelError::QuerySpec(format!("invalid page {:?}", other))),
        }
    }
}

impl From<i64> for Page {
    fn from(limit: i64) -> Self {
        Page::Limit(limit)
    }
}

impl From<i32> for Page {
    fn from(limit: i32) -> Self {
        Page::Limit(limit.into())
    }
}

impl From<(i64, i64)> for Page {
    fn from((offset, limit): (i64, i64)) -> Self {
        Page::range(offset, limit)
    }
}

impl From<(i32, i32)> for Page {
    fn from((offset, limit): (i32, i32)) -> Self {
        Page::range(offset.into(), limit.into())
    }
}

/// Options document of a cursor fetch: skip, limit, sort, then caller
/// settings overlaid on top.
pub fn find_options(
    schema: &ModelSchema,
    sort: Option<&SortSpec>,
    page: Option<&Page>,
    settings: &Document,
) -> Result<Document> {
    let (skip, limit) = match page {
        Some(page) => page.resolve()?,
        None => (0, 0),
    };
    let mut options = crate::doc! { "skip" => skip as i64, "limit" => limit as i64 };
    if let Some(sort) = sort {
        options.insert("sort", sort.to_document(schema)?);
    }
    for (key, value) in settings.iter() {
        options.insert(key, value.clone());
    }
    Ok(options)
}

/// Add an inclusion projection for `fields` (plus the identifier) to options.
pub fn add_projection(schema: &ModelSchema, options: &mut Document, fields: &[&str]) -> Result<()> {
    let mut projection = match options.remove("projection") {
        Some(Value::Object(existing)) => existing,
        _ => Document::new(),
    };
    projection.insert(ID_KEY, 1);
    for field in fields {
        if !schema.contains(field) {
            return Err(ModelError::QuerySpec(format!(
                "{}: cannot project unknown field {}",
                schema.collection(),
                field
            )));
        }
        if *field != schema.primary_key() {
            projection.insert(*field, 1);
        }
    }
    options.insert("projection", projection);
    Ok(())
}
