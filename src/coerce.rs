//! Value coercion between store values and in-memory field values.
//!
//! Every conversion is driven by the field's type tag only. Loading never
//! fails: malformed numbers become zero and malformed collections become
//! empty. Saving fails only for datetime text that cannot be parsed.

use crate::error::{ModelError, Result, ValidationReason};
use crate::schema::{DefaultValue, FieldDescriptor, FieldType};
use crate::types::{Document, ObjectId, Timestamp, Value};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// In-memory text form of `datetime` fields (local time).
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Value of a field absent from its source document.
pub fn default_for(field: &FieldDescriptor) -> Value {
    match field.declared_default() {
        Some(DefaultValue::Value(value)) => value.clone(),
        Some(DefaultValue::EmptyObject) => Value::Object(Document::new()),
        Some(DefaultValue::EmptyArray) => Value::Array(Vec::new()),
        None => match field.field_type() {
            FieldType::Object => Value::Object(Document::new()),
            FieldType::Array | FieldType::History => Value::Array(Vec::new()),
            _ => Value::Null,
        },
    }
}

/// Convert a raw store (or input) value to its in-memory form.
///
/// `None` means the key was absent and the field default applies. A
/// present `null` stays `null` regardless of type.
pub fn from_store(raw: Option<&Value>, field: &FieldDescriptor) -> Value {
    let value = match raw {
        Some(value) => value.clone(),
        None => default_for(field),
    };
    if value.is_null() {
        return value;
    }

    match field.field_type() {
        FieldType::Int => Value::Int(to_int(&value)),
        FieldType::Float => Value::Float(to_float(&value)),
        FieldType::Boolean => Value::Bool(value.is_truthy()),
        FieldType::Array | FieldType::History => normalize_collection(value),
        FieldType::DateTime => match value {
            Value::DateTime(ts) => Value::String(format_local(ts)),
            other => other,
        },
        FieldType::String | FieldType::Object => value,
    }
}

/// Convert an in-memory value to the form written to the store.
pub fn to_store(value: &Value, field: &FieldDescriptor) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    Ok(match field.field_type() {
        FieldType::Int => Value::Int(to_int(value)),
        FieldType::Float => Value::Float(to_float(value)),
        FieldType::Boolean => Value::Bool(value.is_truthy()),
        FieldType::DateTime => match value {
            Value::DateTime(ts) => Value::DateTime(*ts),
            Value::String(s) if s.trim().is_empty() => Value::Null,
            Value::String(s) => Value::DateTime(
                parse_local(s)
                    .ok_or_else(|| ModelError::validation(field.name(), ValidationReason::Malformed))?,
            ),
            _ => return Err(ModelError::validation(field.name(), ValidationReason::Malformed)),
        },
        FieldType::String => Value::String(to_text(value)),
        FieldType::Array | FieldType::Object | FieldType::History => value.clone(),
    })
}

/// Arrays survive a strict JSON round trip; anything else becomes empty.
fn normalize_collection(value: Value) -> Value {
    match value {
        Value::Array(items) => match Value::Array(items).to_json_strict() {
            Some(json) => match Value::from_json(json) {
                array @ Value::Array(_) => array,
                _ => Value::Array(Vec::new()),
            },
            None => Value::Array(Vec::new()),
        },
        _ => Value::Array(Vec::new()),
    }
}

// --- Scalars ---

/// Integer conversion: numeric prefix of strings, truncation of floats, 0 otherwise.
pub fn to_int(value: &Value) -> i64 {
    match value {
        Value::Int(i) => *i,
        Value::Float(f) => float_to_int(*f),
        Value::Bool(b) => *b as i64,
        Value::String(s) => {
            let prefix = numeric_prefix(s);
            match prefix.parse::<i64>() {
                Ok(i) => i,
                Err(_) => float_to_int(prefix.parse::<f64>().unwrap_or_default()),
            }
        }
        Value::Array(items) => !items.is_empty() as i64,
        Value::Null => 0,
        Value::ObjectId(_) | Value::DateTime(_) | Value::Object(_) => 1,
    }
}

/// Float conversion with the same rules as [`to_int`].
pub fn to_float(value: &Value) -> f64 {
    match value {
        Value::Float(f) => *f,
        Value::Int(i) => *i as f64,
        Value::String(s) => numeric_prefix(s).parse::<f64>().unwrap_or_default(),
        other => to_int(other) as f64,
    }
}

fn float_to_int(f: f64) -> i64 {
    if f.is_finite() {
        f.trunc() as i64
    } else {
        0
    }
}

/// Leading numeric part of a string: sign, digits, fraction, exponent.
fn numeric_prefix(s: &str) -> &str {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let digits_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    let mut has_digits = end > digits_start;
    if bytes.get(end) == Some(&b'.') {
        let mut frac = end + 1;
        while bytes.get(frac).is_some_and(u8::is_ascii_digit) {
            frac += 1;
        }
        if frac > end + 1 || has_digits {
            has_digits = has_digits || frac > end + 1;
            end = frac;
        }
    }
    if !has_digits {
        return "";
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_digits = exp;
        while bytes.get(exp).is_some_and(u8::is_ascii_digit) {
            exp += 1;
        }
        if exp > exp_digits {
            end = exp;
        }
    }
    &s[..end]
}

/// Text form of a float: integral values print without a fraction.
pub fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        format!("{}", f)
    }
}

/// Explicit string conversion used for `string` fields.
pub fn to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => String::new(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => format_float(*f),
        Value::String(s) => s.clone(),
        Value::ObjectId(id) => id.to_hex(),
        Value::DateTime(ts) => format_local(*ts),
        Value::Array(_) | Value::Object(_) => value.to_json_string(),
    }
}

// --- Datetime ---

/// Format a store timestamp as local time.
pub fn format_local(ts: Timestamp) -> String {
    Local
        .timestamp_millis_opt(ts.0)
        .earliest()
        .map(|dt| dt.format(DATETIME_FORMAT).to_string())
        .unwrap_or_default()
}

/// Parse local-time text back into a store timestamp.
///
/// Accepts the in-memory format, `T`-separated and minute-precision
/// variants, a bare date (midnight) and RFC 3339 with an explicit offset.
pub fn parse_local(s: &str) -> Option<Timestamp> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(Timestamp(dt.timestamp_millis()));
    }

    let naive = [DATETIME_FORMAT, "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;

    let millis = Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp_millis())
        .unwrap_or_else(|| naive.and_utc().timestamp_millis());
    Some(Timestamp(millis))
}

/// Current time at second precision, as `(local text, store timestamp)`.
pub fn now_local() -> (String, Timestamp) {
    let ts = Timestamp::from_secs(Utc::now().timestamp());
    (format_local(ts), ts)
}

// --- Identifiers ---

/// Convert a canonical-width string to a native identifier.
///
/// Strings of any other width and non-string values pass through.
pub fn encode_id(value: &Value) -> Result<Value> {
    match value {
        Value::String(s) if ObjectId::has_canonical_width(s) => ObjectId::parse_str(s)
            .map(Value::ObjectId)
            .map_err(|_| ModelError::InvalidIdentifier(s.clone())),
        other => Ok(other.clone()),
    }
}

/// Expose a stored identifier in memory: native identifiers become hex text.
pub fn decode_id(value: &Value) -> Value {
    match value {
        Value::ObjectId(id) => Value::String(id.to_hex()),
        other => other.clone(),
    }
}

/// Text key of an identifier, used to key fetched items.
pub fn id_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => to_text(other),
    }
}
