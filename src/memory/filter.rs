//! Filter, projection and sort evaluation for the in-memory driver.

use crate::error::StoreFailure;
use crate::types::{Document, Value, ID_KEY};
use std::cmp::Ordering;
use std::mem::discriminant;

type Outcome<T> = Result<T, StoreFailure>;

/// Whether `doc` satisfies `filter`. An empty filter matches everything.
pub fn matches(doc: &Document, filter: &Document) -> Outcome<bool> {
    for (key, condition) in filter.iter() {
        let ok = match key {
            "$and" => clauses(key, condition)?
                .iter()
                .try_fold(true, |acc, clause| Ok::<_, StoreFailure>(acc && matches(doc, clause)?))?,
            "$or" => {
                let mut any = false;
                for clause in clauses(key, condition)? {
                    if matches(doc, clause)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            _ if key.starts_with('$') => {
                return Err(StoreFailure::new(format!("unknown top-level operator: {}", key)))
            }
            path => {
                let candidates = resolve(doc, path);
                field_matches(&candidates, condition)?
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clauses<'a>(key: &str, condition: &'a Value) -> Outcome<Vec<&'a Document>> {
    condition
        .as_array()
        .filter(|items| !items.is_empty())
        .and_then(|items| items.iter().map(Value::as_document).collect::<Option<Vec<_>>>())
        .ok_or_else(|| StoreFailure::new(format!("{} must be a nonempty array of documents", key)))
}

/// Every value reachable under a dotted path. Arrays of documents are
/// traversed element-wise; numeric parts index into arrays.
fn resolve<'a>(doc: &'a Document, path: &str) -> Vec<&'a Value> {
    let mut parts = path.split('.');
    let Some(first) = parts.next() else {
        return Vec::new();
    };
    let mut current: Vec<&Value> = doc.get(first).into_iter().collect();
    for part in parts {
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Object(inner) => next.extend(inner.get(part)),
                Value::Array(items) => match part.parse::<usize>() {
                    Ok(index) => next.extend(items.get(index)),
                    Err(_) => next.extend(
                        items
                            .iter()
                            .filter_map(Value::as_document)
                            .filter_map(|inner| inner.get(part)),
                    ),
                },
                _ => {}
            }
        }
        current = next;
    }
    current
}

fn is_operator_document(condition: &Value) -> bool {
    match condition {
        Value::Object(doc) => !doc.is_empty() && doc.keys().all(|k| k.starts_with('$')),
        _ => false,
    }
}

fn field_matches(candidates: &[&Value], condition: &Value) -> Outcome<bool> {
    if !is_operator_document(condition) {
        return Ok(equals_any(candidates, condition));
    }
    let Some(operators) = condition.as_document() else {
        return Ok(false);
    };
    for (op, operand) in operators.iter() {
        let ok = match op {
            "$eq" => equals_any(candidates, operand),
            "$ne" => !equals_any(candidates, operand),
            "$gt" => compares_any(candidates, operand, |o| o == Ordering::Greater),
            "$gte" => compares_any(candidates, operand, |o| o != Ordering::Less),
            "$lt" => compares_any(candidates, operand, |o| o == Ordering::Less),
            "$lte" => compares_any(candidates, operand, |o| o != Ordering::Greater),
            "$in" => in_set(candidates, op, operand)?,
            "$nin" => !in_set(candidates, op, operand)?,
            "$exists" => candidates.is_empty() != operand.is_truthy(),
            other => return Err(StoreFailure::new(format!("unknown operator: {}", other))),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn same(a: &Value, b: &Value) -> bool {
    comparable(a, b) && a.compare(b) == Ordering::Equal
}

fn comparable(a: &Value, b: &Value) -> bool {
    let numeric = |v: &Value| matches!(v, Value::Int(_) | Value::Float(_));
    (numeric(a) && numeric(b)) || discriminant(a) == discriminant(b)
}

/// Equality with array-contains semantics. A null operand also matches a
/// missing field.
fn equals_any(candidates: &[&Value], expected: &Value) -> bool {
    if candidates.is_empty() {
        return expected.is_null();
    }
    candidates.iter().any(|candidate| {
        same(candidate, expected)
            || candidate
                .as_array()
                .is_some_and(|items| items.iter().any(|item| same(item, expected)))
    })
}

fn compares_any(candidates: &[&Value], operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    let check = |value: &Value| comparable(value, operand) && accept(value.compare(operand));
    candidates.iter().any(|&candidate| match candidate {
        Value::Array(items) if operand.as_array().is_none() => items.iter().any(&check),
        other => check(other),
    })
}

fn in_set(candidates: &[&Value], op: &str, operand: &Value) -> Outcome<bool> {
    let set = operand
        .as_array()
        .ok_or_else(|| StoreFailure::new(format!("{} needs an array", op)))?;
    Ok(set.iter().any(|expected| equals_any(candidates, expected)))
}

// --- Cursor options ---

/// Inclusion projection. `_id` is kept unless excluded explicitly.
pub fn project(doc: &Document, projection: &Document) -> Document {
    if projection.is_empty() {
        return doc.clone();
    }
    let keep_id = projection.get(ID_KEY).map_or(true, Value::is_truthy);
    let included: Vec<&str> = projection
        .iter()
        .filter(|(key, flag)| *key != ID_KEY && flag.is_truthy())
        .map(|(key, _)| key.split('.').next().unwrap_or(key))
        .collect();

    doc.iter()
        .filter(|(key, _)| {
            if *key == ID_KEY {
                keep_id
            } else {
                included.contains(key)
            }
        })
        .map(|(key, value)| (key, value.clone()))
        .collect()
}

/// Stable multi-key sort. Missing values sort first.
pub fn sort(docs: &mut [Document], spec: &Document) {
    if spec.is_empty() {
        return;
    }
    docs.sort_by(|a, b| {
        for (key, direction) in spec.iter() {
            let left = a.get_path(key).unwrap_or(&Value::Null);
            let right = b.get_path(key).unwrap_or(&Value::Null);
            let mut ordering = left.compare(right);
            if direction.as_i64().unwrap_or(1) < 0 {
                ordering = ordering.reverse();
            }
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

/// Non-negative integer option, 0 when absent.
pub fn option_u64(options: &Document, key: &str) -> u64 {
    options
        .get(key)
        .and_then(Value::as_i64)
        .map(|n| n.max(0) as u64)
        .unwrap_or(0)
}

/// Apply `skip` then `limit` (0 means no limit).
pub fn window<T>(items: Vec<T>, skip: u64, limit: u64) -> Vec<T> {
    let iter = items.into_iter().skip(skip as usize);
    if limit == 0 {
        iter.collect()
    } else {
        iter.take(limit as usize).collect()
    }
}

/// Set a possibly dotted key, creating intermediate documents.
pub fn set_path(doc: &mut Document, path: &str, value: Value) -> bool {
    match path.split_once('.') {
        None => doc.insert(path, value.clone()).as_ref() != Some(&value),
        Some((head, rest)) => {
            if !matches!(doc.get(head), Some(Value::Object(_))) {
                doc.insert(head, Document::new());
            }
            match doc.get_mut(head) {
                Some(Value::Object(inner)) => set_path(inner, rest, value),
                _ => false,
            }
        }
    }
}
