//! In-process trace log of executed store operations.

use crate::types::Document;
use parking_lot::Mutex;
use std::time::Duration;

/// Outcome of a traced operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TraceStatus {
    Success,
    Error(String),
}

impl TraceStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, TraceStatus::Success)
    }
}

/// Everything known about one executed operation.
#[derive(Clone, Debug)]
pub struct TraceRecord {
    pub database: String,
    pub collection: String,
    pub operation: String,
    pub filter: Document,
    pub filter_json: String,
    pub options: Option<Document>,
    pub options_json: String,
    pub settings: Option<Document>,
    pub settings_json: String,
    /// Call-site backtrace, when capture is enabled.
    pub backtrace: Option<String>,
    /// Shell-style rendering of the call.
    pub query: String,
    pub status: TraceStatus,
    pub duration: Duration,
}

impl TraceRecord {
    /// Keys of the `$set` document of an update, empty for other operations.
    pub fn updated_fields(&self) -> Vec<String> {
        self.options
            .as_ref()
            .and_then(|options| options.get("$set"))
            .and_then(|set| set.as_document())
            .map(|set| set.keys().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

/// Shell-style rendering: `db.getCollection("c").op(filter, options, settings);`
///
/// Settings are only rendered when options are present.
pub fn render_query(collection: &str, operation: &str, filter: &str, options: Option<&str>, settings: Option<&str>) -> String {
    let mut args = filter.to_string();
    if let Some(options) = options {
        args.push_str(", ");
        args.push_str(options);
        if let Some(settings) = settings {
            args.push_str(", ");
            args.push_str(settings);
        }
    }
    format!("db.getCollection(\"{}\").{}({});", collection, operation, args)
}

/// Append-only, thread-safe list of trace records.
#[derive(Default)]
pub struct TraceLog {
    records: Mutex<Vec<TraceRecord>>,
}

impl TraceLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, record: TraceRecord) {
        self.records.lock().push(record);
    }

    /// Copy of every record, oldest first.
    pub fn records(&self) -> Vec<TraceRecord> {
        self.records.lock().clone()
    }

    pub fn last(&self) -> Option<TraceRecord> {
        self.records.lock().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Records of one operation name, oldest first.
    pub fn of_operation(&self, operation: &str) -> Vec<TraceRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.operation == operation)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_query() {
        assert_eq!(
            render_query("users", "findOne", "{\"_id\":1}", None, Some("{\"x\":1}")),
            "db.getCollection(\"users\").findOne({\"_id\":1});"
        );
        assert_eq!(
            render_query("users", "find", "{}", Some("{\"limit\":5}"), Some("{\"x\":1}")),
            "db.getCollection(\"users\").find({}, {\"limit\":5}, {\"x\":1});"
        );
    }
}
