//! Persistence gateway.
//!
//! Every store operation goes through [`Gateway::execute`], which times the
//! call, optionally appends a [`TraceRecord`] to the trace log, and converts
//! driver failures into [`ModelError::Storage`]. Nothing is retried.

mod store;
mod trace;

pub use store::{CollectionStats, DocumentStore, Operation, StoreReply, StoreRequest};
pub use trace::{render_query, TraceLog, TraceRecord, TraceStatus};

use crate::error::{ModelError, Result};
use crate::types::{Document, Value};
use std::backtrace::Backtrace;
use std::sync::Arc;
use std::time::Instant;

/// Executes store operations and traces them.
pub struct Gateway {
    store: Arc<dyn DocumentStore>,
    database: String,
    debug: bool,
    capture_backtrace: bool,
    trace: Arc<TraceLog>,
}

impl Gateway {
    pub fn new(store: Arc<dyn DocumentStore>, database: impl Into<String>) -> Self {
        Self {
            store,
            database: database.into(),
            debug: false,
            capture_backtrace: true,
            trace: Arc::new(TraceLog::new()),
        }
    }

    /// Enable or disable the trace log.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_backtrace(mut self, capture: bool) -> Self {
        self.capture_backtrace = capture;
        self
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn trace(&self) -> &Arc<TraceLog> {
        &self.trace
    }

    /// Run one operation against `collection`.
    pub fn execute(&self, collection: &str, request: StoreRequest) -> Result<StoreReply> {
        let backtrace = (self.debug && self.capture_backtrace)
            .then(|| Backtrace::force_capture().to_string());

        let started = Instant::now();
        let outcome = self.store.execute(collection, &request);
        let duration = started.elapsed();

        tracing::debug!(
            collection,
            operation = request.operation.name(),
            duration_us = duration.as_micros() as u64,
            ok = outcome.is_ok(),
            "executed store operation"
        );

        if self.debug {
            let status = match &outcome {
                Ok(_) => TraceStatus::Success,
                Err(failure) => TraceStatus::Error(failure.to_string()),
            };
            self.trace.push(self.trace_record(collection, &request, backtrace, status, duration));
        }

        outcome.map_err(|failure| {
            tracing::warn!(
                collection,
                operation = request.operation.name(),
                error = %failure,
                "store operation failed"
            );
            ModelError::Storage {
                collection: collection.to_string(),
                operation: request.operation.name().to_string(),
                message: failure.message,
            }
        })
    }

    fn trace_record(
        &self,
        collection: &str,
        request: &StoreRequest,
        backtrace: Option<String>,
        status: TraceStatus,
        duration: std::time::Duration,
    ) -> TraceRecord {
        let filter_json = request.filter.to_json_string();
        let use_options = !request.options.is_empty();
        let use_settings = !request.settings.is_empty();
        let options_json = if use_options {
            request.options.to_json_string()
        } else {
            "{}".to_string()
        };
        let settings_json = if use_settings {
            request.settings.to_json_string()
        } else {
            "{}".to_string()
        };
        let query = render_query(
            collection,
            request.operation.name(),
            &filter_json,
            use_options.then_some(options_json.as_str()),
            use_settings.then_some(settings_json.as_str()),
        );

        TraceRecord {
            database: self.database.clone(),
            collection: collection.to_string(),
            operation: request.operation.name().to_string(),
            filter: request.filter.clone(),
            filter_json,
            options: use_options.then(|| request.options.clone()),
            options_json,
            settings: use_settings.then(|| request.settings.clone()),
            settings_json,
            backtrace,
            query,
            status,
            duration,
        }
    }
}

// --- Reply shapes ---

fn unexpected(operation: Operation, expected: &'static str) -> ModelError {
    ModelError::UnexpectedReply {
        operation: operation.name().to_string(),
        expected,
    }
}

impl StoreReply {
    pub fn into_document(self, operation: Operation) -> Result<Option<Document>> {
        match self {
            StoreReply::Document(doc) => Ok(doc),
            _ => Err(unexpected(operation, "a single document")),
        }
    }

    pub fn into_documents(self, operation: Operation) -> Result<Vec<Document>> {
        match self {
            StoreReply::Documents(docs) => Ok(docs),
            _ => Err(unexpected(operation, "a cursor")),
        }
    }

    pub fn into_inserted_id(self, operation: Operation) -> Result<Option<Value>> {
        match self {
            StoreReply::Inserted(id) => Ok(id),
            _ => Err(unexpected(operation, "an inserted id")),
        }
    }

    pub fn into_count(self, operation: Operation) -> Result<u64> {
        match self {
            StoreReply::Count(n) | StoreReply::Deleted(n) => Ok(n),
            _ => Err(unexpected(operation, "a count")),
        }
    }

    pub fn into_stats(self, operation: Operation) -> Result<CollectionStats> {
        match self {
            StoreReply::Stats(stats) => Ok(stats),
            _ => Err(unexpected(operation, "collection statistics")),
        }
    }
}
