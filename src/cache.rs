//! Instance cache for identity-preserving lookups.
//!
//! Each key owns a load slot. Callers racing on the same key serialize on
//! the slot, so at most one fetch runs per key and every caller receives
//! the same shared instance. Only hits are cached; entries live until
//! invalidated.

use crate::error::Result;
use crate::query::QuerySpec;
use crate::record::Record;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// A record shared between cache users.
pub type SharedRecord = Arc<Mutex<Record>>;

/// Cache key: model name plus the canonical form of the query.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub model: String,
    pub query: String,
}

impl CacheKey {
    pub fn new(model: impl Into<String>, spec: &QuerySpec) -> Self {
        Self {
            model: model.into(),
            query: spec.fingerprint(),
        }
    }
}

type Slot = Arc<Mutex<Option<SharedRecord>>>;

/// Process-wide map of loaded instances.
#[derive(Default)]
pub struct InstanceCache {
    slots: Mutex<HashMap<CacheKey, Slot>>,
}

impl InstanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached instance for `key`, running `load` on a miss.
    ///
    /// A `None` from `load` is returned without caching; so is an error.
    /// Either way the key's slot is released.
    pub fn get_or_load<F>(&self, key: CacheKey, load: F) -> Result<Option<SharedRecord>>
    where
        F: FnOnce() -> Result<Option<Record>>,
    {
        loop {
            let slot = Arc::clone(self.slots.lock().entry(key.clone()).or_default());
            let mut cached = slot.lock();
            if let Some(record) = cached.as_ref() {
                tracing::trace!(model = %key.model, query = %key.query, "instance cache hit");
                return Ok(Some(Arc::clone(record)));
            }
            // Released or invalidated while we waited; start over on the live slot.
            if !self.is_current(&key, &slot) {
                continue;
            }

            tracing::trace!(model = %key.model, query = %key.query, "instance cache miss");
            let loaded = match load() {
                Ok(Some(record)) => record,
                Ok(None) => {
                    self.release(&key, &slot);
                    return Ok(None);
                }
                Err(e) => {
                    self.release(&key, &slot);
                    return Err(e);
                }
            };
            let shared = Arc::new(Mutex::new(loaded));
            *cached = Some(Arc::clone(&shared));
            return Ok(Some(shared));
        }
    }

    fn is_current(&self, key: &CacheKey, slot: &Slot) -> bool {
        self.slots
            .lock()
            .get(key)
            .is_some_and(|live| Arc::ptr_eq(live, slot))
    }

    /// Remove `key` if it still maps to `slot`.
    fn release(&self, key: &CacheKey, slot: &Slot) {
        let mut slots = self.slots.lock();
        if slots.get(key).is_some_and(|live| Arc::ptr_eq(live, slot)) {
            slots.remove(key);
        }
    }

    /// Cached instance without loading.
    pub fn get(&self, key: &CacheKey) -> Option<SharedRecord> {
        let slot = self.slots.lock().get(key).cloned()?;
        let record = slot.lock().clone();
        record
    }

    /// Drop one entry. Returns whether an instance was cached.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let removed = self.slots.lock().remove(key);
        removed.is_some_and(|slot| slot.lock().is_some())
    }

    pub fn clear(&self) {
        self.slots.lock().clear();
    }

    /// Number of cached instances.
    pub fn len(&self) -> usize {
        let slots: Vec<Slot> = self.slots.lock().values().cloned().collect();
        slots.iter().filter(|slot| slot.lock().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
