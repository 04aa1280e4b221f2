//! The per-unit-of-work aggregate cache.
//!
//! Repeated loads of the same aggregate inside one command execution must
//! return the same in-memory instance (identity, not just equality), so the
//! repository keys loaded aggregates by id and hands out clones of the same
//! `Arc`. The cache is cleared at the end of each transaction by the caller.

use std::{
    any::Any,
    collections::HashMap,
    sync::{Arc, RwLock},
};

use uuid::Uuid;

/// Unit-of-work cache mapping aggregate ids to loaded aggregate instances.
#[derive(Debug, Default)]
pub struct AggregateRepository {
    aggregates: RwLock<HashMap<Uuid, Arc<dyn Any + Send + Sync>>>,
}

impl AggregateRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache a loaded aggregate, replacing any previous instance for the id.
    pub fn insert<A: Send + Sync + 'static>(&self, aggregate_id: Uuid, aggregate: Arc<A>) {
        self.aggregates
            .write()
            .expect("aggregate repository lock poisoned")
            .insert(aggregate_id, aggregate);
    }

    /// Fetch a cached aggregate.
    ///
    /// Returns `None` when the id is absent or was cached under a different
    /// concrete type.
    #[must_use]
    pub fn get<A: Send + Sync + 'static>(&self, aggregate_id: &Uuid) -> Option<Arc<A>> {
        let aggregates = self
            .aggregates
            .read()
            .expect("aggregate repository lock poisoned");
        let aggregate = aggregates.get(aggregate_id)?;
        Arc::clone(aggregate).downcast().ok()
    }

    #[must_use]
    pub fn contains(&self, aggregate_id: &Uuid) -> bool {
        self.aggregates
            .read()
            .expect("aggregate repository lock poisoned")
            .contains_key(aggregate_id)
    }

    /// Empty the cache. Called at the end of each unit of work.
    pub fn clear(&self) {
        self.aggregates
            .write()
            .expect("aggregate repository lock poisoned")
            .clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.aggregates
            .read()
            .expect("aggregate repository lock poisoned")
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
