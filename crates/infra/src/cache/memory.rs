//! In-memory cache store
//!
//! Default backend: two RwLock'd maps, one per logical table. Writes
//! replace whole entries under the write lock, so concurrent readers
//! observe the old or the new entry, never an intermediate state.

use std::collections::HashMap;

use parking_lot::RwLock;
use synergia_core::ports::{ObjectCacheStore, QueryCacheStore};
use synergia_domain::errors::CacheError;
use synergia_domain::types::{EntityId, EntityKind, ObjectCacheEntry, QueryCacheEntry};
use tracing::trace;

/// Process-local, non-durable cache store
#[derive(Default)]
pub struct MemoryCache {
    queries: RwLock<HashMap<(String, String), QueryCacheEntry>>,
    objects: RwLock<HashMap<(EntityId, EntityKind), ObjectCacheEntry>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl QueryCacheStore for MemoryCache {
    fn get(&self, uri: &str, owner: &str) -> Result<Option<QueryCacheEntry>, CacheError> {
        Ok(self.queries.read().get(&(uri.to_string(), owner.to_string())).cloned())
    }

    fn put(&self, entry: QueryCacheEntry) -> Result<(), CacheError> {
        trace!(uri = %entry.uri, owner = %entry.owner, "query cache put");
        self.queries.write().insert((entry.uri.clone(), entry.owner.clone()), entry);
        Ok(())
    }

    fn invalidate(&self, uri: &str, owner: &str) -> Result<(), CacheError> {
        self.queries.write().remove(&(uri.to_string(), owner.to_string()));
        Ok(())
    }

    fn count(&self) -> Result<usize, CacheError> {
        Ok(self.queries.read().len())
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.queries.write().clear();
        Ok(())
    }
}

impl ObjectCacheStore for MemoryCache {
    fn get(&self, id: EntityId, kind: EntityKind) -> Result<Option<ObjectCacheEntry>, CacheError> {
        Ok(self.objects.read().get(&(id, kind)).cloned())
    }

    fn put(&self, entry: ObjectCacheEntry) -> Result<(), CacheError> {
        trace!(id = %entry.id, kind = %entry.kind, "object cache put");
        self.objects.write().insert((entry.id, entry.kind), entry);
        Ok(())
    }

    fn invalidate(&self, id: EntityId, kind: EntityKind) -> Result<(), CacheError> {
        self.objects.write().remove(&(id, kind));
        Ok(())
    }

    fn count(&self) -> Result<usize, CacheError> {
        Ok(self.objects.read().len())
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.objects.write().clear();
        Ok(())
    }

    fn about(&self) -> String {
        "in-memory cache (process-local, non-durable)".to_string()
    }
}
