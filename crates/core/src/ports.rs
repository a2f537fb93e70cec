//! Port interfaces implemented by the infrastructure crate
//!
//! The two cache stores make no assumption about persistence — memory,
//! an embedded database, or external storage — only about key uniqueness
//! and last-write-wins replacement. A miss is `Ok(None)`, never an error.

use std::time::Duration;

use async_trait::async_trait;
use synergia_domain::errors::{CacheError, ResolutionError};
use synergia_domain::types::{EntityId, EntityKind, ObjectCacheEntry, QueryCacheEntry};

use crate::entity::Entity;

/// Store for raw API responses, keyed by `(uri, owner)`
pub trait QueryCacheStore: Send + Sync {
    /// Look up a cached response; `None` on miss
    fn get(&self, uri: &str, owner: &str) -> Result<Option<QueryCacheEntry>, CacheError>;

    /// Insert or overwrite the entry for its `(uri, owner)` key.
    ///
    /// Replacement is wholesale: concurrent readers observe the old or
    /// the new entry, never a partial merge or a transient absence.
    fn put(&self, entry: QueryCacheEntry) -> Result<(), CacheError>;

    /// Drop the entry for the key, if present
    fn invalidate(&self, uri: &str, owner: &str) -> Result<(), CacheError>;

    /// Number of stored entries
    fn count(&self) -> Result<usize, CacheError>;

    /// Drop all entries
    fn clear(&self) -> Result<(), CacheError>;
}

/// Store for assembled-entity snapshots, keyed by `(id, kind)`
pub trait ObjectCacheStore: Send + Sync {
    /// Look up a cached snapshot; `None` on miss
    fn get(&self, id: EntityId, kind: EntityKind) -> Result<Option<ObjectCacheEntry>, CacheError>;

    /// Insert or overwrite the snapshot for its `(id, kind)` key
    fn put(&self, entry: ObjectCacheEntry) -> Result<(), CacheError>;

    /// Drop the snapshot for the key, if present
    fn invalidate(&self, id: EntityId, kind: EntityKind) -> Result<(), CacheError>;

    /// Number of stored snapshots
    fn count(&self) -> Result<usize, CacheError>;

    /// Drop all snapshots
    fn clear(&self) -> Result<(), CacheError>;

    /// Human-readable description of the backing implementation,
    /// for diagnostics
    fn about(&self) -> String;
}

/// Fetch port driven by deferred-reference resolution
///
/// Implemented by the session facade. Resolvers call this to materialize
/// a referenced entity: object cache first, origin API on miss.
#[async_trait]
pub trait EntitySource: Send + Sync {
    /// Fetch the entity identified by `(id, kind)`.
    ///
    /// `max_age` bounds how old a cached snapshot may be; `None` uses the
    /// kind's default freshness window.
    async fn entity(
        &self,
        id: EntityId,
        kind: EntityKind,
        max_age: Option<Duration>,
    ) -> Result<Entity, ResolutionError>;
}
