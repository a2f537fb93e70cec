//! Session facade
//!
//! The composition root callers use: one token ledger, one transport,
//! one query store and one object store, plus generic entity
//! construction. Every cached fetch follows the same state machine:
//!
//! `MISS → FETCH → STORE → RETURN`, `HIT-FRESH → RETURN`, or
//! `HIT-STALE → FETCH → REPLACE → RETURN`. There is no other state
//! visible to callers.
//!
//! Sessions are cheap to clone; clones share the ledger and both cache
//! stores, which is how every entity a session assembles keeps a handle
//! back to it for deferred-reference resolution.

mod endpoints;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use synergia_common::time::{Clock, SystemClock};
use synergia_core::entity::{Entity, EntitySet};
use synergia_core::ports::{EntitySource, ObjectCacheStore, QueryCacheStore};
use synergia_domain::constants::{DEFAULT_LIST_MAX_AGE_SECS, RESERVED_PAYLOAD_KEYS};
use synergia_domain::errors::{ResolutionError, Result, TransportError};
use synergia_domain::types::{EntityId, EntityKind, ObjectCacheEntry, QueryCacheEntry, TokenState};

use crate::auth::{AuthFlow, PortalClient, TokenLedger};
use crate::cache::MemoryCache;
use crate::config::ClientConfig;
use crate::transport::Transport;

/// Pick the extraction key for a payload nobody named a key for: the
/// first top-level key that is not a reserved envelope field.
///
/// This is a degraded-mode fallback; explicit keys are preferred
/// everywhere.
#[must_use]
pub fn auto_extract_key(payload: &Value) -> Option<&str> {
    payload
        .as_object()?
        .keys()
        .map(String::as_str)
        .find(|key| !RESERVED_PAYLOAD_KEYS.contains(key))
}

/// Client session bound to one authenticated identity
pub struct Session<C: Clock + Clone = SystemClock> {
    transport: Transport<C>,
    ledger: Arc<TokenLedger<C>>,
    query_cache: Arc<dyn QueryCacheStore>,
    object_cache: Arc<dyn ObjectCacheStore>,
    owner: String,
    clock: C,
}

impl<C: Clock + Clone> Clone for Session<C> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            ledger: Arc::clone(&self.ledger),
            query_cache: Arc::clone(&self.query_cache),
            object_cache: Arc::clone(&self.object_cache),
            owner: self.owner.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl Session<SystemClock> {
    /// Start building a session
    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    /// Credential login against the portal, returning a session for the
    /// first Synergia account
    pub async fn login(
        config: ClientConfig,
        email: &str,
        password: &str,
    ) -> Result<Self, TransportError> {
        let portal = PortalClient::new(config.clone())?;
        let state = portal.login_first(email, password).await?;

        Self::builder().config(config).token_state(state).auth_flow(Arc::new(portal)).build()
    }
}

impl<C: Clock + Clone + 'static> Session<C> {
    /// The token ledger owned by this session
    pub fn ledger(&self) -> &Arc<TokenLedger<C>> {
        &self.ledger
    }

    /// The raw-response cache store
    pub fn query_cache(&self) -> &Arc<dyn QueryCacheStore> {
        &self.query_cache
    }

    /// The assembled-entity cache store
    pub fn object_cache(&self) -> &Arc<dyn ObjectCacheStore> {
        &self.object_cache
    }

    /// Identity owning this session's cache entries
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub(crate) fn clock(&self) -> &C {
        &self.clock
    }

    /// This session as a fetch source for entity references
    #[must_use]
    pub fn as_source(&self) -> Arc<dyn EntitySource> {
        Arc::new(self.clone())
    }

    /// Uncached GET; surfaces transport errors untouched
    pub async fn get(&self, segments: &[&str], params: &[(&str, &str)]) -> Result<Value> {
        self.transport.get(segments, params).await
    }

    /// Uncached POST; surfaces transport errors untouched
    pub async fn post(&self, segments: &[&str], params: &[(&str, &str)]) -> Result<Value> {
        self.transport.post(segments, params).await
    }

    /// GET through the query cache.
    ///
    /// A hit younger than `max_age` is served without any network call;
    /// a stale hit is refetched and the cache entry replaced wholesale.
    pub async fn get_cached_response(
        &self,
        segments: &[&str],
        params: &[(&str, &str)],
        max_age: Duration,
    ) -> Result<Value> {
        let uri = self.transport.assemble_path(segments);
        let now = self.clock.utc_now();

        match self.query_cache.get(&uri, &self.owner)? {
            Some(entry) if !entry.is_stale(now, max_age) => {
                debug!(%uri, "query cache hit (fresh)");
                return Ok(entry.payload);
            }
            Some(_) => debug!(%uri, "query cache hit (stale), refetching"),
            None => debug!(%uri, "query cache miss"),
        }

        let payload = self.transport.get(segments, params).await?;
        self.query_cache.put(QueryCacheEntry {
            uri,
            owner: self.owner.clone(),
            payload: payload.clone(),
            last_loaded: self.clock.utc_now(),
        })?;
        Ok(payload)
    }

    /// Fetch one entity through the object cache.
    ///
    /// `max_age` of `None` uses the kind's default freshness window. On
    /// miss or staleness the entity is re-fetched from the origin and its
    /// snapshot replaces the cached one.
    pub async fn get_cached_object(
        &self,
        id: EntityId,
        kind: EntityKind,
        max_age: Option<Duration>,
    ) -> Result<Entity> {
        let max_age = max_age.unwrap_or(kind.descriptor().default_max_age);
        let now = self.clock.utc_now();

        if let Some(entry) = self.object_cache.get(id, kind)? {
            if !entry.is_stale(now, max_age) {
                debug!(%id, %kind, "object cache hit (fresh)");
                return Ok(Entity::assemble_with_id(id, kind, entry.payload, self.as_source()));
            }
            debug!(%id, %kind, "object cache hit (stale), refetching");
        }

        let entity = self.fetch_entity(id, kind, max_age).await?;
        self.object_cache.put(ObjectCacheEntry {
            id,
            kind,
            payload: entity.export_payload(),
            last_loaded: self.clock.utc_now(),
        })?;
        Ok(entity)
    }

    /// Assemble one entity from its origin endpoint
    async fn fetch_entity(
        &self,
        id: EntityId,
        kind: EntityKind,
        max_age: Duration,
    ) -> Result<Entity> {
        let descriptor = kind.descriptor();
        let id_segment = id.to_string();
        let mut segments: Vec<&str> = descriptor.path.to_vec();
        segments.push(&id_segment);

        let document = self.get_cached_response(&segments, &[], max_age).await?;

        let key = descriptor
            .extraction_key
            .or_else(|| auto_extract_key(&document))
            .ok_or_else(|| {
                TransportError::Parse(format!("response for {kind} {id} has no extraction key"))
            })?;
        let payload = document.get(key).cloned().ok_or_else(|| {
            TransportError::Parse(format!("response for {kind} {id} is missing '{key}'"))
        })?;

        Entity::assemble(kind, payload, self.as_source())
            .map_err(|e| TransportError::Parse(e.to_string()))
    }

    /// Fetch a payload and build entities out of a named key.
    ///
    /// A sequence yields [`EntitySet::Many`] in document order, a single
    /// mapping yields [`EntitySet::One`], anything else yields
    /// [`EntitySet::Empty`]. With no `extraction_key` the auto-detection
    /// heuristic picks one.
    pub async fn list_entities(
        &self,
        segments: &[&str],
        kind: EntityKind,
        extraction_key: Option<&str>,
        max_age: Option<Duration>,
        bypass_cache: bool,
    ) -> Result<EntitySet> {
        let max_age = max_age.unwrap_or(Duration::from_secs(DEFAULT_LIST_MAX_AGE_SECS));

        let document = if bypass_cache {
            self.get(segments, &[]).await?
        } else {
            self.get_cached_response(segments, &[], max_age).await?
        };

        let key = extraction_key
            .or_else(|| auto_extract_key(&document))
            .ok_or_else(|| {
                TransportError::Parse("listing payload has no detectable extraction key".into())
            })?
            .to_string();
        let extracted = document.get(&key).ok_or_else(|| {
            TransportError::Parse(format!("listing payload is missing '{key}'"))
        })?;

        match extracted {
            Value::Array(items) => {
                let mut entities = Vec::with_capacity(items.len());
                for item in items {
                    let entity = Entity::assemble(kind, item.clone(), self.as_source())
                        .map_err(|e| TransportError::Parse(e.to_string()))?;
                    entities.push(entity);
                }
                Ok(EntitySet::Many(entities))
            }
            Value::Object(_) => {
                let entity = Entity::assemble(kind, extracted.clone(), self.as_source())
                    .map_err(|e| TransportError::Parse(e.to_string()))?;
                Ok(EntitySet::One(entity))
            }
            _ => Ok(EntitySet::Empty),
        }
    }

    /// Build one entity from an arbitrary API path (cached)
    pub async fn entity_by_path(
        &self,
        segments: &[&str],
        kind: EntityKind,
        extraction_key: Option<&str>,
        max_age: Option<Duration>,
    ) -> Result<Entity> {
        let max_age = max_age.unwrap_or(kind.descriptor().default_max_age);
        let document = self.get_cached_response(segments, &[], max_age).await?;

        let key = extraction_key
            .or_else(|| auto_extract_key(&document))
            .ok_or_else(|| {
                TransportError::Parse("payload has no detectable extraction key".into())
            })?;
        let payload = document
            .get(key)
            .cloned()
            .ok_or_else(|| TransportError::Parse(format!("payload is missing '{key}'")))?;

        Entity::assemble(kind, payload, self.as_source())
            .map_err(|e| TransportError::Parse(e.to_string()))
    }
}

#[async_trait]
impl<C: Clock + Clone + 'static> EntitySource for Session<C> {
    async fn entity(
        &self,
        id: EntityId,
        kind: EntityKind,
        max_age: Option<Duration>,
    ) -> Result<Entity, ResolutionError> {
        self.get_cached_object(id, kind, max_age).await.map_err(ResolutionError::from)
    }
}

/// Builder for [`Session`]
#[derive(Default)]
pub struct SessionBuilder {
    config: Option<ClientConfig>,
    token_state: Option<TokenState>,
    flow: Option<Arc<dyn AuthFlow>>,
    query_cache: Option<Arc<dyn QueryCacheStore>>,
    object_cache: Option<Arc<dyn ObjectCacheStore>>,
}

impl SessionBuilder {
    /// Set the client configuration (defaults to [`ClientConfig::default`])
    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the token state for the authenticated identity (required)
    #[must_use]
    pub fn token_state(mut self, state: TokenState) -> Self {
        self.token_state = Some(state);
        self
    }

    /// Set the auth flow used for refreshes (defaults to a portal client
    /// built from the configuration)
    #[must_use]
    pub fn auth_flow(mut self, flow: Arc<dyn AuthFlow>) -> Self {
        self.flow = Some(flow);
        self
    }

    /// Set the raw-response cache store
    #[must_use]
    pub fn query_cache(mut self, store: Arc<dyn QueryCacheStore>) -> Self {
        self.query_cache = Some(store);
        self
    }

    /// Set the assembled-entity cache store
    #[must_use]
    pub fn object_cache(mut self, store: Arc<dyn ObjectCacheStore>) -> Self {
        self.object_cache = Some(store);
        self
    }

    /// Use one backend for both cache tables (e.g. a [`crate::SqliteCache`])
    #[must_use]
    pub fn shared_cache<S>(mut self, store: Arc<S>) -> Self
    where
        S: QueryCacheStore + ObjectCacheStore + 'static,
    {
        self.query_cache = Some(Arc::clone(&store) as Arc<dyn QueryCacheStore>);
        self.object_cache = Some(store as Arc<dyn ObjectCacheStore>);
        self
    }

    /// Build with the system clock
    pub fn build(self) -> Result<Session<SystemClock>, TransportError> {
        self.build_with_clock(SystemClock)
    }

    /// Build with a custom clock (for testing)
    pub fn build_with_clock<C: Clock + Clone>(
        self,
        clock: C,
    ) -> Result<Session<C>, TransportError> {
        let config = self.config.unwrap_or_default();
        let state = self
            .token_state
            .ok_or_else(|| TransportError::Config("token state is required".into()))?;
        let owner = state.login.clone();

        let flow = match self.flow {
            Some(flow) => flow,
            None => Arc::new(PortalClient::new(config.clone())?),
        };

        let ledger = Arc::new(TokenLedger::with_clock(state, flow, clock.clone()));
        let transport = Transport::new(&config, Arc::clone(&ledger))?;

        let (query_cache, object_cache) = match (self.query_cache, self.object_cache) {
            (Some(query), Some(object)) => (query, object),
            (query, object) => {
                let shared = Arc::new(MemoryCache::new());
                (
                    query.unwrap_or_else(|| Arc::clone(&shared) as Arc<dyn QueryCacheStore>),
                    object.unwrap_or(shared),
                )
            }
        };

        Ok(Session { transport, ledger, query_cache, object_cache, owner, clock })
    }
}
