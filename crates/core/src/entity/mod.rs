//! Generic entity model
//!
//! An [`Entity`] is an immutable snapshot assembled from one API payload,
//! identified by `(id, kind)`. Entities carry their raw payload, a set of
//! deferred references declared at assembly time, and nothing else —
//! per-kind typed field views are a consumer concern.
//!
//! Entities form a directed graph keyed by `(id, kind)` pairs whose edges
//! are deferred references. The graph is never materialized in full:
//! relation access fetches one node at a time, which is what keeps cyclic
//! relations (grade ↔ subject ↔ category) from expanding without bound.

mod refs;
mod schema;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::trace;

use synergia_domain::errors::ResolutionError;
use synergia_domain::types::{EntityId, EntityKind};

use crate::ports::EntitySource;

pub use refs::EntityRefs;

/// Error produced by entity assembly
#[derive(Debug, Error)]
pub enum AssemblyError {
    /// The payload carries no usable `Id` field
    #[error("cannot assemble {0} entity: payload has no usable Id field")]
    MissingId(EntityKind),
}

/// An immutable, typed snapshot of one remote object
#[derive(Debug, Clone)]
pub struct Entity {
    id: EntityId,
    kind: EntityKind,
    payload: Value,
    refs: EntityRefs,
}

impl Entity {
    /// Assemble an entity from a raw payload.
    ///
    /// Reads the payload's `Id` and declares the kind's relations on the
    /// reference registry. The payload is stored as-is; no fields are
    /// stripped or coerced.
    pub fn assemble(
        kind: EntityKind,
        payload: Value,
        source: Arc<dyn EntitySource>,
    ) -> Result<Self, AssemblyError> {
        let id = EntityId::from_payload(&payload).ok_or(AssemblyError::MissingId(kind))?;
        Ok(Self::assemble_with_id(id, kind, payload, source))
    }

    /// Assemble an entity under an explicit id.
    ///
    /// Used for the handful of payloads that carry no `Id` of their own
    /// (the weekly timetable matrix).
    pub fn assemble_with_id(
        id: EntityId,
        kind: EntityKind,
        payload: Value,
        source: Arc<dyn EntitySource>,
    ) -> Self {
        let mut refs = EntityRefs::new(source);
        schema::declare_relations(kind, &payload, &mut refs);
        trace!(%id, %kind, "assembled entity");
        Self { id, kind, payload, refs }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// The raw payload this entity was assembled from
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Clone of the raw payload, for storing into the object cache
    #[must_use]
    pub fn export_payload(&self) -> Value {
        self.payload.clone()
    }

    /// The deferred-reference registry
    pub fn refs(&self) -> &EntityRefs {
        &self.refs
    }

    /// Materialize a declared relation (kind-default freshness window)
    pub async fn resolve(&self, attr: &str) -> Result<Option<Entity>, ResolutionError> {
        self.refs.resolve(attr).await
    }

    /// Materialize a declared relation with an explicit freshness bound
    pub async fn resolve_with_max_age(
        &self,
        attr: &str,
        max_age: Option<Duration>,
    ) -> Result<Option<Entity>, ResolutionError> {
        self.refs.resolve_with_max_age(attr, max_age).await
    }

    /// Target id of a declared relation, without fetching
    pub fn related_id(&self, attr: &str) -> Result<Option<EntityId>, ResolutionError> {
        self.refs.id_of(attr)
    }

    /// String field straight off the payload
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// Integer field straight off the payload
    pub fn i64_field(&self, key: &str) -> Option<i64> {
        self.payload.get(key).and_then(Value::as_i64)
    }

    /// Boolean field straight off the payload
    pub fn bool_field(&self, key: &str) -> Option<bool> {
        self.payload.get(key).and_then(Value::as_bool)
    }

    /// The fetch source the entity's references are bound to
    pub fn source(&self) -> Arc<dyn EntitySource> {
        Arc::clone(self.refs.source())
    }
}

/// Result of a listing extraction
///
/// A listing payload may hold a sequence of entities, a single mapping,
/// or neither.
#[derive(Debug, Clone)]
pub enum EntitySet {
    /// The extracted value was neither a sequence nor a mapping
    Empty,
    /// The extracted value was a single mapping
    One(Entity),
    /// The extracted value was a sequence, kept in document order
    Many(Vec<Entity>),
}

impl EntitySet {
    pub fn len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::One(_) => 1,
            Self::Many(entities) => entities.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flatten into a vector, preserving document order
    #[must_use]
    pub fn into_vec(self) -> Vec<Entity> {
        match self {
            Self::Empty => Vec::new(),
            Self::One(entity) => vec![entity],
            Self::Many(entities) => entities,
        }
    }

    /// The single entity, if the set holds exactly one
    #[must_use]
    pub fn single(self) -> Option<Entity> {
        match self {
            Self::One(entity) => Some(entity),
            _ => None,
        }
    }
}
