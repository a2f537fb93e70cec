//! Deferred cross-entity references
//!
//! Each entity instance owns a registry of declared-but-not-fetched
//! relations. Declaring records only the target `(id, kind)` pair;
//! materialization happens on [`EntityRefs::resolve`], which drives the
//! [`EntitySource`] port (object cache first, origin API on miss).
//!
//! Resolution is intentionally not memoized on the owning entity: every
//! resolve re-runs the cache-backed lookup, so repeated access is cheap
//! but observably re-checks freshness.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use synergia_domain::errors::ResolutionError;
use synergia_domain::types::{EntityId, EntityKind};

use super::Entity;
use crate::ports::EntitySource;

/// A single declared relation
#[derive(Clone)]
enum RefSlot {
    /// Target known by id; fetched on resolve
    Remote { id: EntityId, kind: EntityKind },
    /// Already-known value; `None` records an explicitly absent relation
    Known(Option<Box<Entity>>),
}

/// Per-entity registry of deferred references
#[derive(Clone)]
pub struct EntityRefs {
    source: Arc<dyn EntitySource>,
    slots: HashMap<String, RefSlot>,
}

impl EntityRefs {
    /// Create an empty registry bound to a fetch source
    pub fn new(source: Arc<dyn EntitySource>) -> Self {
        Self { source, slots: HashMap::new() }
    }

    /// Record a relation without fetching it. Chainable during
    /// entity construction.
    pub fn declare(
        &mut self,
        attr: impl Into<String>,
        id: EntityId,
        kind: EntityKind,
    ) -> &mut Self {
        self.slots.insert(attr.into(), RefSlot::Remote { id, kind });
        self
    }

    /// Record an already-known value for a relation.
    ///
    /// `None` marks the relation as explicitly absent; resolving it
    /// yields `Ok(None)` instead of an error.
    pub fn declare_value(&mut self, attr: impl Into<String>, value: Option<Entity>) -> &mut Self {
        self.slots.insert(attr.into(), RefSlot::Known(value.map(Box::new)));
        self
    }

    /// Whether `attr` was declared during construction
    #[must_use]
    pub fn contains(&self, attr: &str) -> bool {
        self.slots.contains_key(attr)
    }

    /// Declared attribute names, in no particular order
    pub fn declared(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    /// Target id of a declared relation, without resolving it.
    ///
    /// Used for cheap equality and ordering. `Ok(None)` for relations
    /// declared as absent.
    pub fn id_of(&self, attr: &str) -> Result<Option<EntityId>, ResolutionError> {
        match self.slots.get(attr) {
            Some(RefSlot::Remote { id, .. }) => Ok(Some(*id)),
            Some(RefSlot::Known(value)) => Ok(value.as_ref().map(|e| e.id())),
            None => Err(ResolutionError::UnknownAttribute(attr.to_string())),
        }
    }

    /// Materialize a declared relation using the target kind's default
    /// freshness window
    pub async fn resolve(&self, attr: &str) -> Result<Option<Entity>, ResolutionError> {
        self.resolve_with_max_age(attr, None).await
    }

    /// Materialize a declared relation, bounding the acceptable snapshot
    /// age to `max_age` (`None` uses the kind default)
    pub async fn resolve_with_max_age(
        &self,
        attr: &str,
        max_age: Option<Duration>,
    ) -> Result<Option<Entity>, ResolutionError> {
        match self.slots.get(attr) {
            Some(RefSlot::Remote { id, kind }) => {
                let entity = self.source.entity(*id, *kind, max_age).await?;
                Ok(Some(entity))
            }
            Some(RefSlot::Known(value)) => Ok(value.as_deref().cloned()),
            None => Err(ResolutionError::UnknownAttribute(attr.to_string())),
        }
    }

    /// The fetch source this registry is bound to
    pub(crate) fn source(&self) -> &Arc<dyn EntitySource> {
        &self.source
    }
}

impl fmt::Debug for EntityRefs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut attrs: Vec<&str> = self.slots.keys().map(String::as_str).collect();
        attrs.sort_unstable();
        f.debug_struct("EntityRefs").field("declared", &attrs).finish_non_exhaustive()
    }
}
