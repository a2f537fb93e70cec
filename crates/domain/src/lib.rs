//! # Synergia Domain
//!
//! Business domain types and models for the Synergia client.
//!
//! This crate contains:
//! - Domain data types (entity identity, token state, cache entries)
//! - Domain error taxonomy and Result definitions
//! - Domain constants (upstream endpoints, wire literals)
//!
//! ## Architecture
//! - No dependencies on other workspace crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod constants;
pub mod errors;
pub mod types;

// Re-export commonly used items
pub use errors::{AuthError, CacheError, ErrorDisposition, ResolutionError, Result, TransportError};
pub use types::{EntityId, EntityKind, KindDescriptor, ObjectCacheEntry, QueryCacheEntry, TokenState};
