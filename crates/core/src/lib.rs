//! # Synergia Core
//!
//! Domain services and port interfaces of the client access layer.
//!
//! This crate contains:
//! - Cache store ports implemented by `synergia-infra`
//! - The `EntitySource` fetch port the session facade implements
//! - The generic entity model: assembly, deferred references, and the
//!   per-kind relation schema
//!
//! ## Architecture
//! - Defines traits, `synergia-infra` provides implementations
//! - No I/O in this crate

pub mod entity;
pub mod ports;

pub use entity::{AssemblyError, Entity, EntityRefs, EntitySet};
pub use ports::{EntitySource, ObjectCacheStore, QueryCacheStore};
