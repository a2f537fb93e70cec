//! Cache store implementations
//!
//! Two backends implement both store ports: a process-local in-memory
//! store and a durable SQLite store. Entries are timestamped by the
//! session facade at insertion; the stores only promise key uniqueness
//! and last-write-wins wholesale replacement.

mod memory;
mod sqlite;

pub use memory::MemoryCache;
pub use sqlite::SqliteCache;
