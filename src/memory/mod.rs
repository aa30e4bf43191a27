//! Durable memory storage over SQLite.
//!
//! The memory module provides the persistent substrate for the brain: typed
//! memories with importance and tags, one optional embedding per memory, a
//! typed link graph, and an append-only sync audit log.
//!
//! ## Example
//!
//! ```rust,ignore
//! use brain_core::memory::{MemoryKind, MemoryStore, RelationType};
//!
//! let store = MemoryStore::open("brain.db")?;
//!
//! let net2 = store.create_memory(
//!     MemoryKind::Product,
//!     "Net2 access control",
//!     "Door controller line, TCP on port 8025",
//!     80,
//!     &["paxton".into()],
//! )?;
//!
//! let paxton = store.create_memory(
//!     MemoryKind::Company, "Paxton", "UK access-control vendor", 60, &[],
//! )?;
//!
//! store.create_link(&net2.id, &paxton.id, RelationType::CreatedBy, false)?;
//! ```

pub mod codec;
mod schema;
mod store;
mod types;

pub use codec::{cosine_similarity, decode_embedding, encode_embedding};
pub use schema::{get_schema_version, initialize_schema, is_initialized, SCHEMA_VERSION};
pub use store::{MemoryStore, SYNC_IMPORTANCE_THRESHOLD};
pub use types::{
    Link, Memory, MemoryKind, MemoryPatch, RelationType, StoreStats, SyncAction, SyncLogEntry,
    SyncStatus, IMPORTANCE_DEFAULT, IMPORTANCE_MAX, IMPORTANCE_MIN,
};
