//! # brain-core
//!
//! A personal memory subsystem: a durable SQLite store of typed memories with
//! hybrid lexical + semantic retrieval, a typed link graph, maintenance jobs,
//! and bookkeeping for an external knowledge-base mirror.
//!
//! ## Core Components
//!
//! - **Memory**: Typed memories with importance, tags, and embeddings in SQLite
//! - **Search**: Hybrid scoring blending substring match with cosine similarity
//! - **Links**: Typed directed edges between memories
//! - **Maintenance**: Consolidation, decay, deduplication, compaction
//! - **Sync**: Tracks which memories are due for a mirror push
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use brain_core::{Brain, HashEmbedder, MemoryKind, SearchOptions};
//!
//! let brain = Brain::open("brain.db", Arc::new(HashEmbedder::new()))?;
//!
//! let stored = brain.remember(
//!     MemoryKind::Decision,
//!     "Use WAL mode",
//!     "journal_mode=WAL keeps readers unblocked during writes",
//!     80,
//!     &["sqlite".into()],
//! ).await?;
//!
//! let hits = brain.search("WAL", &SearchOptions::new()).await?;
//! println!("top hit: {}", hits[0].memory.title);
//! ```

pub mod brain;
pub mod embedding;
pub mod error;
pub mod links;
pub mod maintenance;
pub mod memory;
pub mod search;
pub mod sync;

// Re-exports for convenience
pub use brain::{Brain, ReindexReport, RememberOutcome};
pub use embedding::{EmbeddingProvider, HashEmbedder, OfflineProvider};
pub use error::{Error, Result};
pub use links::{LinkGraph, Neighbor, Neighborhood};
pub use maintenance::{
    CompactReport, ConsolidateOptions, ConsolidateReport, DecayOptions, DecayReport, DedupOptions,
    DedupReport, FullReport, MaintenanceEngine,
};
pub use memory::{
    Link, Memory, MemoryKind, MemoryPatch, MemoryStore, RelationType, StoreStats, SyncAction,
    SyncLogEntry, SyncStatus, IMPORTANCE_DEFAULT, IMPORTANCE_MAX, IMPORTANCE_MIN,
    SYNC_IMPORTANCE_THRESHOLD,
};
pub use search::{HybridSearch, SearchOptions, SearchResult};
pub use sync::{PendingSync, SyncBookkeeper};
