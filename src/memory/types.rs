//! Core types for the memory store: memories, links, sync-log entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default importance for new memories.
pub const IMPORTANCE_DEFAULT: i64 = 50;

/// Importance floor enforced by decay; memories never drop below this.
pub const IMPORTANCE_MIN: i64 = 0;

/// Maximum importance.
pub const IMPORTANCE_MAX: i64 = 100;

/// Kind of a stored memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// A product or piece of hardware/software
    Product,
    /// A company or organization
    Company,
    /// A person
    Person,
    /// An abstract concept or topic
    Concept,
    /// A decision that was made
    Decision,
    /// A document, URL, or other resource
    Resource,
    /// A free-form remembered fact
    Memory,
    /// A conversation summary
    Conversation,
}

impl MemoryKind {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Company => "company",
            Self::Person => "person",
            Self::Concept => "concept",
            Self::Decision => "decision",
            Self::Resource => "resource",
            Self::Memory => "memory",
            Self::Conversation => "conversation",
        }
    }

    /// Parse from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "product" => Some(Self::Product),
            "company" => Some(Self::Company),
            "person" => Some(Self::Person),
            "concept" => Some(Self::Concept),
            "decision" => Some(Self::Decision),
            "resource" => Some(Self::Resource),
            "memory" => Some(Self::Memory),
            "conversation" => Some(Self::Conversation),
            _ => None,
        }
    }

    /// All kinds, in declaration order.
    pub fn all() -> &'static [MemoryKind] {
        &[
            Self::Product,
            Self::Company,
            Self::Person,
            Self::Concept,
            Self::Decision,
            Self::Resource,
            Self::Memory,
            Self::Conversation,
        ]
    }
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Relation type carried by a link between two memories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    /// Generic association
    RelatedTo,
    /// Source depends on target
    DependsOn,
    /// Source implements target
    Implements,
    /// Source is part of target
    PartOf,
    /// Source supersedes target
    Supersedes,
    /// Source is used by target
    UsedBy,
    /// Source was created by target
    CreatedBy,
}

impl RelationType {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RelatedTo => "related_to",
            Self::DependsOn => "depends_on",
            Self::Implements => "implements",
            Self::PartOf => "part_of",
            Self::Supersedes => "supersedes",
            Self::UsedBy => "used_by",
            Self::CreatedBy => "created_by",
        }
    }

    /// Parse from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "related_to" => Some(Self::RelatedTo),
            "depends_on" => Some(Self::DependsOn),
            "implements" => Some(Self::Implements),
            "part_of" => Some(Self::PartOf),
            "supersedes" => Some(Self::Supersedes),
            "used_by" => Some(Self::UsedBy),
            "created_by" => Some(Self::CreatedBy),
            _ => None,
        }
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single remembered fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// Opaque unique identifier, assigned at creation.
    pub id: String,
    /// Kind of memory.
    pub kind: MemoryKind,
    /// Short title, non-empty.
    pub title: String,
    /// Free-text content, non-empty.
    pub content: String,
    /// Importance in [0, 100]; >= 70 gates automatic mirroring.
    pub importance: i64,
    /// Tags; order irrelevant, may be empty.
    pub tags: Vec<String>,
    /// Identifier of the mirrored external record, once synced.
    pub remote_ref: Option<String>,
    /// Tombstone pointer: the id of the memory this one was merged into.
    /// A memory with this set is logically dead but its row is retained.
    pub consolidated_into: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Last read-path access, if any.
    pub accessed_at: Option<DateTime<Utc>>,
    /// Last successful mirror sync, if any.
    pub synced_at: Option<DateTime<Utc>>,
}

impl Memory {
    /// True if this memory has not been consolidated away.
    pub fn is_active(&self) -> bool {
        self.consolidated_into.is_none()
    }
}

/// Partial update for a memory. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct MemoryPatch {
    /// New title, if any.
    pub title: Option<String>,
    /// New content, if any.
    pub content: Option<String>,
    /// Replacement tag set, if any.
    pub tags: Option<Vec<String>>,
    /// New importance, if any.
    pub importance: Option<i64>,
}

impl MemoryPatch {
    /// Empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the title.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the content.
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Replace the tag set.
    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    /// Set the importance.
    pub fn importance(mut self, importance: i64) -> Self {
        self.importance = Some(importance);
        self
    }

    /// True if no field is set.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.tags.is_none()
            && self.importance.is_none()
    }
}

/// Directed typed edge between two memories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    /// Surrogate link id.
    pub id: String,
    /// Source memory id.
    pub from_id: String,
    /// Target memory id.
    pub to_id: String,
    /// Relation type.
    pub relation: RelationType,
    /// Edge weight, default 1.0.
    pub weight: f64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Action recorded in the sync log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    /// Local record pushed to the mirror
    Push,
    /// Remote record pulled into the local store
    Pull,
    /// Local record deleted
    Delete,
}

impl SyncAction {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Pull => "pull",
            Self::Delete => "delete",
        }
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "push" => Some(Self::Push),
            "pull" => Some(Self::Pull),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// Outcome recorded in the sync log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Attempt succeeded
    Success,
    /// Attempt failed
    Failed,
}

impl SyncStatus {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Append-only audit record of a sync attempt. Never mutated after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncLogEntry {
    /// Row id.
    pub id: i64,
    /// Memory the attempt was about.
    pub memory_id: String,
    /// What was attempted.
    pub action: SyncAction,
    /// How it went.
    pub status: SyncStatus,
    /// Remote record id involved, if any.
    pub remote_ref: Option<String>,
    /// Free-text detail.
    pub detail: String,
    /// When the attempt was recorded.
    pub timestamp: DateTime<Utc>,
}

/// Store-level statistics.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    /// Total memory rows, tombstones included.
    pub total_memories: i64,
    /// Active (non-consolidated) memories.
    pub active_memories: i64,
    /// Active counts per kind, descending.
    pub by_kind: Vec<(MemoryKind, i64)>,
    /// Memories with a remote_ref.
    pub synced: i64,
    /// Memories currently eligible for sync.
    pub pending_sync: i64,
    /// Total link rows.
    pub total_links: i64,
    /// Total embedding rows.
    pub embeddings: i64,
    /// Most recent sync-log entries, newest first.
    pub recent_sync: Vec<SyncLogEntry>,
}

/// Generate a fresh memory id.
pub(crate) fn new_memory_id() -> String {
    format!("mem_{}", Uuid::new_v4().simple())
}

/// Generate a fresh link id.
pub(crate) fn new_link_id() -> String {
    format!("link_{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_kind_round_trip() {
        for kind in MemoryKind::all() {
            assert_eq!(MemoryKind::parse(kind.as_str()), Some(*kind));
        }
        assert_eq!(MemoryKind::parse("CONCEPT"), Some(MemoryKind::Concept));
        assert_eq!(MemoryKind::parse("ticket"), None);
    }

    #[test]
    fn test_relation_type_round_trip() {
        for s in [
            "related_to",
            "depends_on",
            "implements",
            "part_of",
            "supersedes",
            "used_by",
            "created_by",
        ] {
            let rel = RelationType::parse(s).unwrap();
            assert_eq!(rel.as_str(), s);
        }
        assert_eq!(RelationType::parse("blocks"), None);
    }

    #[test]
    fn test_patch_is_empty() {
        assert!(MemoryPatch::new().is_empty());
        assert!(!MemoryPatch::new().title("t").is_empty());
    }

    #[test]
    fn test_id_prefixes() {
        assert!(new_memory_id().starts_with("mem_"));
        assert!(new_link_id().starts_with("link_"));
    }
}
