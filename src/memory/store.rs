//! SQLite-backed memory store implementation.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use crate::error::{Error, Result};
use crate::memory::codec::{decode_embedding, encode_embedding};
use crate::memory::schema::initialize_schema;
use crate::memory::types::{
    new_link_id, new_memory_id, Link, Memory, MemoryKind, MemoryPatch, RelationType, StoreStats,
    SyncAction, SyncLogEntry, SyncStatus, IMPORTANCE_MAX, IMPORTANCE_MIN,
};

/// Importance threshold at or above which a memory is mirrored.
pub const SYNC_IMPORTANCE_THRESHOLD: i64 = 70;

/// How many sync-log entries `stats` reports.
const STATS_SYNC_LOG_TAIL: usize = 5;

const MEMORY_COLUMNS: &str = "id, kind, title, content, importance, tags, remote_ref, \
     consolidated_into, created_at, updated_at, accessed_at, synced_at";

// Prefixed variant for joins against the embeddings table
const MEMORY_COLUMNS_M: &str = "m.id, m.kind, m.title, m.content, m.importance, m.tags, \
     m.remote_ref, m.consolidated_into, m.created_at, m.updated_at, m.accessed_at, m.synced_at";

/// SQLite-backed store for memories, embeddings, links, and the sync log.
///
/// Cheap to clone; clones share one connection. Designed for single-writer,
/// short-lived invocations: callers must not run two maintenance jobs against
/// the same store concurrently.
#[derive(Clone)]
pub struct MemoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl MemoryStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        // Idempotent; also (re)applies per-connection pragmas
        initialize_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| Error::Internal(format!("failed to lock connection: {e}")))?;
        f(&conn).map_err(Error::from)
    }

    // ==================== Memory Operations ====================

    /// Create a new memory and return it.
    pub fn create_memory(
        &self,
        kind: MemoryKind,
        title: &str,
        content: &str,
        importance: i64,
        tags: &[String],
    ) -> Result<Memory> {
        if title.trim().is_empty() {
            return Err(Error::validation("title must not be empty"));
        }
        if content.trim().is_empty() {
            return Err(Error::validation("content must not be empty"));
        }
        if !(IMPORTANCE_MIN..=IMPORTANCE_MAX).contains(&importance) {
            return Err(Error::validation(format!(
                "importance {importance} out of range [{IMPORTANCE_MIN}, {IMPORTANCE_MAX}]"
            )));
        }

        let now = Utc::now();
        let memory = Memory {
            id: new_memory_id(),
            kind,
            title: title.to_string(),
            content: content.to_string(),
            importance,
            tags: normalize_tags(tags),
            remote_ref: None,
            consolidated_into: None,
            created_at: now,
            updated_at: now,
            accessed_at: None,
            synced_at: None,
        };

        let tags_json = serde_json::to_string(&memory.tags)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO memories (id, kind, title, content, importance, tags,
                                       created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    memory.id,
                    memory.kind.as_str(),
                    memory.title,
                    memory.content,
                    memory.importance,
                    tags_json,
                    memory.created_at.to_rfc3339(),
                    memory.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })?;

        Ok(memory)
    }

    /// Get a memory by id, or `Error::NotFound`.
    pub fn get_memory(&self, id: &str) -> Result<Memory> {
        self.get_memory_opt(id)?
            .ok_or_else(|| Error::not_found(id))
    }

    /// Get a memory by id if it exists.
    pub fn get_memory_opt(&self, id: &str) -> Result<Option<Memory>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1"),
                params![id],
                row_to_memory,
            )
            .optional()
        })
    }

    /// Apply a partial update; bumps `updated_at`.
    pub fn update_memory(&self, id: &str, patch: &MemoryPatch) -> Result<Memory> {
        let mut memory = self.get_memory(id)?;

        if let Some(ref title) = patch.title {
            if title.trim().is_empty() {
                return Err(Error::validation("title must not be empty"));
            }
            memory.title = title.clone();
        }
        if let Some(ref content) = patch.content {
            if content.trim().is_empty() {
                return Err(Error::validation("content must not be empty"));
            }
            memory.content = content.clone();
        }
        if let Some(ref tags) = patch.tags {
            memory.tags = normalize_tags(tags);
        }
        if let Some(importance) = patch.importance {
            if !(IMPORTANCE_MIN..=IMPORTANCE_MAX).contains(&importance) {
                return Err(Error::validation(format!(
                    "importance {importance} out of range [{IMPORTANCE_MIN}, {IMPORTANCE_MAX}]"
                )));
            }
            memory.importance = importance;
        }
        memory.updated_at = Utc::now();

        let tags_json = serde_json::to_string(&memory.tags)?;
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE memories SET title = ?2, content = ?3, tags = ?4, importance = ?5,
                                     updated_at = ?6
                 WHERE id = ?1",
                params![
                    memory.id,
                    memory.title,
                    memory.content,
                    tags_json,
                    memory.importance,
                    memory.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })?;

        Ok(memory)
    }

    /// Refresh `accessed_at` (read-path access tracking).
    pub fn touch(&self, id: &str) -> Result<()> {
        let rows = self.with_conn(|conn| {
            conn.execute(
                "UPDATE memories SET accessed_at = ?2 WHERE id = ?1",
                params![id, Utc::now().to_rfc3339()],
            )
        })?;
        if rows == 0 {
            return Err(Error::not_found(id));
        }
        Ok(())
    }

    /// Hard delete. Cascades to the embedding and any incident links.
    pub fn delete_memory(&self, id: &str) -> Result<()> {
        let rows =
            self.with_conn(|conn| conn.execute("DELETE FROM memories WHERE id = ?1", params![id]))?;
        if rows == 0 {
            return Err(Error::not_found(id));
        }
        Ok(())
    }

    // ==================== Embedding Operations ====================

    /// Insert or replace the embedding for a memory.
    pub fn upsert_embedding(&self, id: &str, vector: &[f32], model: &str) -> Result<()> {
        if self.get_memory_opt(id)?.is_none() {
            return Err(Error::not_found(id));
        }

        let blob = encode_embedding(vector);
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO embeddings (memory_id, vector, model, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, blob, model, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
    }

    /// Fetch a memory's embedding vector, if it has one.
    ///
    /// A malformed blob is surfaced as `Error::Codec`.
    pub fn get_embedding(&self, id: &str) -> Result<Option<Vec<f32>>> {
        let blob: Option<Vec<u8>> = self.with_conn(|conn| {
            conn.query_row(
                "SELECT vector FROM embeddings WHERE memory_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
        })?;

        blob.map(|b| decode_embedding(&b)).transpose()
    }

    /// Count of embedding rows.
    pub fn embedding_count(&self) -> Result<i64> {
        self.with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM embeddings", [], |r| r.get(0)))
    }

    // ==================== Link Operations ====================

    /// Create (or upsert) a link. With `bidirectional` a reverse edge is
    /// created as an independent row.
    ///
    /// Fails with `Error::NotFound` if either endpoint does not exist.
    pub fn create_link(
        &self,
        from_id: &str,
        to_id: &str,
        relation: RelationType,
        bidirectional: bool,
    ) -> Result<Link> {
        if self.get_memory_opt(from_id)?.is_none() {
            return Err(Error::not_found(from_id));
        }
        if self.get_memory_opt(to_id)?.is_none() {
            return Err(Error::not_found(to_id));
        }

        let now = Utc::now();
        let link = Link {
            id: new_link_id(),
            from_id: from_id.to_string(),
            to_id: to_id.to_string(),
            relation,
            weight: 1.0,
            created_at: now,
        };

        self.with_conn(|conn| {
            // INSERT OR REPLACE keeps at most one row per (from, to, relation)
            conn.execute(
                "INSERT OR REPLACE INTO links (id, from_id, to_id, relation_type, weight, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    link.id,
                    link.from_id,
                    link.to_id,
                    link.relation.as_str(),
                    link.weight,
                    now.to_rfc3339(),
                ],
            )?;

            if bidirectional {
                conn.execute(
                    "INSERT OR REPLACE INTO links (id, from_id, to_id, relation_type, weight, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        new_link_id(),
                        link.to_id,
                        link.from_id,
                        link.relation.as_str(),
                        link.weight,
                        now.to_rfc3339(),
                    ],
                )?;
            }
            Ok(())
        })?;

        Ok(link)
    }

    /// All links touching a memory: (outgoing, incoming).
    pub fn links_for(&self, id: &str) -> Result<(Vec<Link>, Vec<Link>)> {
        let outgoing = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, from_id, to_id, relation_type, weight, created_at
                 FROM links WHERE from_id = ?1 ORDER BY created_at",
            )?;
            let links = stmt
                .query_map(params![id], row_to_link)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(links)
        })?;

        let incoming = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, from_id, to_id, relation_type, weight, created_at
                 FROM links WHERE to_id = ?1 ORDER BY created_at",
            )?;
            let links = stmt
                .query_map(params![id], row_to_link)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(links)
        })?;

        Ok((outgoing, incoming))
    }

    /// Count of link rows.
    pub fn link_count(&self) -> Result<i64> {
        self.with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM links", [], |r| r.get(0)))
    }

    // ==================== Sync Bookkeeping ====================

    /// Append a sync-log entry. The log is never mutated after insertion.
    pub fn record_sync_attempt(
        &self,
        memory_id: &str,
        action: SyncAction,
        status: SyncStatus,
        remote_ref: Option<&str>,
        detail: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sync_log (memory_id, action, status, remote_ref, detail, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    memory_id,
                    action.as_str(),
                    status.as_str(),
                    remote_ref,
                    detail,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Most recent sync-log entries, newest first.
    pub fn recent_sync_log(&self, limit: usize) -> Result<Vec<SyncLogEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, memory_id, action, status, remote_ref, detail, timestamp
                 FROM sync_log ORDER BY id DESC LIMIT ?1",
            )?;
            let entries = stmt
                .query_map(params![limit as i64], row_to_sync_entry)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(entries)
        })
    }

    /// Memories awaiting a push: high importance, never synced or stale.
    pub fn pending_sync(&self) -> Result<Vec<Memory>> {
        let candidates = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MEMORY_COLUMNS} FROM memories
                 WHERE importance >= ?1 ORDER BY importance DESC, id"
            ))?;
            let memories = stmt
                .query_map(params![SYNC_IMPORTANCE_THRESHOLD], row_to_memory)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(memories)
        })?;

        Ok(candidates
            .into_iter()
            .filter(|m| match (&m.remote_ref, m.synced_at) {
                (None, _) => true,
                (Some(_), None) => true,
                (Some(_), Some(synced_at)) => m.updated_at > synced_at,
            })
            .collect())
    }

    /// Record a successful mirror push on the memory row itself.
    pub fn set_synced(&self, id: &str, remote_ref: &str) -> Result<()> {
        let rows = self.with_conn(|conn| {
            conn.execute(
                "UPDATE memories SET remote_ref = ?2, synced_at = ?3 WHERE id = ?1",
                params![id, remote_ref, Utc::now().to_rfc3339()],
            )
        })?;
        if rows == 0 {
            return Err(Error::not_found(id));
        }
        Ok(())
    }

    // ==================== Batch Loaders ====================

    /// All non-consolidated memories with their decoded embeddings, ordered
    /// by importance descending (id ascending as tie-break).
    ///
    /// Malformed embedding blobs are logged and treated as absent.
    pub fn load_active(
        &self,
        kind: Option<MemoryKind>,
    ) -> Result<Vec<(Memory, Option<Vec<f32>>)>> {
        let rows = self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MEMORY_COLUMNS_M}, e.vector
                 FROM memories m LEFT JOIN embeddings e ON m.id = e.memory_id
                 WHERE m.consolidated_into IS NULL {}
                 ORDER BY m.importance DESC, m.id",
                if kind.is_some() { "AND m.kind = ?1" } else { "" }
            );
            let mut stmt = conn.prepare(&sql)?;
            let mapper = |row: &rusqlite::Row<'_>| {
                let memory = row_to_memory(row)?;
                let blob: Option<Vec<u8>> = row.get(12)?;
                Ok((memory, blob))
            };
            let rows = match kind {
                Some(k) => stmt.query_map(params![k.as_str()], mapper)?,
                None => stmt.query_map([], mapper)?,
            }
            .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        Ok(rows
            .into_iter()
            .map(|(memory, blob)| {
                let vector = blob.and_then(|b| match decode_embedding(&b) {
                    Ok(v) => Some(v),
                    Err(e) => {
                        warn!(memory_id = %memory.id, error = %e, "dropping malformed embedding");
                        None
                    }
                });
                (memory, vector)
            })
            .collect())
    }

    /// Candidate set for hybrid search: active memories matching the query
    /// substring lexically (title, content, or tag serialization) or holding
    /// an embedding.
    pub fn search_candidates(
        &self,
        query: &str,
        kind: Option<MemoryKind>,
    ) -> Result<Vec<(Memory, Option<Vec<f32>>)>> {
        let pattern = format!("%{}%", query.to_lowercase());
        let rows = self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MEMORY_COLUMNS_M}, e.vector
                 FROM memories m LEFT JOIN embeddings e ON m.id = e.memory_id
                 WHERE m.consolidated_into IS NULL
                   AND (lower(m.title) LIKE ?1 OR lower(m.content) LIKE ?1
                        OR lower(m.tags) LIKE ?1 OR e.vector IS NOT NULL) {}",
                if kind.is_some() { "AND m.kind = ?2" } else { "" }
            );
            let mut stmt = conn.prepare(&sql)?;
            let mapper = |row: &rusqlite::Row<'_>| {
                let memory = row_to_memory(row)?;
                let blob: Option<Vec<u8>> = row.get(12)?;
                Ok((memory, blob))
            };
            let rows = match kind {
                Some(k) => stmt.query_map(params![pattern, k.as_str()], mapper)?,
                None => stmt.query_map(params![pattern], mapper)?,
            }
            .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        Ok(rows
            .into_iter()
            .map(|(memory, blob)| {
                let vector = blob.and_then(|b| match decode_embedding(&b) {
                    Ok(v) => Some(v),
                    Err(e) => {
                        warn!(memory_id = %memory.id, error = %e, "dropping malformed embedding");
                        None
                    }
                });
                (memory, vector)
            })
            .collect())
    }

    // ==================== Maintenance Writes ====================
    //
    // Each of these commits atomically so an aborted maintenance run leaves
    // the store valid and re-scannable.

    /// Lower a memory's importance (decay step). Single-row atomic update.
    pub fn apply_decay(&self, id: &str, new_importance: i64) -> Result<()> {
        let rows = self.with_conn(|conn| {
            conn.execute(
                "UPDATE memories SET importance = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, new_importance, Utc::now().to_rfc3339()],
            )
        })?;
        if rows == 0 {
            return Err(Error::not_found(id));
        }
        Ok(())
    }

    /// Commit one consolidation cluster: update the survivor's content and
    /// tags, tombstone every absorbed memory. One transaction.
    pub fn apply_consolidation(
        &self,
        survivor_id: &str,
        content: &str,
        tags: &[String],
        absorbed_ids: &[String],
    ) -> Result<()> {
        let tags_json = serde_json::to_string(&normalize_tags(tags))?;
        let now = Utc::now().to_rfc3339();

        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "UPDATE memories SET content = ?2, tags = ?3, updated_at = ?4 WHERE id = ?1",
                params![survivor_id, content, tags_json, now],
            )?;
            for absorbed in absorbed_ids {
                tx.execute(
                    "UPDATE memories SET consolidated_into = ?2, updated_at = ?3 WHERE id = ?1",
                    params![absorbed, survivor_id, now],
                )?;
            }
            tx.commit()
        })
    }

    /// Commit one deduplication merge: re-point every link touching the
    /// duplicate to the survivor (collisions resolve via the triple-upsert
    /// rule), then tombstone the duplicate. One transaction.
    pub fn apply_merge(&self, survivor_id: &str, duplicate_id: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "UPDATE OR REPLACE links SET to_id = ?1 WHERE to_id = ?2",
                params![survivor_id, duplicate_id],
            )?;
            tx.execute(
                "UPDATE OR REPLACE links SET from_id = ?1 WHERE from_id = ?2",
                params![survivor_id, duplicate_id],
            )?;
            tx.execute(
                "UPDATE memories SET consolidated_into = ?2, updated_at = ?3 WHERE id = ?1",
                params![duplicate_id, survivor_id, now],
            )?;
            tx.commit()
        })
    }

    /// Storage-level reclamation: VACUUM + ANALYZE. Returns
    /// (bytes before, bytes after). No logical data change.
    pub fn compact(&self) -> Result<(u64, u64)> {
        self.with_conn(|conn| {
            let size_before = db_size_bytes(conn)?;
            conn.execute_batch("VACUUM; ANALYZE;")?;
            let size_after = db_size_bytes(conn)?;
            Ok((size_before, size_after))
        })
    }

    // ==================== Statistics ====================

    /// Store-level statistics.
    pub fn stats(&self) -> Result<StoreStats> {
        let pending = self.pending_sync()?.len() as i64;
        let recent_sync = self.recent_sync_log(STATS_SYNC_LOG_TAIL)?;

        self.with_conn(|conn| {
            let total_memories: i64 =
                conn.query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))?;
            let active_memories: i64 = conn.query_row(
                "SELECT COUNT(*) FROM memories WHERE consolidated_into IS NULL",
                [],
                |r| r.get(0),
            )?;
            let synced: i64 = conn.query_row(
                "SELECT COUNT(*) FROM memories WHERE remote_ref IS NOT NULL",
                [],
                |r| r.get(0),
            )?;
            let total_links: i64 =
                conn.query_row("SELECT COUNT(*) FROM links", [], |r| r.get(0))?;
            let embeddings: i64 =
                conn.query_row("SELECT COUNT(*) FROM embeddings", [], |r| r.get(0))?;

            let by_kind = {
                let mut stmt = conn.prepare(
                    "SELECT kind, COUNT(*) FROM memories
                     WHERE consolidated_into IS NULL
                     GROUP BY kind ORDER BY COUNT(*) DESC",
                )?;
                let rows = stmt.query_map([], |row| {
                    let kind_str: String = row.get(0)?;
                    let count: i64 = row.get(1)?;
                    Ok((kind_str, count))
                })?;
                rows.filter_map(|r| r.ok())
                    .filter_map(|(s, c)| MemoryKind::parse(&s).map(|k| (k, c)))
                    .collect()
            };

            Ok(StoreStats {
                total_memories,
                active_memories,
                by_kind,
                synced,
                pending_sync: pending,
                total_links,
                embeddings,
                recent_sync,
            })
        })
    }

    /// Backdate a memory's timestamps. Test-only hook for decay scenarios.
    #[cfg(test)]
    pub(crate) fn backdate(
        &self,
        id: &str,
        created_at: DateTime<Utc>,
        accessed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE memories SET created_at = ?2, accessed_at = ?3 WHERE id = ?1",
                params![
                    id,
                    created_at.to_rfc3339(),
                    accessed_at.map(|t| t.to_rfc3339()),
                ],
            )?;
            Ok(())
        })
    }
}

// ==================== Row Mapping ====================

fn row_to_memory(row: &rusqlite::Row<'_>) -> rusqlite::Result<Memory> {
    let kind_str: String = row.get(1)?;
    let tags_json: String = row.get(5)?;

    Ok(Memory {
        id: row.get(0)?,
        kind: MemoryKind::parse(&kind_str).unwrap_or(MemoryKind::Memory),
        title: row.get(2)?,
        content: row.get(3)?,
        importance: row.get(4)?,
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        remote_ref: row.get(6)?,
        consolidated_into: row.get(7)?,
        created_at: parse_datetime(row.get::<_, String>(8)?),
        updated_at: parse_datetime(row.get::<_, String>(9)?),
        accessed_at: row.get::<_, Option<String>>(10)?.map(parse_datetime),
        synced_at: row.get::<_, Option<String>>(11)?.map(parse_datetime),
    })
}

fn row_to_link(row: &rusqlite::Row<'_>) -> rusqlite::Result<Link> {
    let relation_str: String = row.get(3)?;

    Ok(Link {
        id: row.get(0)?,
        from_id: row.get(1)?,
        to_id: row.get(2)?,
        relation: RelationType::parse(&relation_str).unwrap_or(RelationType::RelatedTo),
        weight: row.get(4)?,
        created_at: parse_datetime(row.get::<_, String>(5)?),
    })
}

fn row_to_sync_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncLogEntry> {
    let action_str: String = row.get(2)?;
    let status_str: String = row.get(3)?;

    Ok(SyncLogEntry {
        id: row.get(0)?,
        memory_id: row.get(1)?,
        action: SyncAction::parse(&action_str).unwrap_or(SyncAction::Push),
        status: SyncStatus::parse(&status_str).unwrap_or(SyncStatus::Failed),
        remote_ref: row.get(4)?,
        detail: row.get(5)?,
        timestamp: parse_datetime(row.get::<_, String>(6)?),
    })
}

fn db_size_bytes(conn: &Connection) -> rusqlite::Result<u64> {
    let page_count: u64 = conn.pragma_query_value(None, "page_count", |row| row.get(0))?;
    let page_size: u64 = conn.pragma_query_value(None, "page_size", |row| row.get(0))?;
    Ok(page_count * page_size)
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Deduplicate and sort tags, dropping empties; tag order is irrelevant so
/// a canonical order keeps unions stable across runs.
fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = tags
        .iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn store() -> MemoryStore {
        MemoryStore::in_memory().unwrap()
    }

    fn tags(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_create_and_get_memory() {
        let store = store();
        let m = store
            .create_memory(
                MemoryKind::Concept,
                "TLS cert renewal",
                "Renew via acme.sh on vps-2",
                80,
                &tags(&["infra", "tls"]),
            )
            .unwrap();

        let fetched = store.get_memory(&m.id).unwrap();
        assert_eq!(fetched.title, "TLS cert renewal");
        assert_eq!(fetched.kind, MemoryKind::Concept);
        assert_eq!(fetched.importance, 80);
        assert_eq!(fetched.tags, tags(&["infra", "tls"]));
        assert!(fetched.remote_ref.is_none());
        assert!(fetched.is_active());
    }

    #[test]
    fn test_create_memory_validation() {
        let store = store();

        let err = store
            .create_memory(MemoryKind::Concept, "", "content", 50, &[])
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = store
            .create_memory(MemoryKind::Concept, "title", "  ", 50, &[])
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = store
            .create_memory(MemoryKind::Concept, "title", "content", 101, &[])
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_get_missing_memory() {
        let store = store();
        let err = store.get_memory("mem_missing").unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_update_memory_patch() {
        let store = store();
        let m = store
            .create_memory(MemoryKind::Person, "Alice", "Works at Acme", 50, &[])
            .unwrap();

        let updated = store
            .update_memory(
                &m.id,
                &MemoryPatch::new().content("Works at TechCo").importance(60),
            )
            .unwrap();

        assert_eq!(updated.content, "Works at TechCo");
        assert_eq!(updated.importance, 60);
        assert_eq!(updated.title, "Alice");
        assert!(updated.updated_at >= m.updated_at);

        let err = store
            .update_memory("mem_missing", &MemoryPatch::new().title("x"))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_delete_cascades_to_embedding_and_links() {
        let store = store();
        let a = store
            .create_memory(MemoryKind::Product, "Net2", "Access control", 50, &[])
            .unwrap();
        let b = store
            .create_memory(MemoryKind::Company, "Paxton", "Vendor", 50, &[])
            .unwrap();

        store.upsert_embedding(&a.id, &[1.0, 0.0], "test-model").unwrap();
        store
            .create_link(&a.id, &b.id, RelationType::CreatedBy, false)
            .unwrap();
        store
            .create_link(&b.id, &a.id, RelationType::RelatedTo, false)
            .unwrap();

        store.delete_memory(&a.id).unwrap();

        assert!(store.get_memory_opt(&a.id).unwrap().is_none());
        assert_eq!(store.embedding_count().unwrap(), 0);
        assert_eq!(store.link_count().unwrap(), 0);
        // The other endpoint survives
        assert!(store.get_memory_opt(&b.id).unwrap().is_some());
    }

    #[test]
    fn test_upsert_embedding_replaces() {
        let store = store();
        let m = store
            .create_memory(MemoryKind::Concept, "t", "c", 50, &[])
            .unwrap();

        store.upsert_embedding(&m.id, &[1.0, 2.0], "model-a").unwrap();
        store.upsert_embedding(&m.id, &[3.0, 4.0], "model-b").unwrap();

        assert_eq!(store.get_embedding(&m.id).unwrap(), Some(vec![3.0, 4.0]));
        assert_eq!(store.embedding_count().unwrap(), 1);
    }

    #[test]
    fn test_upsert_embedding_unknown_memory() {
        let store = store();
        let err = store
            .upsert_embedding("mem_missing", &[1.0], "m")
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_link_upsert_single_row() {
        let store = store();
        let a = store
            .create_memory(MemoryKind::Concept, "A", "a", 50, &[])
            .unwrap();
        let b = store
            .create_memory(MemoryKind::Concept, "B", "b", 50, &[])
            .unwrap();

        store
            .create_link(&a.id, &b.id, RelationType::RelatedTo, false)
            .unwrap();
        store
            .create_link(&a.id, &b.id, RelationType::RelatedTo, false)
            .unwrap();

        assert_eq!(store.link_count().unwrap(), 1);

        // Distinct relation type is a distinct edge
        store
            .create_link(&a.id, &b.id, RelationType::DependsOn, false)
            .unwrap();
        assert_eq!(store.link_count().unwrap(), 2);
    }

    #[test]
    fn test_bidirectional_link_creates_two_rows() {
        let store = store();
        let a = store
            .create_memory(MemoryKind::Concept, "A", "a", 50, &[])
            .unwrap();
        let b = store
            .create_memory(MemoryKind::Concept, "B", "b", 50, &[])
            .unwrap();

        store
            .create_link(&a.id, &b.id, RelationType::RelatedTo, true)
            .unwrap();

        assert_eq!(store.link_count().unwrap(), 2);
        let (outgoing, incoming) = store.links_for(&a.id).unwrap();
        assert_eq!(outgoing.len(), 1);
        assert_eq!(incoming.len(), 1);
        assert_eq!(outgoing[0].to_id, b.id);
        assert_eq!(incoming[0].from_id, b.id);
    }

    #[test]
    fn test_link_requires_existing_endpoints() {
        let store = store();
        let a = store
            .create_memory(MemoryKind::Concept, "A", "a", 50, &[])
            .unwrap();

        let err = store
            .create_link(&a.id, "mem_missing", RelationType::RelatedTo, false)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_sync_log_append_only() {
        let store = store();
        let m = store
            .create_memory(MemoryKind::Concept, "t", "c", 50, &[])
            .unwrap();

        store
            .record_sync_attempt(&m.id, SyncAction::Push, SyncStatus::Failed, None, "timeout")
            .unwrap();
        store
            .record_sync_attempt(
                &m.id,
                SyncAction::Push,
                SyncStatus::Success,
                Some("kb_123"),
                "pushed",
            )
            .unwrap();

        let log = store.recent_sync_log(10).unwrap();
        assert_eq!(log.len(), 2);
        // Newest first
        assert_eq!(log[0].status, SyncStatus::Success);
        assert_eq!(log[0].remote_ref.as_deref(), Some("kb_123"));
        assert_eq!(log[1].status, SyncStatus::Failed);
    }

    #[test]
    fn test_touch_sets_accessed_at() {
        let store = store();
        let m = store
            .create_memory(MemoryKind::Concept, "t", "c", 50, &[])
            .unwrap();
        assert!(m.accessed_at.is_none());

        store.touch(&m.id).unwrap();
        assert!(store.get_memory(&m.id).unwrap().accessed_at.is_some());
    }

    #[test]
    fn test_load_active_excludes_tombstones() {
        let store = store();
        let a = store
            .create_memory(MemoryKind::Concept, "A", "a", 90, &[])
            .unwrap();
        let b = store
            .create_memory(MemoryKind::Concept, "B", "b", 30, &[])
            .unwrap();
        store.apply_merge(&a.id, &b.id).unwrap();

        let active = store.load_active(None).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].0.id, a.id);
    }

    #[test]
    fn test_load_active_orders_by_importance() {
        let store = store();
        store
            .create_memory(MemoryKind::Concept, "low", "c", 10, &[])
            .unwrap();
        store
            .create_memory(MemoryKind::Concept, "high", "c", 90, &[])
            .unwrap();
        store
            .create_memory(MemoryKind::Concept, "mid", "c", 50, &[])
            .unwrap();

        let active = store.load_active(None).unwrap();
        let titles: Vec<&str> = active.iter().map(|(m, _)| m.title.as_str()).collect();
        assert_eq!(titles, vec!["high", "mid", "low"]);
    }

    #[test]
    fn test_stats_counts() {
        let store = store();
        let a = store
            .create_memory(MemoryKind::Concept, "A", "a", 80, &[])
            .unwrap();
        let b = store
            .create_memory(MemoryKind::Person, "B", "b", 50, &[])
            .unwrap();
        store.upsert_embedding(&a.id, &[1.0], "m").unwrap();
        store
            .create_link(&a.id, &b.id, RelationType::RelatedTo, false)
            .unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_memories, 2);
        assert_eq!(stats.active_memories, 2);
        assert_eq!(stats.total_links, 1);
        assert_eq!(stats.embeddings, 1);
        assert_eq!(stats.pending_sync, 1);
        assert_eq!(stats.synced, 0);
    }

    #[test]
    fn test_open_on_disk_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brain.db");

        let id = {
            let store = MemoryStore::open(&path).unwrap();
            store
                .create_memory(MemoryKind::Decision, "Use WAL", "journal_mode=WAL", 70, &[])
                .unwrap()
                .id
        };

        let store = MemoryStore::open(&path).unwrap();
        assert_eq!(store.get_memory(&id).unwrap().title, "Use WAL");
    }
}
