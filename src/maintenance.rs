//! Maintenance jobs: consolidation, decay, deduplication, compaction.
//!
//! All jobs operate on in-store state only; none of them call the embedding
//! provider. Memories without embeddings simply never cluster. Every job
//! supports dry-run, which reports what would change without writing, and
//! each cluster or merge group commits atomically so an aborted run leaves
//! the store consistent.

use std::collections::HashSet;

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::memory::{cosine_similarity, Memory, MemoryStore};

/// Default similarity threshold for consolidation clustering.
pub const CONSOLIDATE_THRESHOLD: f32 = 0.85;

/// Default similarity threshold for duplicate detection.
pub const DEDUP_THRESHOLD: f32 = 0.95;

/// Default inactivity window for decay, in days.
pub const DECAY_DAYS: i64 = 30;

/// Default decay step in importance points.
pub const DECAY_RATE: i64 = 5;

/// Importance floor that decay never crosses.
pub const DECAY_FLOOR: i64 = 10;

/// Delimiter inserted between merged content blocks.
const CONTENT_DELIMITER: &str = "\n\n---\n";

/// Parameters for a consolidation run.
#[derive(Debug, Clone)]
pub struct ConsolidateOptions {
    /// Minimum cosine similarity to cluster two memories.
    pub threshold: f32,
    /// Report without writing.
    pub dry_run: bool,
}

impl Default for ConsolidateOptions {
    fn default() -> Self {
        Self {
            threshold: CONSOLIDATE_THRESHOLD,
            dry_run: false,
        }
    }
}

/// Parameters for a decay run.
#[derive(Debug, Clone)]
pub struct DecayOptions {
    /// Days of inactivity before a memory is eligible.
    pub days: i64,
    /// Importance points removed per run.
    pub rate: i64,
    /// Report without writing.
    pub dry_run: bool,
}

impl Default for DecayOptions {
    fn default() -> Self {
        Self {
            days: DECAY_DAYS,
            rate: DECAY_RATE,
            dry_run: false,
        }
    }
}

/// Parameters for a deduplication run.
#[derive(Debug, Clone)]
pub struct DedupOptions {
    /// Minimum cosine similarity to treat two memories as duplicates.
    pub threshold: f32,
    /// Report without writing.
    pub dry_run: bool,
}

impl Default for DedupOptions {
    fn default() -> Self {
        Self {
            threshold: DEDUP_THRESHOLD,
            dry_run: false,
        }
    }
}

/// One planned or applied consolidation cluster.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterAction {
    /// Survivor memory id.
    pub survivor_id: String,
    /// Survivor title.
    pub survivor_title: String,
    /// Ids absorbed into the survivor.
    pub absorbed_ids: Vec<String>,
}

/// Outcome of a consolidation run.
#[derive(Debug, Clone, Serialize)]
pub struct ConsolidateReport {
    /// Clusters identified.
    pub clusters_found: usize,
    /// Memories tombstoned (or that would be, under dry-run).
    pub memories_consolidated: usize,
    /// Per-cluster detail.
    pub actions: Vec<ClusterAction>,
    /// Whether this was a dry run.
    pub dry_run: bool,
}

/// Outcome of a decay run.
#[derive(Debug, Clone, Serialize)]
pub struct DecayReport {
    /// Memories whose importance dropped (or would drop).
    pub memories_decayed: usize,
    /// Step used.
    pub rate: i64,
    /// Inactivity window used.
    pub days: i64,
    /// Whether this was a dry run.
    pub dry_run: bool,
}

/// Outcome of a deduplication run.
#[derive(Debug, Clone, Serialize)]
pub struct DedupReport {
    /// Duplicate groups identified.
    pub duplicate_groups: usize,
    /// Memories tombstoned (or that would be, under dry-run).
    pub memories_merged: usize,
    /// Per-group detail.
    pub actions: Vec<ClusterAction>,
    /// Whether this was a dry run.
    pub dry_run: bool,
}

/// Outcome of a compaction run.
#[derive(Debug, Clone, Serialize)]
pub struct CompactReport {
    /// Database size before, bytes.
    pub size_before_bytes: u64,
    /// Database size after, bytes.
    pub size_after_bytes: u64,
}

/// Outcome of a full maintenance pass.
#[derive(Debug, Clone, Serialize)]
pub struct FullReport {
    pub consolidation: ConsolidateReport,
    pub decay: DecayReport,
    pub deduplication: DedupReport,
    /// Absent under dry-run; compaction has no preview.
    pub compaction: Option<CompactReport>,
}

/// Runs maintenance jobs against a memory store.
#[derive(Clone)]
pub struct MaintenanceEngine {
    store: MemoryStore,
}

impl MaintenanceEngine {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }

    /// Merge clusters of near-identical same-kind memories.
    ///
    /// Greedy single-pass clustering in importance order: each unclustered
    /// memory with an embedding seeds a cluster and pulls in every later
    /// same-kind memory whose similarity meets the threshold. The most
    /// important member survives; absorbed content is appended (delimited,
    /// skipped when already a substring) and tags are unioned. Re-running on
    /// the output is a no-op.
    #[instrument(skip(self), fields(threshold = options.threshold, dry_run = options.dry_run))]
    pub fn consolidate(&self, options: &ConsolidateOptions) -> Result<ConsolidateReport> {
        let memories = self.store.load_active(None)?;
        info!(candidates = memories.len(), "starting consolidation");

        let clusters = cluster_indices(&memories, options.threshold, true);

        let mut actions = Vec::new();
        let mut consolidated = 0usize;

        for cluster in &clusters {
            // Importance-descending load order makes the first member the survivor
            let (survivor, _) = &memories[cluster[0]];
            let absorbed: Vec<&Memory> = cluster[1..].iter().map(|&i| &memories[i].0).collect();

            let action = ClusterAction {
                survivor_id: survivor.id.clone(),
                survivor_title: survivor.title.clone(),
                absorbed_ids: absorbed.iter().map(|m| m.id.clone()).collect(),
            };
            consolidated += absorbed.len();

            if options.dry_run {
                debug!(survivor = %survivor.id, absorbed = absorbed.len(), "dry-run cluster");
                actions.push(action);
                continue;
            }

            let mut content = survivor.content.clone();
            for mem in &absorbed {
                if !content.contains(&mem.content) {
                    content.push_str(CONTENT_DELIMITER);
                    content.push_str(&mem.content);
                }
            }

            let mut tags = survivor.tags.clone();
            for mem in &absorbed {
                tags.extend(mem.tags.iter().cloned());
            }

            self.store
                .apply_consolidation(&survivor.id, &content, &tags, &action.absorbed_ids)?;
            info!(survivor = %survivor.id, absorbed = absorbed.len(), "cluster consolidated");
            actions.push(action);
        }

        Ok(ConsolidateReport {
            clusters_found: clusters.len(),
            memories_consolidated: consolidated,
            actions,
            dry_run: options.dry_run,
        })
    }

    /// Lower the importance of memories idle past the window.
    ///
    /// Eligible: active, importance above the floor, created before the
    /// cutoff, and never accessed since it. Each run subtracts the rate,
    /// clamped at the floor; memories already at the floor are untouched so
    /// repeated runs converge.
    #[instrument(skip(self), fields(days = options.days, rate = options.rate, dry_run = options.dry_run))]
    pub fn decay(&self, options: &DecayOptions) -> Result<DecayReport> {
        let cutoff = Utc::now() - Duration::days(options.days);
        let memories = self.store.load_active(None)?;

        let mut decayed = 0usize;
        for (memory, _) in &memories {
            if memory.importance <= DECAY_FLOOR {
                continue;
            }
            if memory.created_at >= cutoff {
                continue;
            }
            if let Some(accessed) = memory.accessed_at {
                if accessed >= cutoff {
                    continue;
                }
            }

            let new_importance = (memory.importance - options.rate).max(DECAY_FLOOR);
            if new_importance == memory.importance {
                continue;
            }

            debug!(id = %memory.id, from = memory.importance, to = new_importance, "decaying");
            if !options.dry_run {
                self.store.apply_decay(&memory.id, new_importance)?;
            }
            decayed += 1;
        }

        info!(decayed, "decay complete");
        Ok(DecayReport {
            memories_decayed: decayed,
            rate: options.rate,
            days: options.days,
            dry_run: options.dry_run,
        })
    }

    /// Find and merge duplicates across all kinds.
    ///
    /// Two memories are duplicates on a case-insensitive title match (works
    /// without embeddings) or when similarity meets the threshold. The
    /// highest-importance member survives (id as tie-break); links touching
    /// a duplicate are re-pointed at the survivor before it is tombstoned.
    /// Content is not merged.
    #[instrument(skip(self), fields(threshold = options.threshold, dry_run = options.dry_run))]
    pub fn deduplicate(&self, options: &DedupOptions) -> Result<DedupReport> {
        let memories = self.store.load_active(None)?;
        info!(candidates = memories.len(), "starting duplicate scan");

        let mut checked: HashSet<usize> = HashSet::new();
        let mut groups: Vec<Vec<usize>> = Vec::new();

        for i in 0..memories.len() {
            if checked.contains(&i) {
                continue;
            }
            let (mem1, vec1) = &memories[i];
            let title1 = mem1.title.to_lowercase();
            let mut group = vec![i];

            for j in (i + 1)..memories.len() {
                if checked.contains(&j) {
                    continue;
                }
                let (mem2, vec2) = &memories[j];

                // Title match is the fast path and needs no vectors
                if title1 == mem2.title.to_lowercase() {
                    group.push(j);
                    checked.insert(j);
                    continue;
                }

                let similarity = cosine_similarity(vec1.as_deref(), vec2.as_deref());
                if similarity >= options.threshold {
                    group.push(j);
                    checked.insert(j);
                }
            }

            if group.len() > 1 {
                checked.insert(i);
                groups.push(group);
            }
        }

        let mut actions = Vec::new();
        let mut merged = 0usize;

        for group in &groups {
            let mut members: Vec<&Memory> = group.iter().map(|&i| &memories[i].0).collect();
            members.sort_by(|a, b| {
                b.importance
                    .cmp(&a.importance)
                    .then(b.id.cmp(&a.id))
            });
            let survivor = members[0];
            let duplicates = &members[1..];

            let action = ClusterAction {
                survivor_id: survivor.id.clone(),
                survivor_title: survivor.title.clone(),
                absorbed_ids: duplicates.iter().map(|m| m.id.clone()).collect(),
            };
            merged += duplicates.len();

            if options.dry_run {
                actions.push(action);
                continue;
            }

            for dup in duplicates {
                self.store.apply_merge(&survivor.id, &dup.id)?;
            }
            info!(survivor = %survivor.id, merged = duplicates.len(), "duplicate group merged");
            actions.push(action);
        }

        Ok(DedupReport {
            duplicate_groups: groups.len(),
            memories_merged: merged,
            actions,
            dry_run: options.dry_run,
        })
    }

    /// Reclaim storage: VACUUM and ANALYZE. No logical data change, so
    /// there is no dry-run variant.
    #[instrument(skip(self))]
    pub fn compact(&self) -> Result<CompactReport> {
        let (size_before_bytes, size_after_bytes) = self.store.compact()?;
        info!(
            before = size_before_bytes,
            after = size_after_bytes,
            "compaction complete"
        );
        Ok(CompactReport {
            size_before_bytes,
            size_after_bytes,
        })
    }

    /// Full maintenance pass at default thresholds, in fixed order:
    /// consolidate, decay, deduplicate, compact. Dry-run skips compaction.
    #[instrument(skip(self))]
    pub fn full(&self, dry_run: bool) -> Result<FullReport> {
        let consolidation = self.consolidate(&ConsolidateOptions {
            dry_run,
            ..Default::default()
        })?;
        let decay = self.decay(&DecayOptions {
            dry_run,
            ..Default::default()
        })?;
        let deduplication = self.deduplicate(&DedupOptions {
            dry_run,
            ..Default::default()
        })?;
        let compaction = if dry_run { None } else { Some(self.compact()?) };

        Ok(FullReport {
            consolidation,
            decay,
            deduplication,
            compaction,
        })
    }
}

/// Greedy single-pass clustering over (memory, vector) pairs.
///
/// Seeds require a vector; members join the first seed they clear the
/// threshold against. With `same_kind_only`, members must share the seed's
/// kind. Only clusters with at least two members are returned.
fn cluster_indices(
    memories: &[(Memory, Option<Vec<f32>>)],
    threshold: f32,
    same_kind_only: bool,
) -> Vec<Vec<usize>> {
    let mut used: HashSet<usize> = HashSet::new();
    let mut clusters = Vec::new();

    for i in 0..memories.len() {
        if used.contains(&i) {
            continue;
        }
        let (mem1, vec1) = &memories[i];
        let Some(vec1) = vec1 else { continue };

        let mut cluster = vec![i];
        for j in (i + 1)..memories.len() {
            if used.contains(&j) {
                continue;
            }
            let (mem2, vec2) = &memories[j];
            if same_kind_only && mem2.kind != mem1.kind {
                continue;
            }
            let Some(vec2) = vec2 else { continue };

            if cosine_similarity(Some(vec1), Some(vec2)) >= threshold {
                cluster.push(j);
                used.insert(j);
            }
        }

        if cluster.len() > 1 {
            used.insert(i);
            clusters.push(cluster);
        }
    }

    clusters
}
