//! Typed link graph over stored memories.
//!
//! Thin view over the store's link table: creation with endpoint validation
//! and a neighborhood query that resolves endpoint titles for display.

use serde::Serialize;

use crate::error::Result;
use crate::memory::{Link, MemoryStore, RelationType};

/// An edge with its far endpoint resolved for display.
#[derive(Debug, Clone, Serialize)]
pub struct Neighbor {
    /// The underlying edge.
    pub link: Link,
    /// Id of the memory on the other end.
    pub other_id: String,
    /// Title of the memory on the other end.
    pub other_title: String,
}

/// A memory's immediate link neighborhood.
#[derive(Debug, Clone, Serialize)]
pub struct Neighborhood {
    /// Edges leaving this memory.
    pub outgoing: Vec<Neighbor>,
    /// Edges arriving at this memory.
    pub incoming: Vec<Neighbor>,
}

impl Neighborhood {
    /// Total edge count, both directions.
    pub fn len(&self) -> usize {
        self.outgoing.len() + self.incoming.len()
    }

    /// True if the memory has no links.
    pub fn is_empty(&self) -> bool {
        self.outgoing.is_empty() && self.incoming.is_empty()
    }
}

/// Link-graph operations.
#[derive(Clone)]
pub struct LinkGraph {
    store: MemoryStore,
}

impl LinkGraph {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }

    /// Create a link between two memories. Upserts on the
    /// (from, to, relation) triple; `bidirectional` also creates the reverse
    /// edge as an independent row.
    pub fn link(
        &self,
        from_id: &str,
        to_id: &str,
        relation: RelationType,
        bidirectional: bool,
    ) -> Result<Link> {
        self.store.create_link(from_id, to_id, relation, bidirectional)
    }

    /// Resolve a memory's links in both directions, with endpoint titles.
    ///
    /// Fails with `Error::NotFound` if the memory does not exist. Links to
    /// tombstoned memories are still reported; the tombstone keeps the row
    /// resolvable.
    pub fn neighbors(&self, id: &str) -> Result<Neighborhood> {
        // Validates existence up front
        self.store.get_memory(id)?;

        let (outgoing, incoming) = self.store.links_for(id)?;

        let resolve = |links: Vec<Link>, pick_other: fn(&Link) -> &str| -> Result<Vec<Neighbor>> {
            links
                .into_iter()
                .map(|link| {
                    let other_id = pick_other(&link).to_string();
                    let other_title = self
                        .store
                        .get_memory_opt(&other_id)?
                        .map(|m| m.title)
                        .unwrap_or_default();
                    Ok(Neighbor {
                        link,
                        other_id,
                        other_title,
                    })
                })
                .collect()
        };

        Ok(Neighborhood {
            outgoing: resolve(outgoing, |l| &l.to_id)?,
            incoming: resolve(incoming, |l| &l.from_id)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::memory::MemoryKind;

    fn store_with(titles: &[&str]) -> (MemoryStore, Vec<String>) {
        let store = MemoryStore::in_memory().unwrap();
        let ids = titles
            .iter()
            .map(|t| {
                store
                    .create_memory(MemoryKind::Concept, t, "content", 50, &[])
                    .unwrap()
                    .id
            })
            .collect();
        (store, ids)
    }

    #[test]
    fn test_neighbors_resolves_titles() {
        let (store, ids) = store_with(&["hub", "spoke-a", "spoke-b"]);
        let graph = LinkGraph::new(store);

        graph
            .link(&ids[0], &ids[1], RelationType::DependsOn, false)
            .unwrap();
        graph
            .link(&ids[2], &ids[0], RelationType::PartOf, false)
            .unwrap();

        let hood = graph.neighbors(&ids[0]).unwrap();
        assert_eq!(hood.len(), 2);
        assert_eq!(hood.outgoing[0].other_title, "spoke-a");
        assert_eq!(hood.outgoing[0].link.relation, RelationType::DependsOn);
        assert_eq!(hood.incoming[0].other_title, "spoke-b");
    }

    #[test]
    fn test_neighbors_missing_memory() {
        let (store, _) = store_with(&["only"]);
        let graph = LinkGraph::new(store);

        let err = graph.neighbors("mem_missing").unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_bidirectional_shows_both_directions() {
        let (store, ids) = store_with(&["a", "b"]);
        let graph = LinkGraph::new(store);

        graph
            .link(&ids[0], &ids[1], RelationType::RelatedTo, true)
            .unwrap();

        let hood = graph.neighbors(&ids[0]).unwrap();
        assert_eq!(hood.outgoing.len(), 1);
        assert_eq!(hood.incoming.len(), 1);
    }
}
