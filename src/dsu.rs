//! # Disjoint Set Union (DSU)
//!
//! Union-Find over sequence ids, used to take the transitive closure of
//! match decisions. Cluster extraction is deterministic: a cluster is
//! identified by its smallest member, members are sorted ascending, and
//! clusters are ordered by id. The same set of unions yields byte-identical
//! output regardless of insertion or union order.

use crate::model::{ClusterId, SeqId};
use hashbrown::HashMap;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Union-Find with path halving and union by size.
#[derive(Debug, Clone, Default)]
pub struct DisjointSet {
    /// Parent map - FxHashMap for faster hashing on the find hot path.
    parent: FxHashMap<SeqId, SeqId>,
    size: FxHashMap<SeqId, usize>,
    /// Current number of disjoint sets.
    cluster_count: usize,
}

impl DisjointSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            parent: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            size: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            cluster_count: 0,
        }
    }

    /// Add a record as its own singleton set. No-op if already present.
    pub fn add(&mut self, seq: SeqId) {
        if self.parent.contains_key(&seq) {
            return;
        }
        self.parent.insert(seq, seq);
        self.size.insert(seq, 1);
        self.cluster_count += 1;
    }

    pub fn contains(&self, seq: SeqId) -> bool {
        self.parent.contains_key(&seq)
    }

    /// Number of records tracked.
    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Number of disjoint sets.
    pub fn cluster_count(&self) -> usize {
        self.cluster_count
    }

    /// Find the root of a record, compressing the path as it goes.
    /// An untracked record is its own root.
    #[inline]
    pub fn find(&mut self, seq: SeqId) -> SeqId {
        let Some(&initial_parent) = self.parent.get(&seq) else {
            return seq;
        };
        if initial_parent == seq {
            return seq;
        }
        self.find_root_with_path_halving(seq, initial_parent)
    }

    /// Path halving: point every other node to its grandparent while walking
    /// to the root.
    #[inline]
    fn find_root_with_path_halving(&mut self, start: SeqId, initial_parent: SeqId) -> SeqId {
        let mut current = start;
        let mut parent = initial_parent;

        loop {
            let grandparent = self.parent.get(&parent).copied().unwrap_or(parent);
            if grandparent == parent {
                break;
            }

            self.parent.insert(current, grandparent);
            current = grandparent;

            parent = self.parent.get(&current).copied().unwrap_or(current);
            if parent == current {
                break;
            }
        }

        parent
    }

    pub fn same_set(&mut self, a: SeqId, b: SeqId) -> bool {
        self.find(a) == self.find(b)
    }

    /// Union the sets containing `a` and `b`, adding either if untracked.
    /// Returns true if two distinct sets were merged.
    pub fn union(&mut self, a: SeqId, b: SeqId) -> bool {
        self.add(a);
        self.add(b);

        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return false;
        }

        let size_a = self.size.get(&root_a).copied().unwrap_or(1);
        let size_b = self.size.get(&root_b).copied().unwrap_or(1);

        // Attach the smaller tree under the larger one.
        let (child, root) = if size_a < size_b {
            (root_a, root_b)
        } else {
            (root_b, root_a)
        };
        self.parent.insert(child, root);
        self.size.insert(root, size_a + size_b);
        self.cluster_count = self.cluster_count.saturating_sub(1);
        true
    }

    /// Size of the set containing `seq`. An untracked record counts as a
    /// singleton.
    pub fn set_size(&mut self, seq: SeqId) -> usize {
        let root = self.find(seq);
        self.size.get(&root).copied().unwrap_or(1)
    }

    /// Extract all clusters in canonical form.
    ///
    /// Each cluster is identified by its smallest member, members sorted
    /// ascending, clusters sorted by id. Internal union order does not leak
    /// into the result.
    pub fn clusters(&mut self) -> Clusters {
        if self.parent.is_empty() {
            return Clusters::default();
        }

        // find() mutates parent, so collect the keys first.
        let seq_ids: Vec<SeqId> = self.parent.keys().copied().collect();

        let estimated = self.cluster_count.max(1);
        let mut by_root: HashMap<SeqId, Vec<SeqId>> = HashMap::with_capacity(estimated);
        for seq in seq_ids {
            let root = self.find(seq);
            by_root.entry(root).or_default().push(seq);
        }

        let mut clusters = Vec::with_capacity(by_root.len());
        for (_, mut members) in by_root {
            members.sort_unstable();
            let id = ClusterId(members[0].0);
            clusters.push(Cluster { id, members });
        }
        clusters.sort_unstable_by_key(|c| c.id);

        Clusters { clusters }
    }
}

/// A group of records resolved to one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    /// Canonical id: the smallest member's sequence id.
    pub id: ClusterId,
    /// Members in ascending sequence order.
    pub members: Vec<SeqId>,
}

impl Cluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, seq: SeqId) -> bool {
        self.members.binary_search(&seq).is_ok()
    }

    /// A cluster links records only when it has more than one member.
    pub fn is_linked(&self) -> bool {
        self.members.len() > 1
    }
}

/// All clusters of a consolidation, ordered by canonical id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clusters {
    pub clusters: Vec<Cluster>,
}

impl Clusters {
    pub fn get(&self, id: ClusterId) -> Option<&Cluster> {
        self.clusters
            .binary_search_by_key(&id, |c| c.id)
            .ok()
            .map(|i| &self.clusters[i])
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.iter()
    }

    /// Clusters with at least two members.
    pub fn linked_count(&self) -> usize {
        self.clusters.iter().filter(|c| c.is_linked()).count()
    }

    /// Single-member clusters.
    pub fn singleton_count(&self) -> usize {
        self.clusters.iter().filter(|c| !c.is_linked()).count()
    }
}
