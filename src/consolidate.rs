//! Consolidation of match decisions into entity clusters.
//!
//! Every corpus record is seeded as a singleton, then the oracle's decisions
//! are folded in: shared labels union their records, explicit pairs union
//! directly. The result is the transitive closure in canonical cluster form,
//! so records the oracle never mentioned survive as singletons.

use crate::dsu::{Clusters, DisjointSet};
use crate::error::LinkageError;
use crate::matcher::MatchDecisions;
use crate::model::{EntityLabel, SeqId};
use hashbrown::HashMap;
use tracing::debug;

/// Fold validated decisions over the full corpus of `record_count` records.
pub fn consolidate(
    decisions: &MatchDecisions,
    record_count: usize,
) -> Result<Clusters, LinkageError> {
    decisions.validate(record_count)?;

    let mut dsu = DisjointSet::with_capacity(record_count);
    for i in 0..record_count {
        dsu.add(SeqId(i as u32));
    }

    match decisions {
        MatchDecisions::Labels(labels) => {
            // First record seen with a label stands in for the whole group.
            let mut representative: HashMap<EntityLabel, SeqId> =
                HashMap::with_capacity(record_count);
            for (i, &label) in labels.iter().enumerate() {
                let seq = SeqId(i as u32);
                match representative.get(&label) {
                    Some(&rep) => {
                        dsu.union(rep, seq);
                    }
                    None => {
                        representative.insert(label, seq);
                    }
                }
            }
        }
        MatchDecisions::Pairs(pairs) => {
            for pair in pairs {
                dsu.union(pair.a, pair.b);
            }
        }
    }

    let clusters = dsu.clusters();
    debug!(
        records = record_count,
        clusters = clusters.len(),
        linked = clusters.linked_count(),
        "consolidated match decisions"
    );
    Ok(clusters)
}
