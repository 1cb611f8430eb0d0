//! Crosswalk assembly.
//!
//! Turns consolidated clusters back into source-file terms: one row per
//! entity, one cell per source file, each cell holding the uid(s) of that
//! entity's records in that file. Uids are re-derived by replaying every
//! source file in declaration order, one open handle at a time, and the
//! replay is validated in lockstep against the harmonization sidecar. Any
//! drift between the two passes is a `Provenance` error; a silently edited
//! source must never produce a quietly wrong crosswalk.
//!
//! Two records of one cluster coming from the same file are a data anomaly,
//! not an error: both uids land in the cell as a tuple and a
//! [`DuplicateAnomaly`] is recorded.

use crate::config::LinkageConfig;
use crate::dsu::Clusters;
use crate::error::LinkageError;
use crate::harmonize::{open_source, HarmonizedStream};
use crate::model::{ClusterId, FileIndex, SeqId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One crosswalk cell: the uid(s) a cluster has in one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UidCell {
    /// The cluster has no record in this file.
    Empty,
    Single(String),
    /// Intra-file duplicates, uids in member sequence order.
    Multiple(Vec<String>),
}

impl UidCell {
    fn from_uids(mut uids: Vec<String>) -> Self {
        match uids.len() {
            0 => UidCell::Empty,
            1 => UidCell::Single(uids.remove(0)),
            _ => UidCell::Multiple(uids),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, UidCell::Empty)
    }
}

impl fmt::Display for UidCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UidCell::Empty => Ok(()),
            UidCell::Single(uid) => write!(f, "{}", uid),
            UidCell::Multiple(uids) => write!(f, "{}", uids.join(";")),
        }
    }
}

/// One crosswalk row: a cluster expressed as per-file uids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrosswalkRow {
    pub cluster: ClusterId,
    /// Exactly one cell per declared source file, in declaration order.
    pub cells: Vec<UidCell>,
}

impl CrosswalkRow {
    /// Number of source files this row draws from.
    pub fn occupied_files(&self) -> usize {
        self.cells.iter().filter(|c| !c.is_empty()).count()
    }
}

/// Two or more records of one cluster came from the same source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateAnomaly {
    pub file_index: FileIndex,
    pub cluster: ClusterId,
    /// The colliding records, in sequence order.
    pub members: Vec<SeqId>,
    pub uids: Vec<String>,
}

/// The assembled crosswalk plus everything observed while building it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crosswalk {
    /// Rows sorted by cluster id.
    pub rows: Vec<CrosswalkRow>,
    /// Intra-file duplicate observations, in (cluster, file) order.
    pub anomalies: Vec<DuplicateAnomaly>,
    pub file_count: usize,
}

impl Crosswalk {
    /// Rows whose cells span more than one source file.
    pub fn multi_file_row_count(&self) -> usize {
        self.rows.iter().filter(|r| r.occupied_files() > 1).count()
    }
}

/// Build the crosswalk for `clusters` over the harmonized `stream`.
///
/// Singleton clusters are skipped unless the config asks for them. Every
/// source file is replayed through the same reader the harmonizer used and
/// checked row-for-row against the provenance sidecar.
pub fn build_crosswalk(
    config: &LinkageConfig,
    stream: &HarmonizedStream,
    clusters: &Clusters,
) -> Result<Crosswalk, LinkageError> {
    let uids = replay_uids(config, stream)?;
    let file_count = config.sources.len();

    let mut rows = Vec::new();
    let mut anomalies = Vec::new();
    for cluster in clusters.iter() {
        if !cluster.is_linked() && !config.include_singletons {
            continue;
        }

        // Members are already in sequence order, so per-file uid lists come
        // out in sequence order too.
        let mut per_file: Vec<Vec<(SeqId, String)>> = vec![Vec::new(); file_count];
        for &seq in &cluster.members {
            let file = stream
                .file_index_of(seq)
                .ok_or(LinkageError::Provenance {
                    seq,
                    recorded: None,
                    replayed: None,
                })?;
            per_file[file.position()].push((seq, uids[seq.0 as usize].clone()));
        }

        let mut cells = Vec::with_capacity(file_count);
        for (position, entries) in per_file.into_iter().enumerate() {
            if entries.len() > 1 {
                let file_index = FileIndex::from_position(position);
                let members: Vec<SeqId> = entries.iter().map(|(s, _)| *s).collect();
                let uids: Vec<String> = entries.iter().map(|(_, u)| u.clone()).collect();
                warn!(
                    cluster = %cluster.id,
                    file = %file_index,
                    records = members.len(),
                    "records within one source file resolved to the same entity"
                );
                anomalies.push(DuplicateAnomaly {
                    file_index,
                    cluster: cluster.id,
                    members,
                    uids,
                });
            }
            cells.push(UidCell::from_uids(
                entries.into_iter().map(|(_, u)| u).collect(),
            ));
        }
        rows.push(CrosswalkRow {
            cluster: cluster.id,
            cells,
        });
    }

    debug!(
        rows = rows.len(),
        anomalies = anomalies.len(),
        "assembled crosswalk"
    );
    Ok(Crosswalk {
        rows,
        anomalies,
        file_count,
    })
}

/// Replay all sources and return each record's uid, indexed by sequence id.
///
/// A file without a declared uid column contributes the record's 0-based
/// in-file ordinal. The replay must agree with the sidecar on every row's
/// file and on the total record count.
fn replay_uids(
    config: &LinkageConfig,
    stream: &HarmonizedStream,
) -> Result<Vec<String>, LinkageError> {
    let mut uids = vec![String::new(); stream.len()];
    let mut cursor: usize = 0;

    for (position, source) in config.sources.iter().enumerate() {
        let file_index = FileIndex::from_position(position);
        let mut rows = open_source(source, file_index)?;

        let uid_position = match &source.uid_column {
            Some(name) => {
                // First occurrence wins, matching the harmonizer's lookup.
                let found = rows.headers().iter().position(|h| h == name);
                match found {
                    Some(p) => Some(p),
                    None => {
                        return Err(LinkageError::Source {
                            file_index,
                            path: source.path.clone(),
                            line: Some(1),
                            message: format!("uid column '{}' missing on replay", name),
                        })
                    }
                }
            }
            None => None,
        };

        let mut ordinal: usize = 0;
        while let Some(row) = rows.next_row() {
            let row = row?;
            let seq = SeqId(cursor as u32);
            match stream.file_index_of(seq) {
                Some(recorded) if recorded == file_index => {}
                recorded => {
                    return Err(LinkageError::Provenance {
                        seq,
                        recorded,
                        replayed: Some(file_index),
                    })
                }
            }
            uids[cursor] = match uid_position {
                Some(p) => row.values.get(p).cloned().unwrap_or_default(),
                None => ordinal.to_string(),
            };
            cursor += 1;
            ordinal += 1;
        }
    }

    if cursor != stream.len() {
        let seq = SeqId(cursor as u32);
        return Err(LinkageError::Provenance {
            seq,
            recorded: stream.file_index_of(seq),
            replayed: None,
        });
    }
    Ok(uids)
}

/// Write the crosswalk as CSV: `cluster_id` plus one `file_<n>` column per
/// source file. `Multiple` cells are `;`-joined. Output is byte-identical
/// for identical input.
pub fn write_crosswalk(path: &Path, crosswalk: &Crosswalk) -> Result<(), LinkageError> {
    let write_failed = |e: &dyn fmt::Display| LinkageError::WriteFailed {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    let file = File::create(path).map_err(|e| write_failed(&e))?;
    let mut writer = csv::Writer::from_writer(file);

    let mut header = Vec::with_capacity(crosswalk.file_count + 1);
    header.push("cluster_id".to_string());
    for n in 1..=crosswalk.file_count {
        header.push(format!("file_{}", n));
    }
    writer.write_record(&header).map_err(|e| write_failed(&e))?;

    for row in &crosswalk.rows {
        let mut record = Vec::with_capacity(crosswalk.file_count + 1);
        record.push(row.cluster.0.to_string());
        for cell in &row.cells {
            record.push(cell.to_string());
        }
        writer.write_record(&record).map_err(|e| write_failed(&e))?;
    }

    writer.flush().map_err(|e| write_failed(&e))?;
    debug!(path = %path.display(), rows = crosswalk.rows.len(), "wrote crosswalk");
    Ok(())
}

/// Conventional crosswalk file name inside `dir`.
pub fn crosswalk_path(dir: &Path) -> PathBuf {
    dir.join("crosswalk.csv")
}
