//! # Data Model
//!
//! Core identifiers and value types for the linkage pipeline.
//! Records are addressed by their position in the harmonized stream;
//! source files and clusters get compact ids with stable `Display` forms.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the synthetic row-id column appended to the exchange corpus.
///
/// Canonical columns may not use this name; validation rejects the collision.
pub const ROW_ID_COLUMN: &str = "__row_id";

/// Global position of a record in the harmonized stream (0-based).
///
/// Sequence ids are assigned in source declaration order and cover
/// `[0, total_records)` with no gaps. They are the only record handle
/// shared with the matching oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeqId(pub u32);

impl fmt::Display for SeqId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// 1-based position of a source file in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileIndex(pub u16);

impl FileIndex {
    /// Build from a 0-based declaration position.
    pub fn from_position(position: usize) -> Self {
        FileIndex((position + 1) as u16)
    }

    /// The 0-based declaration position.
    pub fn position(self) -> usize {
        self.0.saturating_sub(1) as usize
    }
}

impl fmt::Display for FileIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "F{}", self.0)
    }
}

/// Canonical cluster identifier: the smallest member sequence id.
///
/// Stable across runs with identical inputs and decisions, and independent
/// of the order in which links were applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterId(pub u32);

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}

/// Opaque entity label emitted by a matching oracle.
///
/// Records sharing a label are declared to refer to the same entity.
/// The numeric value carries no meaning beyond equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityLabel(pub u64);

impl fmt::Display for EntityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

/// How a canonical column is presented to the matching oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColumnKind {
    /// Compared by string similarity (names, free text).
    String,
    /// Compared by exact agreement (codes, dates, enumerations).
    Categorical,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKind::String => write!(f, "string"),
            ColumnKind::Categorical => write!(f, "categorical"),
        }
    }
}

/// A canonical column: its name (as declared by the first source file)
/// and how the matcher should treat it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Shorthand for a string-compared column.
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::String)
    }

    /// Shorthand for a categorically-compared column.
    pub fn categorical(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Categorical)
    }
}

/// Pipeline stages, in execution order.
///
/// Every operation names the stage it requires; invoking one out of order
/// fails without touching pipeline state. `rematch` moves the pipeline
/// back to `CorpusWritten`, keeping harmonization and the exchange corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Unstarted,
    Harmonized,
    CorpusWritten,
    Matched,
    Consolidated,
    CrosswalkReady,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Unstarted => "unstarted",
            Stage::Harmonized => "harmonized",
            Stage::CorpusWritten => "corpus-written",
            Stage::Matched => "matched",
            Stage::Consolidated => "consolidated",
            Stage::CrosswalkReady => "crosswalk-ready",
        };
        write!(f, "{}", name)
    }
}

/// Counters describing a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Total records harmonized across all source files.
    pub record_count: usize,
    /// Records contributed by each source file, in declaration order.
    pub file_counts: Vec<usize>,
    /// Total clusters, singletons included. Doubles as the estimated
    /// population size: the number of distinct entities observed.
    pub cluster_count: usize,
    /// Clusters with two or more members.
    pub linked_cluster_count: usize,
    /// Records no decision linked to anything.
    pub singleton_count: usize,
    /// Rows emitted into the crosswalk.
    pub crosswalk_rows: usize,
    /// Intra-file duplicate groups surfaced while building the crosswalk.
    pub duplicate_anomalies: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_forms() {
        assert_eq!(SeqId(7).to_string(), "S7");
        assert_eq!(FileIndex(2).to_string(), "F2");
        assert_eq!(ClusterId(0).to_string(), "C0");
        assert_eq!(EntityLabel(41).to_string(), "E41");
    }

    #[test]
    fn test_file_index_positions() {
        assert_eq!(FileIndex::from_position(0), FileIndex(1));
        assert_eq!(FileIndex::from_position(2), FileIndex(3));
        assert_eq!(FileIndex(3).position(), 2);
        assert_eq!(FileIndex(1).position(), 0);
    }

    #[test]
    fn test_stage_ordering() {
        assert!(Stage::Unstarted < Stage::Harmonized);
        assert!(Stage::Harmonized < Stage::CorpusWritten);
        assert!(Stage::CorpusWritten < Stage::Matched);
        assert!(Stage::Matched < Stage::Consolidated);
        assert!(Stage::Consolidated < Stage::CrosswalkReady);
    }

    #[test]
    fn test_stage_serde() {
        let json = serde_json::to_string(&Stage::CorpusWritten).unwrap();
        assert_eq!(json, "\"corpus-written\"");

        let stage: Stage = serde_json::from_str("\"crosswalk-ready\"").unwrap();
        assert_eq!(stage, Stage::CrosswalkReady);
    }

    #[test]
    fn test_column_spec_shorthands() {
        let name = ColumnSpec::string("fname");
        assert_eq!(name.kind, ColumnKind::String);
        let year = ColumnSpec::categorical("by");
        assert_eq!(year.kind, ColumnKind::Categorical);
        assert_eq!(year.name, "by");
    }
}
