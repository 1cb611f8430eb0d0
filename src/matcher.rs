//! The matching oracle boundary.
//!
//! Matching itself is delegated to an external engine; this module owns the
//! request surface handed to it, the decision formats accepted back, and
//! contract validation of those decisions. The pipeline never interprets
//! match quality, it only transports decisions.
//!
//! [`CommandMatcher`] runs the oracle as a subprocess: the request is
//! serialized to JSON inside the scratch directory, the command is invoked
//! with that file as its final argument, and one entity label per corpus
//! row is read back from the `labels_path` named in the request.

use crate::error::LinkageError;
use crate::model::{EntityLabel, FileIndex, SeqId};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Steepness constant of the oracle's distortion model. Fixed; not a knob.
pub const STEEPNESS: f64 = 1.0;

/// Everything the oracle needs for one run.
#[derive(Debug, Clone, Serialize)]
pub struct MatcherRequest {
    /// Committed exchange corpus.
    pub corpus_path: PathBuf,
    /// Name of the trailing row-id column in the corpus.
    pub row_id_column: String,
    /// Canonical columns compared by string similarity.
    pub string_columns: Vec<String>,
    /// Canonical columns compared by exact agreement.
    pub categorical_columns: Vec<String>,
    /// Alpha prior on distortion.
    pub a: f64,
    /// Beta prior on distortion.
    pub b: f64,
    pub steepness: f64,
    /// Gibbs iterations to run.
    pub iterations: u32,
    /// Source file of each corpus row, by sequence id.
    pub file_numbers: Vec<FileIndex>,
    /// Total corpus rows. Label output must have exactly this cardinality.
    pub record_count: usize,
}

/// An undirected link between two records, stored smaller id first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchPair {
    pub a: SeqId,
    pub b: SeqId,
}

impl MatchPair {
    pub fn new(a: SeqId, b: SeqId) -> Self {
        if a <= b {
            Self { a, b }
        } else {
            Self { a: b, b: a }
        }
    }
}

/// Decisions returned by an oracle, in either accepted shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MatchDecisions {
    /// One label per corpus row, indexed by sequence id. Shared labels
    /// assert shared identity.
    Labels(Vec<EntityLabel>),
    /// Explicit matched pairs. Transitive closure happens downstream.
    Pairs(Vec<MatchPair>),
}

impl MatchDecisions {
    /// Check the oracle contract: label cardinality must equal the corpus
    /// row count, and pairs may reference only known sequence ids and must
    /// link two distinct rows.
    pub fn validate(&self, record_count: usize) -> Result<(), LinkageError> {
        match self {
            MatchDecisions::Labels(labels) => {
                if labels.len() != record_count {
                    return Err(LinkageError::MatcherContract {
                        message: format!(
                            "expected {} labels, one per corpus row, got {}",
                            record_count,
                            labels.len()
                        ),
                    });
                }
            }
            MatchDecisions::Pairs(pairs) => {
                for pair in pairs {
                    if pair.a == pair.b {
                        return Err(LinkageError::MatcherContract {
                            message: format!("pair links sequence id {} to itself", pair.a),
                        });
                    }
                    let high = pair.a.max(pair.b);
                    if high.0 as usize >= record_count {
                        return Err(LinkageError::MatcherContract {
                            message: format!(
                                "pair references unknown sequence id {} (corpus has {} rows)",
                                high, record_count
                            ),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// A matching oracle.
///
/// Implementations must be pure transport: read the corpus named in the
/// request, emit decisions, touch nothing else the pipeline owns.
pub trait Matcher {
    fn run(&self, request: &MatcherRequest) -> Result<MatchDecisions, LinkageError>;
}

/// File name of the serialized request inside the scratch directory.
pub const REQUEST_FILE: &str = "matcher_request.json";
/// File name the subprocess oracle must write its labels to.
pub const LABELS_FILE: &str = "labels.out";

#[derive(Serialize)]
struct CommandEnvelope<'a> {
    #[serde(flatten)]
    request: &'a MatcherRequest,
    /// Where the subprocess must write one label per corpus row.
    labels_path: &'a Path,
}

/// Runs the oracle as a subprocess.
///
/// The command is invoked as `<program> [args...] <request.json>`. A launch
/// failure or abnormal exit is `MatcherUnavailable`; a missing or malformed
/// label file is `MatcherContract`.
#[derive(Debug, Clone)]
pub struct CommandMatcher {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandMatcher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl Matcher for CommandMatcher {
    fn run(&self, request: &MatcherRequest) -> Result<MatchDecisions, LinkageError> {
        let dir = request
            .corpus_path
            .parent()
            .ok_or_else(|| LinkageError::MatcherUnavailable {
                message: format!(
                    "corpus path {} has no parent directory",
                    request.corpus_path.display()
                ),
            })?;
        let request_path = dir.join(REQUEST_FILE);
        let labels_path = dir.join(LABELS_FILE);

        let envelope = CommandEnvelope {
            request,
            labels_path: &labels_path,
        };
        let payload =
            serde_json::to_vec_pretty(&envelope).map_err(|e| LinkageError::MatcherUnavailable {
                message: format!("failed to encode matcher request: {}", e),
            })?;
        fs::write(&request_path, payload).map_err(|e| LinkageError::WriteFailed {
            path: request_path.clone(),
            message: e.to_string(),
        })?;

        debug!(
            program = %self.program.display(),
            request = %request_path.display(),
            rows = request.record_count,
            "invoking matcher"
        );
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(&request_path)
            .output()
            .map_err(|e| LinkageError::MatcherUnavailable {
                message: format!("failed to launch {}: {}", self.program.display(), e),
            })?;
        if !output.status.success() {
            return Err(LinkageError::MatcherUnavailable {
                message: format!(
                    "{} exited with {}: {}",
                    self.program.display(),
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let raw = fs::read_to_string(&labels_path).map_err(|e| LinkageError::MatcherContract {
            message: format!("no label file at {}: {}", labels_path.display(), e),
        })?;
        let labels = parse_labels(&raw)?;
        let decisions = MatchDecisions::Labels(labels);
        decisions.validate(request.record_count)?;
        Ok(decisions)
    }
}

fn parse_labels(raw: &str) -> Result<Vec<EntityLabel>, LinkageError> {
    let mut labels = Vec::new();
    for (i, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value = line
            .parse::<u64>()
            .map_err(|e| LinkageError::MatcherContract {
                message: format!("label line {} ('{}') is not an integer: {}", i + 1, line, e),
            })?;
        labels.push(EntityLabel(value));
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with(record_count: usize, corpus_path: PathBuf) -> MatcherRequest {
        MatcherRequest {
            corpus_path,
            row_id_column: crate::model::ROW_ID_COLUMN.to_string(),
            string_columns: vec!["fname".into(), "lname".into()],
            categorical_columns: vec!["by".into()],
            a: 1.0,
            b: 999.0,
            steepness: STEEPNESS,
            iterations: 10,
            file_numbers: vec![FileIndex(1); record_count],
            record_count,
        }
    }

    #[test]
    fn test_match_pair_normalizes_order() {
        let pair = MatchPair::new(SeqId(9), SeqId(3));
        assert_eq!(pair.a, SeqId(3));
        assert_eq!(pair.b, SeqId(9));
        assert_eq!(pair, MatchPair::new(SeqId(3), SeqId(9)));
    }

    #[test]
    fn test_label_cardinality_is_enforced() {
        let decisions = MatchDecisions::Labels(vec![EntityLabel(0), EntityLabel(1)]);
        assert!(decisions.validate(2).is_ok());
        match decisions.validate(3) {
            Err(LinkageError::MatcherContract { message }) => {
                assert!(message.contains("expected 3 labels"));
            }
            other => panic!("expected MatcherContract, got {:?}", other),
        }
    }

    #[test]
    fn test_pairs_must_reference_known_sequence_ids() {
        let decisions = MatchDecisions::Pairs(vec![MatchPair::new(SeqId(0), SeqId(5))]);
        assert!(decisions.validate(6).is_ok());
        match decisions.validate(5) {
            Err(LinkageError::MatcherContract { message }) => {
                assert!(message.contains("S5"));
            }
            other => panic!("expected MatcherContract, got {:?}", other),
        }
    }

    #[test]
    fn test_self_pairs_are_rejected() {
        let decisions = MatchDecisions::Pairs(vec![MatchPair::new(SeqId(2), SeqId(2))]);
        match decisions.validate(5) {
            Err(LinkageError::MatcherContract { message }) => {
                assert!(message.contains("S2"));
                assert!(message.contains("itself"));
            }
            other => panic!("expected MatcherContract, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_labels_rejects_garbage() {
        assert_eq!(
            parse_labels("0\n1\n1\n").unwrap(),
            vec![EntityLabel(0), EntityLabel(1), EntityLabel(1)]
        );
        match parse_labels("0\nnot-a-label\n") {
            Err(LinkageError::MatcherContract { message }) => {
                assert!(message.contains("line 2"));
            }
            other => panic!("expected MatcherContract, got {:?}", other),
        }
    }

    #[test]
    fn test_command_matcher_launch_failure_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = dir.path().join("corpus.csv");
        std::fs::write(&corpus, "fname,__row_id\nann,0\n").unwrap();

        let matcher = CommandMatcher::new("definitely-not-a-real-matcher");
        match matcher.run(&request_with(1, corpus)) {
            Err(LinkageError::MatcherUnavailable { message }) => {
                assert!(message.contains("failed to launch"));
            }
            other => panic!("expected MatcherUnavailable, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_command_matcher_reads_labels_back() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = dir.path().join("corpus.csv");
        std::fs::write(&corpus, "fname,__row_id\nann,0\nbob,1\nann,2\n").unwrap();
        let labels = dir.path().join(LABELS_FILE);

        let script = format!("printf '7\\n8\\n7\\n' > {}", labels.display());
        let matcher = CommandMatcher::new("/bin/sh").arg("-c").arg(script);
        let decisions = matcher.run(&request_with(3, corpus)).unwrap();
        assert_eq!(
            decisions,
            MatchDecisions::Labels(vec![EntityLabel(7), EntityLabel(8), EntityLabel(7)])
        );
        // The serialized request is left in place for inspection.
        assert!(dir.path().join(REQUEST_FILE).is_file());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_matcher_abnormal_exit_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = dir.path().join("corpus.csv");
        std::fs::write(&corpus, "fname,__row_id\nann,0\n").unwrap();

        let matcher = CommandMatcher::new("/bin/sh").arg("-c").arg("exit 3");
        match matcher.run(&request_with(1, corpus)) {
            Err(LinkageError::MatcherUnavailable { message }) => {
                assert!(message.contains("exited with"));
            }
            other => panic!("expected MatcherUnavailable, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_command_matcher_short_labels_violate_contract() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = dir.path().join("corpus.csv");
        std::fs::write(&corpus, "fname,__row_id\nann,0\nbob,1\n").unwrap();
        let labels = dir.path().join(LABELS_FILE);

        let script = format!("printf '7\\n' > {}", labels.display());
        let matcher = CommandMatcher::new("/bin/sh").arg("-c").arg(script);
        match matcher.run(&request_with(2, corpus)) {
            Err(LinkageError::MatcherContract { message }) => {
                assert!(message.contains("expected 2 labels"));
            }
            other => panic!("expected MatcherContract, got {:?}", other),
        }
    }
}
