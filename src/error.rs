//! Error taxonomy for the linkage pipeline.
//!
//! Every external failure surface has its own variant so callers can match
//! on what went wrong rather than parse messages. Attribution (file index,
//! path, line) travels with the variant wherever it is known.

use crate::model::{FileIndex, SeqId, Stage};
use std::fmt;
use std::path::PathBuf;

/// Failure modes of the linkage pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkageError {
    /// Configuration failed eager validation. Every violation found is
    /// listed, not just the first.
    Config { violations: Vec<String> },
    /// Fewer than two source files are registered; linkage is undefined.
    IncompleteConfig { sources: usize },
    /// No reader is available for the source file's format.
    UnsupportedSource { path: PathBuf },
    /// A source file could not be opened or parsed.
    Source {
        file_index: FileIndex,
        path: PathBuf,
        line: Option<u64>,
        message: String,
    },
    /// An output artifact could not be committed to disk.
    WriteFailed { path: PathBuf, message: String },
    /// The matching oracle could not be invoked or exited abnormally.
    MatcherUnavailable { message: String },
    /// The matching oracle returned output that violates its contract.
    MatcherContract { message: String },
    /// Provenance recomputed during crosswalk replay disagrees with the
    /// provenance recorded during harmonization. `None` marks a side where
    /// the record is missing entirely (the stream lengths drifted).
    Provenance {
        seq: SeqId,
        recorded: Option<FileIndex>,
        replayed: Option<FileIndex>,
    },
    /// An operation was invoked at the wrong pipeline stage.
    Stage { expected: Stage, actual: Stage },
    /// The run was cancelled; the pipeline stopped at the given stage.
    Cancelled { stage: Stage },
}

impl LinkageError {
    /// Single-violation configuration error.
    pub fn config(violation: impl Into<String>) -> Self {
        LinkageError::Config {
            violations: vec![violation.into()],
        }
    }
}

impl fmt::Display for LinkageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkageError::Config { violations } => {
                write!(f, "invalid configuration: {}", violations.join("; "))
            }
            LinkageError::IncompleteConfig { sources } => {
                write!(
                    f,
                    "record linkage needs at least two source files, got {}",
                    sources
                )
            }
            LinkageError::UnsupportedSource { path } => {
                write!(f, "no reader available for source file {}", path.display())
            }
            LinkageError::Source {
                file_index,
                path,
                line,
                message,
            } => {
                write!(f, "source {} ({})", file_index, path.display())?;
                if let Some(line) = line {
                    write!(f, " line {}", line)?;
                }
                write!(f, ": {}", message)
            }
            LinkageError::WriteFailed { path, message } => {
                write!(f, "failed to write {}: {}", path.display(), message)
            }
            LinkageError::MatcherUnavailable { message } => {
                write!(f, "matcher unavailable: {}", message)
            }
            LinkageError::MatcherContract { message } => {
                write!(f, "matcher contract violated: {}", message)
            }
            LinkageError::Provenance {
                seq,
                recorded,
                replayed,
            } => {
                write!(f, "provenance mismatch at {}: recorded ", seq)?;
                match recorded {
                    Some(fi) => write!(f, "{}", fi)?,
                    None => write!(f, "nothing")?,
                }
                write!(f, ", replayed ")?;
                match replayed {
                    Some(fi) => write!(f, "{}", fi),
                    None => write!(f, "nothing"),
                }
            }
            LinkageError::Stage { expected, actual } => {
                write!(
                    f,
                    "operation requires stage {}, pipeline is at {}",
                    expected, actual
                )
            }
            LinkageError::Cancelled { stage } => {
                write!(f, "run cancelled at stage {}", stage)
            }
        }
    }
}

impl std::error::Error for LinkageError {}

/// Operator-facing summary of a failed run: the stage reached, the error,
/// and where retained scratch artifacts can be inspected.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureReport {
    pub stage: Stage,
    pub error: String,
    pub scratch: Option<PathBuf>,
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "linkage failed at stage {}: {}", self.stage, self.error)?;
        if let Some(scratch) = &self.scratch {
            write!(f, " (scratch retained at {})", scratch.display())?;
        }
        Ok(())
    }
}
