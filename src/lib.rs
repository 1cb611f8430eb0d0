//! # xwalk
//!
//! A record-linkage harmonization and identity-crosswalk engine.
//!
//! Heterogeneous source files are harmonized into one canonical corpus,
//! handed to an external matching oracle, and the oracle's decisions are
//! consolidated into entity clusters and re-expressed as a per-file uid
//! crosswalk with full provenance validation along the way.

pub mod config;
pub mod consolidate;
pub mod corpus;
pub mod crosswalk;
pub mod dsu;
pub mod error;
pub mod harmonize;
pub mod matcher;
pub mod model;
pub mod schema;
pub mod scratch;

// Re-export main types for convenience
pub use config::{ConfigBuilder, ConfigOverrides, LinkageConfig, Priors, SourceFile, SourceFormat};
pub use crosswalk::{Crosswalk, CrosswalkRow, DuplicateAnomaly, UidCell};
pub use dsu::{Cluster, Clusters};
pub use error::{FailureReport, LinkageError};
pub use harmonize::{HarmonizedRecord, HarmonizedStream};
pub use matcher::{CommandMatcher, MatchDecisions, MatchPair, Matcher, MatcherRequest};
pub use model::{
    ClusterId, ColumnKind, ColumnSpec, EntityLabel, FileIndex, RunSummary, SeqId, Stage,
    ROW_ID_COLUMN,
};
pub use schema::ResolvedSchema;
pub use scratch::{CancelToken, ScratchDir};

use std::path::{Path, PathBuf};
use tracing::info;

/// Main API for a linkage run.
///
/// Owns the validated configuration and every per-stage artifact. Each
/// operation requires the stage its predecessor established; a failed
/// operation leaves the pipeline at the last completed stage with all
/// artifacts intact, so a run can be inspected or resumed after the cause
/// is fixed.
pub struct Linkage {
    config: LinkageConfig,
    schema: ResolvedSchema,
    cancel: CancelToken,
    stage: Stage,
    scratch: Option<ScratchDir>,
    stream: Option<HarmonizedStream>,
    corpus_path: Option<PathBuf>,
    decisions: Option<MatchDecisions>,
    clusters: Option<Clusters>,
    crosswalk: Option<Crosswalk>,
}

impl Linkage {
    /// Validate the configuration, resolve the canonical schema, and set up
    /// an unstarted pipeline. No file is touched yet.
    pub fn new(config: LinkageConfig) -> Result<Self, LinkageError> {
        config.validate()?;
        let schema = ResolvedSchema::resolve(&config)?;
        Ok(Self {
            config,
            schema,
            cancel: CancelToken::new(),
            stage: Stage::Unstarted,
            scratch: None,
            stream: None,
            corpus_path: None,
            decisions: None,
            clusters: None,
            crosswalk: None,
        })
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn config(&self) -> &LinkageConfig {
        &self.config
    }

    pub fn schema(&self) -> &ResolvedSchema {
        &self.schema
    }

    /// A handle onto this run's cancellation flag. Cancelling prevents the
    /// pipeline from advancing past a pending match; stages already reached
    /// are preserved.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn harmonized(&self) -> Option<&HarmonizedStream> {
        self.stream.as_ref()
    }

    pub fn corpus_path(&self) -> Option<&Path> {
        self.corpus_path.as_deref()
    }

    pub fn clusters(&self) -> Option<&Clusters> {
        self.clusters.as_ref()
    }

    pub fn crosswalk(&self) -> Option<&Crosswalk> {
        self.crosswalk.as_ref()
    }

    pub fn scratch_path(&self) -> Option<&Path> {
        self.scratch.as_ref().map(|s| s.path())
    }

    /// Harmonize all source files into the canonical record stream.
    pub fn harmonize(&mut self) -> Result<(), LinkageError> {
        self.expect_stage(Stage::Unstarted)?;
        self.check_cancelled()?;

        let stream = harmonize::harmonize(&self.config, &self.schema)?;
        info!(
            records = stream.len(),
            files = self.config.sources.len(),
            "harmonization complete"
        );
        self.stream = Some(stream);
        self.stage = Stage::Harmonized;
        Ok(())
    }

    /// Commit the exchange corpus into this run's scratch directory.
    pub fn write_corpus(&mut self) -> Result<(), LinkageError> {
        self.expect_stage(Stage::Harmonized)?;
        self.check_cancelled()?;

        if self.scratch.is_none() {
            self.scratch = Some(ScratchDir::create(self.config.scratch_root.as_deref())?);
        }
        let scratch = self.ready_scratch()?;
        let stream = self.ready_stream()?;
        let path = corpus::write_corpus(scratch, &self.schema, stream)?;
        info!(path = %path.display(), "exchange corpus written");
        self.corpus_path = Some(path);
        self.stage = Stage::CorpusWritten;
        Ok(())
    }

    /// Invoke the matching oracle over the committed corpus.
    ///
    /// Cancellation is honored on both sides of the call: a flag set before
    /// the call skips it, one set during the call discards the returned
    /// decisions. Either way the pipeline stays at `CorpusWritten`.
    pub fn run_matcher(&mut self, matcher: &dyn Matcher) -> Result<(), LinkageError> {
        self.expect_stage(Stage::CorpusWritten)?;
        self.check_cancelled()?;

        let request = self.matcher_request()?;
        info!(
            rows = request.record_count,
            iterations = request.iterations,
            "running matcher"
        );
        let decisions = matcher.run(&request)?;
        decisions.validate(request.record_count)?;
        self.check_cancelled()?;

        self.decisions = Some(decisions);
        self.stage = Stage::Matched;
        Ok(())
    }

    /// The request the next `run_matcher` call would send.
    pub fn matcher_request(&self) -> Result<MatcherRequest, LinkageError> {
        let stream = self.ready_stream()?;
        let corpus_path = self
            .corpus_path
            .clone()
            .ok_or(LinkageError::Stage {
                expected: Stage::CorpusWritten,
                actual: self.stage,
            })?;
        Ok(MatcherRequest {
            corpus_path,
            row_id_column: ROW_ID_COLUMN.to_string(),
            string_columns: self.schema.string_columns(),
            categorical_columns: self.schema.categorical_columns(),
            a: self.config.priors.a,
            b: self.config.priors.b,
            steepness: matcher::STEEPNESS,
            iterations: self.config.iterations,
            file_numbers: stream.file_index.clone(),
            record_count: stream.len(),
        })
    }

    /// Consolidate the match decisions into canonical clusters. Decisions
    /// are consumed exactly once; repeating requires a rematch.
    pub fn consolidate(&mut self) -> Result<(), LinkageError> {
        self.expect_stage(Stage::Matched)?;
        let record_count = self.ready_stream()?.len();
        let decisions = self.decisions.as_ref().ok_or(LinkageError::Stage {
            expected: Stage::Matched,
            actual: self.stage,
        })?;

        let clusters = consolidate::consolidate(decisions, record_count)?;
        info!(
            clusters = clusters.len(),
            linked = clusters.linked_count(),
            "consolidation complete"
        );
        self.decisions = None;
        self.clusters = Some(clusters);
        self.stage = Stage::Consolidated;
        Ok(())
    }

    /// Assemble the crosswalk, replaying sources against the sidecar.
    pub fn build_crosswalk(&mut self) -> Result<(), LinkageError> {
        self.expect_stage(Stage::Consolidated)?;
        let stream = self.ready_stream()?;
        let clusters = self.clusters.as_ref().ok_or(LinkageError::Stage {
            expected: Stage::Consolidated,
            actual: self.stage,
        })?;

        let crosswalk = crosswalk::build_crosswalk(&self.config, stream, clusters)?;
        info!(
            rows = crosswalk.rows.len(),
            anomalies = crosswalk.anomalies.len(),
            "crosswalk ready"
        );
        self.crosswalk = Some(crosswalk);
        self.stage = Stage::CrosswalkReady;
        Ok(())
    }

    /// Write the assembled crosswalk as CSV.
    pub fn write_crosswalk(&self, path: &Path) -> Result<(), LinkageError> {
        self.expect_stage(Stage::CrosswalkReady)?;
        let crosswalk = self.crosswalk.as_ref().ok_or(LinkageError::Stage {
            expected: Stage::CrosswalkReady,
            actual: self.stage,
        })?;
        crosswalk::write_crosswalk(path, crosswalk)
    }

    /// Drive the pipeline from its current stage to `CrosswalkReady`.
    pub fn run(&mut self, matcher: &dyn Matcher) -> Result<RunSummary, LinkageError> {
        if self.stage == Stage::Unstarted {
            self.harmonize()?;
        }
        if self.stage == Stage::Harmonized {
            self.write_corpus()?;
        }
        if self.stage == Stage::CorpusWritten {
            self.run_matcher(matcher)?;
        }
        if self.stage == Stage::Matched {
            self.consolidate()?;
        }
        if self.stage == Stage::Consolidated {
            self.build_crosswalk()?;
        }
        self.summary().ok_or(LinkageError::Stage {
            expected: Stage::CrosswalkReady,
            actual: self.stage,
        })
    }

    /// Re-run matching with adjusted hyperparameters, preserving the
    /// harmonized stream and committed corpus. Everything downstream of the
    /// corpus is reset first.
    pub fn rematch(
        &mut self,
        matcher: &dyn Matcher,
        priors: Priors,
        iterations: u32,
    ) -> Result<(), LinkageError> {
        if self.stage < Stage::CorpusWritten {
            return Err(LinkageError::Stage {
                expected: Stage::CorpusWritten,
                actual: self.stage,
            });
        }

        let mut config = self.config.clone();
        config.priors = priors;
        config.iterations = iterations;
        config.validate()?;
        self.config = config;

        self.decisions = None;
        self.clusters = None;
        self.crosswalk = None;
        self.stage = Stage::CorpusWritten;
        info!(
            a = priors.a,
            b = priors.b,
            iterations, "rematching with adjusted priors"
        );
        self.run_matcher(matcher)
    }

    /// Counters for a completed run. `None` until the crosswalk is ready.
    pub fn summary(&self) -> Option<RunSummary> {
        if self.stage != Stage::CrosswalkReady {
            return None;
        }
        let stream = self.stream.as_ref()?;
        let clusters = self.clusters.as_ref()?;
        let crosswalk = self.crosswalk.as_ref()?;
        Some(RunSummary {
            record_count: stream.len(),
            file_counts: stream.file_counts.clone(),
            cluster_count: clusters.len(),
            linked_cluster_count: clusters.linked_count(),
            singleton_count: clusters.singleton_count(),
            crosswalk_rows: crosswalk.rows.len(),
            duplicate_anomalies: crosswalk.anomalies.len(),
        })
    }

    /// Describe a failure in operator terms: the stage reached, the error,
    /// and where the retained scratch directory sits.
    pub fn failure_report(&self, error: &LinkageError) -> FailureReport {
        FailureReport {
            stage: self.stage,
            error: error.to_string(),
            scratch: self.scratch_path().map(Path::to_path_buf),
        }
    }

    /// Remove the scratch directory. Explicit and idempotent; a pipeline
    /// with no scratch yet is a no-op.
    pub fn cleanup_scratch(&self) -> Result<(), LinkageError> {
        match &self.scratch {
            Some(scratch) => scratch.cleanup(),
            None => Ok(()),
        }
    }

    fn expect_stage(&self, expected: Stage) -> Result<(), LinkageError> {
        if self.stage == expected {
            Ok(())
        } else {
            Err(LinkageError::Stage {
                expected,
                actual: self.stage,
            })
        }
    }

    fn check_cancelled(&self) -> Result<(), LinkageError> {
        if self.cancel.is_cancelled() {
            Err(LinkageError::Cancelled { stage: self.stage })
        } else {
            Ok(())
        }
    }

    fn ready_stream(&self) -> Result<&HarmonizedStream, LinkageError> {
        self.stream.as_ref().ok_or(LinkageError::Stage {
            expected: Stage::Harmonized,
            actual: self.stage,
        })
    }

    fn ready_scratch(&self) -> Result<&ScratchDir, LinkageError> {
        self.scratch.as_ref().ok_or(LinkageError::Stage {
            expected: Stage::CorpusWritten,
            actual: self.stage,
        })
    }
}
