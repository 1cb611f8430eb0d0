//! Configuration for a linkage run.
//!
//! Configuration is loaded with precedence: CLI args > Env vars > Config file > Defaults
//!
//! # Example config file (xwalk.toml)
//! ```toml
//! iterations = 500
//!
//! [[sources]]
//! path = "data/registry_a.csv"
//! uid_column = "UID"
//!
//! [[sources]]
//! path = "data/registry_b.csv"
//! uid_column = "UID"
//!
//! [[columns]]
//! name = "fname_c1"
//! kind = "string"
//!
//! [[columns]]
//! name = "by"
//! kind = "categorical"
//!
//! [mapping]
//! fname_c1 = ["first_name"]
//! by = ["birth_year"]
//!
//! [priors]
//! a = 1.0
//! b = 999.0
//! ```

use crate::error::LinkageError;
use crate::model::ColumnSpec;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Default Gibbs iterations requested from the matching oracle.
pub const DEFAULT_ITERATIONS: u32 = 500;
/// Default alpha prior on distortion.
pub const DEFAULT_PRIOR_A: f64 = 1.0;
/// Default beta prior on distortion.
pub const DEFAULT_PRIOR_B: f64 = 999.0;

/// Input format of a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceFormat {
    /// Resolve from the file extension at first use.
    #[default]
    Auto,
    /// Comma-delimited text with a header row.
    Csv,
    /// Tab-delimited text with a header row.
    Tsv,
}

/// A registered source file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceFile {
    /// Location on disk.
    pub path: PathBuf,
    /// Input format; `Auto` resolves from the extension.
    pub format: SourceFormat,
    /// Column holding the file-local unique identifier. When absent, the
    /// crosswalk falls back to the record's 0-based position in the file.
    pub uid_column: Option<String>,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            format: SourceFormat::Auto,
            uid_column: None,
        }
    }

    pub fn with_uid_column(mut self, column: impl Into<String>) -> Self {
        self.uid_column = Some(column.into());
        self
    }

    pub fn with_format(mut self, format: SourceFormat) -> Self {
        self.format = format;
        self
    }
}

/// Beta priors on the distortion probability handed to the oracle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Priors {
    pub a: f64,
    pub b: f64,
}

impl Default for Priors {
    fn default() -> Self {
        Self {
            a: DEFAULT_PRIOR_A,
            b: DEFAULT_PRIOR_B,
        }
    }
}

/// Full configuration for a linkage run.
///
/// The canonical schema is declared by `columns` (names as they appear in
/// the first source file). `mapping` translates each canonical column to
/// its name in every later file, one entry per non-first file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkageConfig {
    /// Source files in declaration order. At least two are required.
    pub sources: Vec<SourceFile>,
    /// Canonical columns, in the order they take in the exchange corpus.
    pub columns: Vec<ColumnSpec>,
    /// Canonical column name -> its name in files 2..N, in file order.
    pub mapping: BTreeMap<String, Vec<String>>,
    /// Distortion priors passed to the oracle.
    pub priors: Priors,
    /// Gibbs iterations requested from the oracle.
    pub iterations: u32,
    /// Emit singleton clusters into the crosswalk.
    pub include_singletons: bool,
    /// Parent directory for the run's scratch directory. Defaults to the
    /// platform temp directory.
    pub scratch_root: Option<PathBuf>,
}

impl Default for LinkageConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            columns: Vec::new(),
            mapping: BTreeMap::new(),
            priors: Priors::default(),
            iterations: DEFAULT_ITERATIONS,
            include_singletons: false,
            scratch_root: None,
        }
    }
}

impl LinkageConfig {
    /// Load configuration with precedence: CLI args > Env > File > Defaults
    ///
    /// # Arguments
    /// * `config_path` - Optional path to TOML config file
    /// * `overrides` - CLI overrides to apply on top
    pub fn load(
        config_path: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<Self, LinkageError> {
        let mut figment = Figment::new().merge(Serialized::defaults(LinkageConfig::default()));

        // Layer 1: Config file (if provided)
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Layer 2: Environment variables with XWALK_ prefix
        figment = figment.merge(Env::prefixed("XWALK_").split("_"));

        // Layer 3: CLI overrides
        figment = figment.merge(Serialized::defaults(overrides));

        figment
            .extract()
            .map_err(|e: figment::Error| LinkageError::config(e.to_string()))
    }

    /// Load from environment and optional config file only (no CLI overrides)
    pub fn from_env(config_path: Option<&str>) -> Result<Self, LinkageError> {
        Self::load(config_path, ConfigOverrides::default())
    }

    /// Eager validation of everything checkable without touching the
    /// filesystem. Structural violations are collected and reported
    /// together; column-level checks live in schema resolution.
    pub fn validate(&self) -> Result<(), LinkageError> {
        if self.sources.len() < 2 {
            return Err(LinkageError::IncompleteConfig {
                sources: self.sources.len(),
            });
        }

        let mut violations = Vec::new();

        if self.columns.is_empty() {
            violations.push("no canonical columns declared".to_string());
        }
        for (i, source) in self.sources.iter().enumerate() {
            if source.path.as_os_str().is_empty() {
                violations.push(format!("source {} has an empty path", i + 1));
            }
            if let Some(uid) = &source.uid_column {
                if uid.is_empty() {
                    violations.push(format!("source {} declares an empty uid column", i + 1));
                }
            }
        }
        if !(self.priors.a > 0.0) {
            violations.push(format!("prior a must be positive, got {}", self.priors.a));
        }
        if !(self.priors.b > 0.0) {
            violations.push(format!("prior b must be positive, got {}", self.priors.b));
        }
        if self.iterations == 0 {
            violations.push("iterations must be at least 1".to_string());
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(LinkageError::Config { violations })
        }
    }
}

/// Fluent programmatic construction of a validated [`LinkageConfig`].
///
/// The code-level counterpart of [`LinkageConfig::load`]: callers that
/// assemble a configuration in code get the same eager validation at
/// `build` that file/env loading gets at use.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: LinkageConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the next source file, in declaration order.
    pub fn source(mut self, source: SourceFile) -> Self {
        self.config.sources.push(source);
        self
    }

    /// Declare the next canonical column, in exchange order.
    pub fn column(mut self, column: ColumnSpec) -> Self {
        self.config.columns.push(column);
        self
    }

    /// Map a canonical column to its name in each file after the first.
    pub fn map_column<I, S>(mut self, canonical: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config
            .mapping
            .insert(canonical.into(), names.into_iter().map(Into::into).collect());
        self
    }

    pub fn priors(mut self, a: f64, b: f64) -> Self {
        self.config.priors = Priors { a, b };
        self
    }

    pub fn iterations(mut self, iterations: u32) -> Self {
        self.config.iterations = iterations;
        self
    }

    pub fn include_singletons(mut self, include: bool) -> Self {
        self.config.include_singletons = include;
        self
    }

    pub fn scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.scratch_root = Some(root.into());
        self
    }

    /// Validate and return the finished configuration.
    pub fn build(self) -> Result<LinkageConfig, LinkageError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// CLI overrides that take precedence over file and env config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_singletons: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch_root: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priors: Option<Priors>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ColumnKind;

    fn two_source_config() -> LinkageConfig {
        LinkageConfig {
            sources: vec![SourceFile::new("a.csv"), SourceFile::new("b.csv")],
            columns: vec![ColumnSpec::string("fname"), ColumnSpec::categorical("by")],
            mapping: BTreeMap::from([
                ("fname".to_string(), vec!["first_name".to_string()]),
                ("by".to_string(), vec!["birth_year".to_string()]),
            ]),
            ..LinkageConfig::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = LinkageConfig::default();
        assert_eq!(config.iterations, DEFAULT_ITERATIONS);
        assert_eq!(config.priors.a, DEFAULT_PRIOR_A);
        assert_eq!(config.priors.b, DEFAULT_PRIOR_B);
        assert!(!config.include_singletons);
        assert!(config.sources.is_empty());
    }

    #[test]
    fn test_validate_accepts_two_source_config() {
        assert!(two_source_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_single_source() {
        let mut config = two_source_config();
        config.sources.truncate(1);
        match config.validate() {
            Err(LinkageError::IncompleteConfig { sources }) => assert_eq!(sources, 1),
            other => panic!("expected IncompleteConfig, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_collects_every_violation() {
        let mut config = two_source_config();
        config.priors.a = 0.0;
        config.priors.b = -1.0;
        config.iterations = 0;
        config.columns.clear();
        match config.validate() {
            Err(LinkageError::Config { violations }) => {
                assert_eq!(violations.len(), 4);
                assert!(violations.iter().any(|v| v.contains("prior a")));
                assert!(violations.iter().any(|v| v.contains("prior b")));
                assert!(violations.iter().any(|v| v.contains("iterations")));
                assert!(violations.iter().any(|v| v.contains("canonical columns")));
            }
            other => panic!("expected Config violations, got {:?}", other),
        }
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xwalk.toml");
        std::fs::write(
            &path,
            r#"
iterations = 50
include_singletons = true

[[sources]]
path = "a.csv"
uid_column = "UID"

[[sources]]
path = "b.csv"

[[columns]]
name = "fname"
kind = "string"

[mapping]
fname = ["first_name"]

[priors]
a = 2.0
b = 500.0
"#,
        )
        .unwrap();

        let config =
            LinkageConfig::load(Some(path.to_str().unwrap()), ConfigOverrides::default()).unwrap();
        assert_eq!(config.iterations, 50);
        assert!(config.include_singletons);
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[0].uid_column.as_deref(), Some("UID"));
        assert_eq!(config.columns[0].kind, ColumnKind::String);
        assert_eq!(config.priors.a, 2.0);
        assert_eq!(config.mapping["fname"], vec!["first_name".to_string()]);
    }

    #[test]
    fn test_overrides_beat_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xwalk.toml");
        std::fs::write(&path, "iterations = 50\n").unwrap();

        let overrides = ConfigOverrides {
            iterations: Some(9),
            ..ConfigOverrides::default()
        };
        let config = LinkageConfig::load(Some(path.to_str().unwrap()), overrides).unwrap();
        assert_eq!(config.iterations, 9);
    }

    #[test]
    fn test_source_format_serde() {
        let json = serde_json::to_string(&SourceFormat::Tsv).unwrap();
        assert_eq!(json, "\"tsv\"");

        let format: SourceFormat = serde_json::from_str("\"auto\"").unwrap();
        assert_eq!(format, SourceFormat::Auto);
    }

    #[test]
    fn test_builder_builds_validated_config() {
        let config = ConfigBuilder::new()
            .source(SourceFile::new("a.csv").with_uid_column("uid"))
            .source(SourceFile::new("b.csv"))
            .column(ColumnSpec::string("fname"))
            .column(ColumnSpec::categorical("by"))
            .map_column("fname", ["first_name"])
            .map_column("by", ["birth_year"])
            .priors(2.0, 500.0)
            .iterations(50)
            .include_singletons(true)
            .scratch_root("/tmp/xwalk")
            .build()
            .unwrap();

        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.columns.len(), 2);
        assert_eq!(config.mapping["by"], vec!["birth_year".to_string()]);
        assert_eq!(config.priors.a, 2.0);
        assert_eq!(config.iterations, 50);
        assert!(config.include_singletons);
        assert_eq!(config.scratch_root.as_deref(), Some("/tmp/xwalk".as_ref()));
    }

    #[test]
    fn test_builder_rejects_incomplete_config() {
        let result = ConfigBuilder::new()
            .source(SourceFile::new("a.csv"))
            .column(ColumnSpec::string("fname"))
            .build();
        match result {
            Err(LinkageError::IncompleteConfig { sources }) => assert_eq!(sources, 1),
            other => panic!("expected IncompleteConfig, got {:?}", other),
        }
    }
}
