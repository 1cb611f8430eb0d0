//! Canonical schema resolution.
//!
//! The first source file declares the canonical schema; every later file
//! must map each canonical column to one of its own columns. Resolution is
//! pure (no file I/O) and collects every violation before failing, so one
//! pass over the error output fixes the whole configuration.

use crate::config::LinkageConfig;
use crate::error::LinkageError;
use crate::model::{ColumnKind, ColumnSpec, ROW_ID_COLUMN};
use hashbrown::HashSet;

/// The resolved canonical schema: canonical columns in exchange order and,
/// for every source file, the actual column name backing each canonical
/// position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSchema {
    canonical: Vec<ColumnSpec>,
    /// `per_file[file_position][canonical_position]` -> actual column name.
    per_file: Vec<Vec<String>>,
}

impl ResolvedSchema {
    /// Resolve the schema declared by `config`.
    ///
    /// Fails with a `Config` error listing every missing or malformed
    /// mapping. The first file always resolves to the canonical names
    /// themselves.
    pub fn resolve(config: &LinkageConfig) -> Result<Self, LinkageError> {
        let mut violations = Vec::new();

        let mut seen: HashSet<&str> = HashSet::with_capacity(config.columns.len());
        for (i, column) in config.columns.iter().enumerate() {
            if column.name.is_empty() {
                violations.push(format!("canonical column {} has an empty name", i + 1));
                continue;
            }
            if column.name == ROW_ID_COLUMN {
                violations.push(format!(
                    "canonical column '{}' collides with the exchange row-id column",
                    column.name
                ));
            }
            if !seen.insert(column.name.as_str()) {
                violations.push(format!("duplicate canonical column '{}'", column.name));
            }
        }

        for key in config.mapping.keys() {
            if !config.columns.iter().any(|c| &c.name == key) {
                violations.push(format!(
                    "mapping references unknown canonical column '{}'",
                    key
                ));
            }
        }

        let tail_files = config.sources.len().saturating_sub(1);
        for column in &config.columns {
            match config.mapping.get(&column.name) {
                Some(names) if names.len() == tail_files => {}
                Some(names) => violations.push(format!(
                    "mapping for '{}' lists {} columns, expected {} (one per file after the first)",
                    column.name,
                    names.len(),
                    tail_files
                )),
                None if tail_files == 0 => {}
                None => violations.push(format!(
                    "no mapping for canonical column '{}' (required for files after the first)",
                    column.name
                )),
            }
        }

        if !violations.is_empty() {
            return Err(LinkageError::Config { violations });
        }

        let canonical_names: Vec<String> =
            config.columns.iter().map(|c| c.name.clone()).collect();
        let mut per_file = Vec::with_capacity(config.sources.len());
        per_file.push(canonical_names);
        for file in 1..config.sources.len() {
            let actual = config
                .columns
                .iter()
                .map(|c| config.mapping[&c.name][file - 1].clone())
                .collect();
            per_file.push(actual);
        }

        Ok(Self {
            canonical: config.columns.clone(),
            per_file,
        })
    }

    /// Canonical columns in exchange order.
    pub fn canonical(&self) -> &[ColumnSpec] {
        &self.canonical
    }

    /// Number of canonical columns.
    pub fn width(&self) -> usize {
        self.canonical.len()
    }

    /// Number of source files the schema was resolved against.
    pub fn file_count(&self) -> usize {
        self.per_file.len()
    }

    /// Actual column names backing each canonical position in the file at
    /// the given 0-based declaration position.
    pub fn actual_columns(&self, file_position: usize) -> &[String] {
        &self.per_file[file_position]
    }

    /// Canonical names of string-compared columns, in exchange order.
    pub fn string_columns(&self) -> Vec<String> {
        self.columns_of_kind(ColumnKind::String)
    }

    /// Canonical names of categorically-compared columns, in exchange order.
    pub fn categorical_columns(&self) -> Vec<String> {
        self.columns_of_kind(ColumnKind::Categorical)
    }

    fn columns_of_kind(&self, kind: ColumnKind) -> Vec<String> {
        self.canonical
            .iter()
            .filter(|c| c.kind == kind)
            .map(|c| c.name.clone())
            .collect()
    }
}
