//! Record harmonization.
//!
//! Streams every registered source file in declaration order, reorders each
//! row into canonical column order, and assigns strictly increasing global
//! sequence ids. The parallel `file_index` sidecar records which file every
//! sequence id came from; the crosswalk replay validates against it later.
//!
//! Readers hang off the [`RowSource`] trait so new input formats plug in
//! without touching the harmonizer. Delimited text with a header row is the
//! one format shipped here.

use crate::config::{LinkageConfig, SourceFile, SourceFormat};
use crate::error::LinkageError;
use crate::model::{FileIndex, SeqId};
use crate::schema::ResolvedSchema;
use hashbrown::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One raw row from a source file, in the file's own column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    pub values: Vec<String>,
    /// 1-based line of the row in the file, 0 when unknown.
    pub line: u64,
}

/// A streaming reader over one source file.
///
/// Implementations yield rows in file order and must be deterministic:
/// the crosswalk builder re-opens sources through this trait and expects
/// the same rows in the same order as harmonization saw.
pub trait RowSource {
    /// Header names in the file's own order.
    fn headers(&self) -> &[String];
    /// Next row, or a read/parse failure attributed to the file.
    fn next_row(&mut self) -> Option<Result<SourceRow, LinkageError>>;
}

/// Open a reader for `source`, resolving `Auto` formats from the file
/// extension. Unrecognized formats fail here, at first use.
pub fn open_source(
    source: &SourceFile,
    file_index: FileIndex,
) -> Result<Box<dyn RowSource>, LinkageError> {
    let delimiter = match source.format {
        SourceFormat::Csv => b',',
        SourceFormat::Tsv => b'\t',
        SourceFormat::Auto => match extension_of(&source.path).as_deref() {
            Some("csv") => b',',
            Some("tsv") => b'\t',
            _ => {
                return Err(LinkageError::UnsupportedSource {
                    path: source.path.clone(),
                })
            }
        },
    };
    let reader = DelimitedSource::open(&source.path, delimiter, file_index)?;
    Ok(Box::new(reader))
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Delimited text reader with a mandatory header row.
///
/// Rows whose field count disagrees with the header surface as `Source`
/// errors with the offending line.
pub struct DelimitedSource {
    headers: Vec<String>,
    records: csv::StringRecordsIntoIter<File>,
    file_index: FileIndex,
    path: PathBuf,
}

impl DelimitedSource {
    pub fn open(path: &Path, delimiter: u8, file_index: FileIndex) -> Result<Self, LinkageError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(delimiter)
            .from_path(path)
            .map_err(|e| LinkageError::Source {
                file_index,
                path: path.to_path_buf(),
                line: None,
                message: e.to_string(),
            })?;
        let headers = reader
            .headers()
            .map_err(|e| LinkageError::Source {
                file_index,
                path: path.to_path_buf(),
                line: Some(1),
                message: e.to_string(),
            })?
            .iter()
            .map(|h| h.to_string())
            .collect();
        Ok(Self {
            headers,
            records: reader.into_records(),
            file_index,
            path: path.to_path_buf(),
        })
    }
}

impl RowSource for DelimitedSource {
    fn headers(&self) -> &[String] {
        &self.headers
    }

    fn next_row(&mut self) -> Option<Result<SourceRow, LinkageError>> {
        match self.records.next()? {
            Ok(record) => {
                let line = record.position().map(|p| p.line()).unwrap_or(0);
                Some(Ok(SourceRow {
                    values: record.iter().map(|v| v.to_string()).collect(),
                    line,
                }))
            }
            Err(e) => {
                let line = e.position().map(|p| p.line());
                Some(Err(LinkageError::Source {
                    file_index: self.file_index,
                    path: self.path.clone(),
                    line,
                    message: e.to_string(),
                }))
            }
        }
    }
}

/// One harmonized record: canonical-order values plus provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarmonizedRecord {
    pub seq: SeqId,
    pub file_index: FileIndex,
    /// Raw value of the source's uid column, when one is declared.
    pub uid: Option<String>,
    /// Values in canonical column order.
    pub values: Vec<String>,
}

/// The harmonized record stream plus its provenance sidecar.
///
/// `file_index[s]` is the file that contributed sequence id `s`. Records
/// are immutable once harmonized; later stages refer to them by sequence
/// id only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarmonizedStream {
    pub records: Vec<HarmonizedRecord>,
    pub file_index: Vec<FileIndex>,
    /// Records contributed by each file, in declaration order.
    pub file_counts: Vec<usize>,
}

impl HarmonizedStream {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Recorded provenance for a sequence id, if it exists.
    pub fn file_index_of(&self, seq: SeqId) -> Option<FileIndex> {
        self.file_index.get(seq.0 as usize).copied()
    }
}

/// Stream all sources in declaration order into one canonical record
/// stream. Fails fast on the first unreadable file; missing mapped columns
/// are collected per file and reported together.
pub fn harmonize(
    config: &LinkageConfig,
    schema: &ResolvedSchema,
) -> Result<HarmonizedStream, LinkageError> {
    if config.sources.len() < 2 {
        return Err(LinkageError::IncompleteConfig {
            sources: config.sources.len(),
        });
    }

    let mut records = Vec::new();
    let mut file_index_sidecar = Vec::new();
    let mut file_counts = Vec::with_capacity(config.sources.len());
    let mut next_seq: u32 = 0;

    for (position, source) in config.sources.iter().enumerate() {
        let file_index = FileIndex::from_position(position);
        let mut rows = open_source(source, file_index)?;
        let layout = FileLayout::resolve(
            rows.headers(),
            schema.actual_columns(position),
            source,
            file_index,
        )?;

        let mut count = 0usize;
        while let Some(row) = rows.next_row() {
            let row = row?;
            let seq = SeqId(next_seq);
            next_seq += 1;
            records.push(HarmonizedRecord {
                seq,
                file_index,
                uid: layout.uid_position.map(|p| row.values[p].clone()),
                values: layout
                    .positions
                    .iter()
                    .map(|&p| row.values[p].clone())
                    .collect(),
            });
            file_index_sidecar.push(file_index);
            count += 1;
        }
        file_counts.push(count);
        debug!(
            file = %file_index,
            path = %source.path.display(),
            rows = count,
            "harmonized source"
        );
    }

    Ok(HarmonizedStream {
        records,
        file_index: file_index_sidecar,
        file_counts,
    })
}

/// Where each canonical column (and the uid column) sits in one file.
struct FileLayout {
    positions: Vec<usize>,
    uid_position: Option<usize>,
}

impl FileLayout {
    fn resolve(
        headers: &[String],
        wanted: &[String],
        source: &SourceFile,
        file_index: FileIndex,
    ) -> Result<Self, LinkageError> {
        let mut by_name: HashMap<&str, usize> = HashMap::with_capacity(headers.len());
        for (i, header) in headers.iter().enumerate() {
            // First occurrence wins when a header repeats.
            by_name.entry(header.as_str()).or_insert(i);
        }

        let mut violations = Vec::new();
        let mut positions = Vec::with_capacity(wanted.len());
        for name in wanted {
            match by_name.get(name.as_str()) {
                Some(&p) => positions.push(p),
                None => violations.push(format!(
                    "file {} ({}): missing column '{}'",
                    file_index.0,
                    source.path.display(),
                    name
                )),
            }
        }

        let uid_position = match &source.uid_column {
            Some(name) => match by_name.get(name.as_str()) {
                Some(&p) => Some(p),
                None => {
                    violations.push(format!(
                        "file {} ({}): missing uid column '{}'",
                        file_index.0,
                        source.path.display(),
                        name
                    ));
                    None
                }
            },
            None => None,
        };

        if violations.is_empty() {
            Ok(Self {
                positions,
                uid_position,
            })
        } else {
            Err(LinkageError::Config { violations })
        }
    }
}
