//! Exchange corpus writer.
//!
//! Serializes the harmonized stream into the single CSV the matching
//! oracle consumes: canonical columns in exchange order plus a trailing
//! row-id column carrying each record's sequence id. The file is committed
//! atomically (written to a `.tmp` sibling, then renamed) so the corpus
//! path never holds a partial artifact.

use crate::error::LinkageError;
use crate::harmonize::HarmonizedStream;
use crate::model::ROW_ID_COLUMN;
use crate::schema::ResolvedSchema;
use crate::scratch::ScratchDir;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of the committed exchange corpus inside the scratch dir.
pub const CORPUS_FILE: &str = "corpus.csv";

/// Write the exchange corpus and return its committed path.
///
/// On any failure the `.tmp` sibling is removed (best effort) and the
/// final path is left untouched.
pub fn write_corpus(
    scratch: &ScratchDir,
    schema: &ResolvedSchema,
    stream: &HarmonizedStream,
) -> Result<PathBuf, LinkageError> {
    let final_path = scratch.file(CORPUS_FILE);
    let tmp_path = scratch.file(&format!("{}.tmp", CORPUS_FILE));

    if let Err(e) = write_rows(&tmp_path, schema, stream) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    if let Err(e) = fs::rename(&tmp_path, &final_path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(LinkageError::WriteFailed {
            path: final_path,
            message: e.to_string(),
        });
    }

    debug!(
        path = %final_path.display(),
        rows = stream.len(),
        columns = schema.width() + 1,
        "exchange corpus committed"
    );
    Ok(final_path)
}

fn write_rows(
    tmp_path: &Path,
    schema: &ResolvedSchema,
    stream: &HarmonizedStream,
) -> Result<(), LinkageError> {
    let write_failed = |e: String| LinkageError::WriteFailed {
        path: tmp_path.to_path_buf(),
        message: e,
    };

    let file = fs::File::create(tmp_path).map_err(|e| write_failed(e.to_string()))?;
    let mut writer = csv::Writer::from_writer(file);

    let mut header: Vec<&str> = schema.canonical().iter().map(|c| c.name.as_str()).collect();
    header.push(ROW_ID_COLUMN);
    writer
        .write_record(&header)
        .map_err(|e| write_failed(e.to_string()))?;

    for record in &stream.records {
        let mut row = record.values.clone();
        row.push(record.seq.0.to_string());
        writer
            .write_record(&row)
            .map_err(|e| write_failed(e.to_string()))?;
    }

    writer.flush().map_err(|e| write_failed(e.to_string()))?;
    let file = writer
        .into_inner()
        .map_err(|e| write_failed(e.to_string()))?;
    file.sync_all().map_err(|e| write_failed(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harmonize::HarmonizedRecord;
    use crate::config::{LinkageConfig, SourceFile};
    use crate::model::{ColumnSpec, FileIndex, SeqId};
    use std::collections::BTreeMap;

    fn tiny_schema() -> ResolvedSchema {
        let config = LinkageConfig {
            sources: vec![SourceFile::new("a.csv"), SourceFile::new("b.csv")],
            columns: vec![ColumnSpec::string("name"), ColumnSpec::categorical("year")],
            mapping: BTreeMap::from([
                ("name".to_string(), vec!["name".to_string()]),
                ("year".to_string(), vec!["year".to_string()]),
            ]),
            ..LinkageConfig::default()
        };
        ResolvedSchema::resolve(&config).unwrap()
    }

    fn tiny_stream() -> HarmonizedStream {
        let records = vec![
            HarmonizedRecord {
                seq: SeqId(0),
                file_index: FileIndex(1),
                uid: Some("u1".into()),
                values: vec!["ann".into(), "1980".into()],
            },
            HarmonizedRecord {
                seq: SeqId(1),
                file_index: FileIndex(2),
                uid: Some("x1".into()),
                values: vec!["bob, jr".into(), "1975".into()],
            },
        ];
        HarmonizedStream {
            file_index: records.iter().map(|r| r.file_index).collect(),
            file_counts: vec![1, 1],
            records,
        }
    }

    #[test]
    fn test_corpus_has_canonical_header_plus_row_id() {
        let root = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::create(Some(root.path())).unwrap();
        let path = write_corpus(&scratch, &tiny_schema(), &tiny_stream()).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next(), Some("name,year,__row_id"));
        assert_eq!(lines.next(), Some("ann,1980,0"));
        // Values containing the delimiter stay intact through quoting.
        assert_eq!(lines.next(), Some("\"bob, jr\",1975,1"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_commit_leaves_no_tmp_sibling() {
        let root = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::create(Some(root.path())).unwrap();
        let path = write_corpus(&scratch, &tiny_schema(), &tiny_stream()).unwrap();

        assert!(path.is_file());
        assert!(!scratch.file("corpus.csv.tmp").exists());
    }

    #[test]
    fn test_failed_write_keeps_final_path_absent() {
        let root = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::create(Some(root.path())).unwrap();
        // Remove the scratch dir out from under the writer to force an error.
        fs::remove_dir_all(scratch.path()).unwrap();

        match write_corpus(&scratch, &tiny_schema(), &tiny_stream()) {
            Err(LinkageError::WriteFailed { .. }) => {}
            other => panic!("expected WriteFailed, got {:?}", other),
        }
        assert!(!scratch.file(CORPUS_FILE).exists());
    }
}
