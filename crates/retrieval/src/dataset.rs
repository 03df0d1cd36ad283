//! Passage datasets on disk.
//!
//! A dataset lives under `<data_dir>/<dataset>/` as either
//! `<dataset_name>.<split>.jsonl` (one passage object per line) or
//! `<dataset_name>.<split>.tsv` (`id`, `text`, `title` columns with a
//! header row, the psgs_w100 layout).

use crate::types::Passage;
use ragqa_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

/// Suffix of dataset names that ship without precomputed embeddings.
pub const NO_EMBEDDINGS_SUFFIX: &str = "_no_embeddings";

/// Identifies a dataset split.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatasetSpec {
    pub dataset: String,
    pub dataset_name: String,
    pub split: String,
}

impl DatasetSpec {
    pub fn new(
        dataset: impl Into<String>,
        dataset_name: impl Into<String>,
        split: impl Into<String>,
    ) -> Self {
        Self {
            dataset: dataset.into(),
            dataset_name: dataset_name.into(),
            split: split.into(),
        }
    }

    /// `<dataset_name>.<split>`
    pub fn file_stem(&self) -> String {
        format!("{}.{}", self.dataset_name, self.split)
    }

    /// Datasets without embeddings can only be indexed at load time.
    pub fn requires_on_the_fly(&self) -> bool {
        self.dataset_name.ends_with(NO_EMBEDDINGS_SUFFIX)
    }

    /// Path a JSONL rendition of this dataset would use.
    pub fn jsonl_path(&self, data_dir: &Path) -> PathBuf {
        data_dir
            .join(&self.dataset)
            .join(format!("{}.jsonl", self.file_stem()))
    }

    /// Find the dataset file, preferring JSONL over TSV.
    pub fn locate(&self, data_dir: &Path) -> AppResult<PathBuf> {
        let dir = data_dir.join(&self.dataset);
        for ext in ["jsonl", "tsv"] {
            let candidate = dir.join(format!("{}.{}", self.file_stem(), ext));
            if candidate.is_file() {
                return Ok(candidate);
            }
        }

        Err(AppError::Retrieval(format!(
            "Dataset '{}' not found: expected {}.jsonl or {}.tsv under {:?}",
            self,
            self.file_stem(),
            self.file_stem(),
            dir
        )))
    }
}

impl std::fmt::Display for DatasetSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.dataset, self.file_stem())
    }
}

/// JSONL row; ids may be numbers or strings.
#[derive(Debug, Deserialize)]
struct JsonlRow {
    id: serde_json::Value,
    #[serde(default)]
    title: String,
    text: String,
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}

/// Load every passage from a dataset file.
pub fn load_passages(path: &Path) -> AppResult<Vec<Passage>> {
    let file = fs::File::open(path).map_err(|e| {
        AppError::Retrieval(format!("Failed to open dataset {:?}: {}", path, e))
    })?;
    let reader = BufReader::new(file);

    let passages = match path.extension().and_then(|s| s.to_str()) {
        Some("jsonl") => parse_jsonl(reader, path)?,
        Some("tsv") => parse_tsv(reader, path)?,
        other => {
            return Err(AppError::Retrieval(format!(
                "Unsupported dataset format {:?} for {:?}",
                other, path
            )))
        }
    };

    reject_duplicate_ids(&passages, path)?;

    tracing::debug!("Loaded {} passages from {:?}", passages.len(), path);
    Ok(passages)
}

/// Passage ids key the index, so each must appear once.
fn reject_duplicate_ids(passages: &[Passage], path: &Path) -> AppResult<()> {
    let mut seen = HashSet::with_capacity(passages.len());
    for passage in passages {
        if !seen.insert(passage.id.as_str()) {
            return Err(AppError::Retrieval(format!(
                "Duplicate passage id '{}' in {:?}",
                passage.id, path
            )));
        }
    }
    Ok(())
}

fn parse_jsonl(reader: impl BufRead, path: &Path) -> AppResult<Vec<Passage>> {
    let mut passages = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let row: JsonlRow = serde_json::from_str(&line).map_err(|e| {
            AppError::Retrieval(format!("{:?} line {}: {}", path, line_no + 1, e))
        })?;

        let id = match row.id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };

        passages.push(Passage {
            id,
            title: row.title,
            text: row.text,
            embedding: row.embedding,
        });
    }

    Ok(passages)
}

fn parse_tsv(reader: impl BufRead, path: &Path) -> AppResult<Vec<Passage>> {
    let mut lines = reader.lines();

    let header = match lines.next() {
        Some(line) => line?,
        None => return Ok(Vec::new()),
    };
    let columns: Vec<&str> = header.split('\t').map(str::trim).collect();
    let column = |name: &str| {
        columns.iter().position(|c| *c == name).ok_or_else(|| {
            AppError::Retrieval(format!("{:?}: missing '{}' column in header", path, name))
        })
    };
    let (id_col, text_col, title_col) = (column("id")?, column("text")?, column("title")?);

    let mut passages = Vec::new();
    for (line_no, line) in lines.enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != columns.len() {
            return Err(AppError::Retrieval(format!(
                "{:?} line {}: expected {} columns, found {}",
                path,
                line_no + 2,
                columns.len(),
                fields.len()
            )));
        }

        passages.push(Passage::new(
            unquote(fields[id_col]),
            unquote(fields[title_col]),
            unquote(fields[text_col]),
        ));
    }

    Ok(passages)
}

/// Strip CSV-style quoting (`"..."` with `""` escapes).
fn unquote(field: &str) -> String {
    let field = field.trim();
    if field.len() >= 2 && field.starts_with('"') && field.ends_with('"') {
        field[1..field.len() - 1].replace("\"\"", "\"")
    } else {
        field.to_string()
    }
}

/// Write passages as a JSONL dataset, creating parent directories.
pub fn write_jsonl(path: &Path, passages: &[Passage]) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = std::io::BufWriter::new(fs::File::create(path)?);
    for passage in passages {
        serde_json::to_writer(&mut file, passage)?;
        file.write_all(b"\n")?;
    }
    file.flush()?;

    tracing::debug!("Wrote {} passages to {:?}", passages.len(), path);
    Ok(())
}

/// Hex SHA-256 of a dataset file.
pub fn fingerprint(path: &Path) -> AppResult<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn spec() -> DatasetSpec {
        DatasetSpec::new("wiki_dpr", "psgs_w100", "train")
    }

    #[test]
    fn test_locate_prefers_jsonl() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("wiki_dpr");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("psgs_w100.train.tsv"), "id\ttext\ttitle\n").unwrap();
        fs::write(dir.join("psgs_w100.train.jsonl"), "").unwrap();

        let path = spec().locate(temp.path()).unwrap();
        assert!(path.ends_with("psgs_w100.train.jsonl"));
    }

    #[test]
    fn test_locate_missing_dataset() {
        let temp = TempDir::new().unwrap();
        let err = spec().locate(temp.path()).unwrap_err();
        assert!(err.to_string().contains("wiki_dpr/psgs_w100.train"));
    }

    #[test]
    fn test_no_embeddings_suffix() {
        assert!(!spec().requires_on_the_fly());
        let dummy = DatasetSpec::new("wiki_dpr", "dummy_psgs_w100_no_embeddings", "train");
        assert!(dummy.requires_on_the_fly());
    }

    #[test]
    fn test_parse_tsv_with_quotes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("p.tsv");
        fs::write(
            &path,
            "id\ttext\ttitle\n1\t\"Aaron ( or ; \"\"Aharon\"\") was a prophet\"\tAaron\n\n2\tplain text\t\"Title\"\n",
        )
        .unwrap();

        let passages = load_passages(&path).unwrap();
        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0].text, "Aaron ( or ; \"Aharon\") was a prophet");
        assert_eq!(passages[1].title, "Title");
        assert!(passages[0].embedding.is_none());
    }

    #[test]
    fn test_parse_tsv_column_mismatch() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("p.tsv");
        fs::write(&path, "id\ttext\ttitle\n1\tonly two\n").unwrap();

        let err = load_passages(&path).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_parse_jsonl_numeric_ids_and_embeddings() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("p.jsonl");
        fs::write(
            &path,
            "{\"id\": 7, \"title\": \"T\", \"text\": \"x\", \"embedding\": [0.5, 0.5]}\n{\"id\": \"b\", \"text\": \"y\"}\n",
        )
        .unwrap();

        let passages = load_passages(&path).unwrap();
        assert_eq!(passages[0].id, "7");
        assert_eq!(passages[0].embedding, Some(vec![0.5, 0.5]));
        assert_eq!(passages[1].id, "b");
        assert_eq!(passages[1].title, "");
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("p.tsv");
        fs::write(
            &path,
            "id\ttext\ttitle\n1\tfirst\tA\n2\tsecond\tB\n1\tthird\tC\n",
        )
        .unwrap();

        let err = load_passages(&path).unwrap_err();
        assert!(matches!(err, AppError::Retrieval(_)));
        assert!(err.to_string().contains("Duplicate passage id '1'"));
    }

    #[test]
    fn test_write_then_load_jsonl() {
        let temp = TempDir::new().unwrap();
        let path = spec().jsonl_path(temp.path());
        let passages = vec![Passage::new("1", "Isaac Newton", "Newton and Leibniz")];

        write_jsonl(&path, &passages).unwrap();
        assert_eq!(load_passages(&path).unwrap(), passages);
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("p.jsonl");

        fs::write(&path, "a").unwrap();
        let first = fingerprint(&path).unwrap();
        assert_eq!(first.len(), 64);

        fs::write(&path, "b").unwrap();
        assert_ne!(first, fingerprint(&path).unwrap());
    }
}
