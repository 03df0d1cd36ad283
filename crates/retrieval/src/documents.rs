//! Turn a directory of text files into a passage dataset.

use crate::dataset;
use crate::types::Passage;
use ragqa_core::{AppError, AppResult};
use std::path::Path;
use walkdir::WalkDir;

/// Words per passage, as in psgs_w100.
pub const PASSAGE_WORDS: usize = 100;

const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "text"];

/// Summary of an ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub files: usize,
    pub passages: usize,
}

/// Split every text file under `source` into 100-word passages and
/// write them as a JSONL dataset to `output`.
///
/// The passage title is the file stem. Files are visited in path order
/// so passage ids are stable across runs.
pub fn index_documents(source: &Path, output: &Path) -> AppResult<IngestStats> {
    if !source.is_dir() {
        return Err(AppError::Retrieval(format!(
            "Document directory not found: {:?}",
            source
        )));
    }

    let mut passages = Vec::new();
    let mut files = 0;

    for entry in WalkDir::new(source)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() || !is_text_file(path) {
            continue;
        }

        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Skipping {:?}: {}", path, e);
                continue;
            }
        };

        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().replace(['_', '-'], " "))
            .unwrap_or_default();

        let before = passages.len();
        for body in split_passages(&text, PASSAGE_WORDS) {
            let id = (passages.len() + 1).to_string();
            passages.push(Passage::new(id, title.clone(), body));
        }

        tracing::debug!("{:?}: {} passages", path, passages.len() - before);
        files += 1;
    }

    dataset::write_jsonl(output, &passages)?;

    tracing::info!(
        "Wrote {} passages from {} files to {:?}",
        passages.len(),
        files,
        output
    );

    Ok(IngestStats {
        files,
        passages: passages.len(),
    })
}

fn is_text_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| TEXT_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Split text into passages of at most `words` whitespace-separated words.
pub fn split_passages(text: &str, words: usize) -> Vec<String> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    tokens
        .chunks(words.max(1))
        .map(|chunk| chunk.join(" "))
        .collect()
}
