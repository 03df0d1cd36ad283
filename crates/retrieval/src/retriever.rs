//! Dense passage retriever.
//!
//! Two index kinds are supported:
//! - `exact`: a persisted SQLite index under
//!   `<index_dir>/<dataset>/<dataset_name>.<split>.sqlite`
//! - `on_the_fly`: every passage is embedded when the retriever opens
//!   and kept in an in-memory index
//!
//! Datasets whose name ends in `_no_embeddings` are always indexed on
//! the fly.

use crate::dataset::{self, DatasetSpec};
use crate::embeddings::{EmbeddingConfig, EmbeddingProvider};
use crate::index::SqliteIndex;
use crate::truncate::ContextTruncator;
use crate::types::{IndexMetadata, IndexStats, Passage, RetrievedDoc};
use chrono::Utc;
use ragqa_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;

/// How passages are indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    Exact,
    OnTheFly,
}

impl IndexKind {
    pub fn parse(name: &str) -> AppResult<Self> {
        match name {
            "exact" => Ok(Self::Exact),
            "on_the_fly" | "on-the-fly" => Ok(Self::OnTheFly),
            other => Err(AppError::Config(format!(
                "Unknown index name: '{}'. Supported: exact, on_the_fly",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::OnTheFly => "on_the_fly",
        }
    }
}

/// Where a retriever finds its dataset and index.
#[derive(Debug, Clone)]
pub struct RetrieverSettings {
    pub dataset: DatasetSpec,
    pub index_name: String,
    pub data_dir: PathBuf,
    pub index_dir: PathBuf,

    /// Passages are truncated to this many context tokens before embedding
    pub max_passage_tokens: usize,

    /// Passages embedded per provider call
    pub batch_size: usize,
}

impl RetrieverSettings {
    /// Effective index kind for this dataset.
    pub fn index_kind(&self) -> AppResult<IndexKind> {
        let requested = IndexKind::parse(&self.index_name)?;
        if self.dataset.requires_on_the_fly() && requested == IndexKind::Exact {
            tracing::debug!(
                "Dataset '{}' has no embeddings, indexing on the fly",
                self.dataset
            );
            return Ok(IndexKind::OnTheFly);
        }
        Ok(requested)
    }

    /// Location of the persisted index.
    pub fn index_path(&self) -> PathBuf {
        self.index_dir
            .join(&self.dataset.dataset)
            .join(format!("{}.sqlite", self.dataset.file_stem()))
    }
}

/// Retrieves the passages closest to question embeddings.
#[derive(Debug)]
pub struct Retriever {
    index: SqliteIndex,
    kind: IndexKind,
    dataset: DatasetSpec,
}

impl Retriever {
    /// Open the retriever, indexing the dataset first when required.
    pub async fn open(
        settings: &RetrieverSettings,
        encoder: &dyn EmbeddingProvider,
        truncator: &dyn ContextTruncator,
    ) -> AppResult<Self> {
        let kind = settings.index_kind()?;

        let index = match kind {
            IndexKind::OnTheFly => {
                let path = settings.dataset.locate(&settings.data_dir)?;
                let mut passages = dataset::load_passages(&path)?;
                tracing::info!(
                    "Indexing {} passages of '{}' on the fly",
                    passages.len(),
                    settings.dataset
                );

                embed_passages(&mut passages, encoder, truncator, settings).await?;

                let mut index = SqliteIndex::open_in_memory()?;
                index.insert_passages(&passages)?;
                index.write_metadata(&encoder_metadata(encoder, None))?;
                index
            }
            IndexKind::Exact => open_exact(settings, encoder)?,
        };

        if index.is_empty()? {
            return Err(AppError::Retrieval(format!(
                "Index for dataset '{}' contains no passages",
                settings.dataset
            )));
        }

        Ok(Self {
            index,
            kind,
            dataset: settings.dataset.clone(),
        })
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn dataset(&self) -> &DatasetSpec {
        &self.dataset
    }

    /// Top `n_docs` passages per question, best first.
    pub fn retrieve(
        &self,
        question_embeddings: &[Vec<f32>],
        n_docs: usize,
    ) -> AppResult<Vec<Vec<RetrievedDoc>>> {
        let results = self.index.search_batch(question_embeddings, n_docs)?;

        Ok(results
            .into_iter()
            .map(|docs| {
                docs.into_iter()
                    .map(|(mut passage, score)| {
                        // Vectors are not needed past ranking
                        passage.embedding = None;
                        RetrievedDoc { passage, score }
                    })
                    .collect()
            })
            .collect())
    }

    pub fn stats(&self) -> AppResult<IndexStats> {
        stats_for(&self.index, &self.dataset, self.kind)
    }
}

/// Open a persisted index, or build one from embeddings shipped with
/// the dataset.
fn open_exact(
    settings: &RetrieverSettings,
    encoder: &dyn EmbeddingProvider,
) -> AppResult<SqliteIndex> {
    let index_path = settings.index_path();
    let dataset_path = settings.dataset.locate(&settings.data_dir).ok();

    if index_path.exists() {
        let index = SqliteIndex::open(&index_path)?;
        let metadata = index.metadata()?.ok_or_else(|| {
            AppError::Retrieval(format!(
                "Index {:?} has no metadata; rebuild it with `ragqa index build`",
                index_path
            ))
        })?;
        check_encoder(encoder, &metadata)?;

        match (&dataset_path, &metadata.dataset_fingerprint) {
            (Some(path), Some(stored)) => {
                if dataset::fingerprint(path)? != *stored {
                    return Err(AppError::Retrieval(format!(
                        "Index {:?} is stale: dataset {:?} changed since it was built. Run `ragqa index build`",
                        index_path, path
                    )));
                }
            }
            (None, _) => tracing::debug!(
                "Dataset file for '{}' not found, using index as is",
                settings.dataset
            ),
            _ => {}
        }

        tracing::debug!("Opened exact index {:?}", index_path);
        return Ok(index);
    }

    let path = dataset_path.ok_or_else(|| {
        AppError::Retrieval(format!(
            "No index at {:?} and dataset '{}' not found under {:?}",
            index_path, settings.dataset, settings.data_dir
        ))
    })?;
    let passages = dataset::load_passages(&path)?;

    let precomputed = !passages.is_empty() && passages.iter().all(|p| p.embedding.is_some());
    if !precomputed {
        return Err(AppError::Retrieval(format!(
            "Dataset '{}' has no precomputed embeddings and no index exists at {:?}. Run `ragqa index build`",
            settings.dataset, index_path
        )));
    }

    for passage in &passages {
        let dims = passage.embedding.as_ref().map_or(0, Vec::len);
        if dims != encoder.dimensions() {
            return Err(AppError::Retrieval(format!(
                "Passage '{}' has a {}-dimensional embedding, question encoder produces {}",
                passage.id,
                dims,
                encoder.dimensions()
            )));
        }
    }

    tracing::info!(
        "Building exact index for '{}' from {} precomputed embeddings",
        settings.dataset,
        passages.len()
    );

    let mut index = SqliteIndex::open(&index_path)?;
    index.insert_passages(&passages)?;
    index.write_metadata(&encoder_metadata(
        encoder,
        Some(dataset::fingerprint(&path)?),
    ))?;
    Ok(index)
}

/// Embed every passage of a dataset into its persisted index, replacing
/// previous contents.
pub async fn build_index(
    settings: &RetrieverSettings,
    encoder: &dyn EmbeddingProvider,
    truncator: &dyn ContextTruncator,
) -> AppResult<IndexStats> {
    let start = Instant::now();
    let path = settings.dataset.locate(&settings.data_dir)?;
    let mut passages = dataset::load_passages(&path)?;

    tracing::info!(
        "Building index for '{}' ({} passages) with {} ({})",
        settings.dataset,
        passages.len(),
        encoder.provider_name(),
        encoder.model_name()
    );

    embed_passages(&mut passages, encoder, truncator, settings).await?;

    let mut index = SqliteIndex::open(&settings.index_path())?;
    index.reset()?;
    index.insert_passages(&passages)?;
    index.write_metadata(&encoder_metadata(
        encoder,
        Some(dataset::fingerprint(&path)?),
    ))?;

    tracing::info!(
        "Indexed {} passages in {:.2}s",
        passages.len(),
        start.elapsed().as_secs_f64()
    );

    stats_for(&index, &settings.dataset, IndexKind::Exact)
}

/// Statistics for a persisted index.
pub fn index_stats(settings: &RetrieverSettings) -> AppResult<IndexStats> {
    let path = settings.index_path();
    if !path.exists() {
        return Err(AppError::Retrieval(format!(
            "No index for dataset '{}' at {:?}",
            settings.dataset, path
        )));
    }

    let index = SqliteIndex::open(&path)?;
    stats_for(&index, &settings.dataset, IndexKind::Exact)
}

/// Delete a persisted index. Returns whether a file was removed.
pub fn clean_index(settings: &RetrieverSettings) -> AppResult<bool> {
    let path = settings.index_path();
    if !path.exists() {
        return Ok(false);
    }

    std::fs::remove_file(&path)?;
    tracing::info!("Removed index {:?}", path);
    Ok(true)
}

async fn embed_passages(
    passages: &mut [Passage],
    encoder: &dyn EmbeddingProvider,
    truncator: &dyn ContextTruncator,
    settings: &RetrieverSettings,
) -> AppResult<()> {
    let batch_size = settings.batch_size.max(1);

    for batch in passages.chunks_mut(batch_size) {
        let texts = batch
            .iter()
            .map(|p| {
                let text = format!("{} {}", p.title, p.text);
                truncator.truncate(text.trim(), settings.max_passage_tokens)
            })
            .collect::<AppResult<Vec<_>>>()?;

        let embeddings = encoder.embed_batch(&texts).await?;
        if embeddings.len() != batch.len() {
            return Err(AppError::Retrieval(format!(
                "Encoder returned {} embeddings for {} passages",
                embeddings.len(),
                batch.len()
            )));
        }

        for (passage, embedding) in batch.iter_mut().zip(embeddings) {
            passage.embedding = Some(embedding);
        }
    }

    Ok(())
}

fn encoder_metadata(encoder: &dyn EmbeddingProvider, fingerprint: Option<String>) -> IndexMetadata {
    IndexMetadata {
        provider: encoder.provider_name().to_string(),
        model: encoder.model_name().to_string(),
        dimensions: encoder.dimensions(),
        dataset_fingerprint: fingerprint,
        built_at: Utc::now(),
    }
}

fn check_encoder(encoder: &dyn EmbeddingProvider, metadata: &IndexMetadata) -> AppResult<()> {
    let config = EmbeddingConfig {
        provider: encoder.provider_name().to_string(),
        model: encoder.model_name().to_string(),
        dimensions: encoder.dimensions(),
        ..EmbeddingConfig::default()
    };
    config.validate_against(metadata)
}

fn stats_for(index: &SqliteIndex, dataset: &DatasetSpec, kind: IndexKind) -> AppResult<IndexStats> {
    let db_size_bytes = index
        .path()
        .and_then(|p| std::fs::metadata(p).ok())
        .map(|m| m.len())
        .unwrap_or(0);

    Ok(IndexStats {
        dataset: dataset.to_string(),
        passages: index.len()?,
        kind: kind.as_str().to_string(),
        db_size_bytes,
        metadata: index.metadata()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::providers::TrigramProvider;
    use crate::truncate::WordTruncator;
    use std::fs;
    use tempfile::TempDir;

    fn corpus() -> Vec<Passage> {
        vec![
            Passage::new(
                "1",
                "Linda Davis",
                "Linda Kaye Davis is an American country music singer. Her highest chart entry is Does He Love You, her duet with Reba McEntire.",
            ),
            Passage::new(
                "2",
                "Isaac Newton",
                "Newton later became involved in a dispute with Leibniz over priority in the development of calculus.",
            ),
            Passage::new(
                "3",
                "Peripheral nervous system",
                "The peripheral nervous system consists of the nerves and ganglia outside the brain and spinal cord.",
            ),
        ]
    }

    fn settings(temp: &TempDir, dataset_name: &str, index_name: &str) -> RetrieverSettings {
        RetrieverSettings {
            dataset: DatasetSpec::new("wiki_dpr", dataset_name, "train"),
            index_name: index_name.to_string(),
            data_dir: temp.path().join("data"),
            index_dir: temp.path().join("indexes"),
            max_passage_tokens: 256,
            batch_size: 2,
        }
    }

    fn write_dataset(settings: &RetrieverSettings, passages: &[Passage]) {
        dataset::write_jsonl(&settings.dataset.jsonl_path(&settings.data_dir), passages).unwrap();
    }

    async fn embed_question(encoder: &TrigramProvider, question: &str) -> Vec<f32> {
        encoder.embed(question).await.unwrap()
    }

    #[test]
    fn test_index_kind_parse() {
        assert_eq!(IndexKind::parse("exact").unwrap(), IndexKind::Exact);
        assert_eq!(IndexKind::parse("on_the_fly").unwrap(), IndexKind::OnTheFly);
        assert!(IndexKind::parse("compressed").is_err());
    }

    #[test]
    fn test_no_embeddings_forces_on_the_fly() {
        let temp = TempDir::new().unwrap();
        let s = settings(&temp, "dummy_psgs_w100_no_embeddings", "exact");
        assert_eq!(s.index_kind().unwrap(), IndexKind::OnTheFly);
        assert!(s
            .index_path()
            .ends_with("wiki_dpr/dummy_psgs_w100_no_embeddings.train.sqlite"));
    }

    #[tokio::test]
    async fn test_on_the_fly_retrieves_relevant_passage() {
        let temp = TempDir::new().unwrap();
        let s = settings(&temp, "dummy_psgs_w100_no_embeddings", "exact");
        write_dataset(&s, &corpus());

        let encoder = TrigramProvider::new(384);
        let retriever = Retriever::open(&s, &encoder, &WordTruncator).await.unwrap();
        assert_eq!(retriever.kind(), IndexKind::OnTheFly);

        let question = embed_question(&encoder, "who sings does he love me with reba").await;
        let docs = retriever.retrieve(&[question], 2).unwrap();

        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].len(), 2);
        assert_eq!(docs[0][0].passage.title, "Linda Davis");
        assert!(docs[0][0].score >= docs[0][1].score);
        assert!(docs[0][0].passage.embedding.is_none());
    }

    #[tokio::test]
    async fn test_exact_requires_built_index() {
        let temp = TempDir::new().unwrap();
        let s = settings(&temp, "psgs_w100", "exact");
        write_dataset(&s, &corpus());

        let encoder = TrigramProvider::new(384);
        let err = Retriever::open(&s, &encoder, &WordTruncator)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ragqa index build"));
    }

    #[tokio::test]
    async fn test_build_then_open_exact_matches_on_the_fly() {
        let temp = TempDir::new().unwrap();
        let exact = settings(&temp, "psgs_w100", "exact");
        let on_the_fly = settings(&temp, "psgs_w100", "on_the_fly");
        write_dataset(&exact, &corpus());

        let encoder = TrigramProvider::new(384);
        let stats = build_index(&exact, &encoder, &WordTruncator).await.unwrap();
        assert_eq!(stats.passages, 3);
        assert_eq!(stats.kind, "exact");
        assert!(stats.db_size_bytes > 0);
        assert!(stats.metadata.unwrap().dataset_fingerprint.is_some());

        let persisted = Retriever::open(&exact, &encoder, &WordTruncator).await.unwrap();
        let transient = Retriever::open(&on_the_fly, &encoder, &WordTruncator)
            .await
            .unwrap();

        let question = embed_question(
            &encoder,
            "who were the two mathematicians that invented calculus",
        )
        .await;
        let a = persisted.retrieve(&[question.clone()], 3).unwrap();
        let b = transient.retrieve(&[question], 3).unwrap();

        let ids = |docs: &Vec<Vec<RetrievedDoc>>| -> Vec<String> {
            docs[0].iter().map(|d| d.passage.id.clone()).collect()
        };
        assert_eq!(ids(&a), ids(&b));
        assert_eq!(a[0][0].passage.title, "Isaac Newton");
    }

    #[tokio::test]
    async fn test_exact_uses_precomputed_embeddings() {
        let temp = TempDir::new().unwrap();
        let s = settings(&temp, "psgs_w100", "exact");
        let passages = vec![
            Passage {
                embedding: Some(vec![1.0, 0.0]),
                ..Passage::new("a", "A", "first")
            },
            Passage {
                embedding: Some(vec![0.0, 1.0]),
                ..Passage::new("b", "B", "second")
            },
        ];
        write_dataset(&s, &passages);

        let encoder = TrigramProvider::new(2);
        let retriever = Retriever::open(&s, &encoder, &WordTruncator).await.unwrap();
        assert!(s.index_path().exists());

        let docs = retriever.retrieve(&[vec![0.0, 1.0]], 1).unwrap();
        assert_eq!(docs[0][0].passage.id, "b");
    }

    #[tokio::test]
    async fn test_exact_rejects_encoder_mismatch() {
        let temp = TempDir::new().unwrap();
        let s = settings(&temp, "psgs_w100", "exact");
        write_dataset(&s, &corpus());

        build_index(&s, &TrigramProvider::new(384), &WordTruncator)
            .await
            .unwrap();

        let err = Retriever::open(&s, &TrigramProvider::new(128), &WordTruncator)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Dimension mismatch"));
    }

    #[tokio::test]
    async fn test_exact_detects_stale_dataset() {
        let temp = TempDir::new().unwrap();
        let s = settings(&temp, "psgs_w100", "exact");
        write_dataset(&s, &corpus());

        let encoder = TrigramProvider::new(384);
        build_index(&s, &encoder, &WordTruncator).await.unwrap();

        write_dataset(&s, &corpus()[..1]);
        let err = Retriever::open(&s, &encoder, &WordTruncator)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("stale"));
    }

    #[tokio::test]
    async fn test_stats_and_clean() {
        let temp = TempDir::new().unwrap();
        let s = settings(&temp, "psgs_w100", "exact");
        write_dataset(&s, &corpus());

        assert!(index_stats(&s).is_err());
        assert!(!clean_index(&s).unwrap());

        build_index(&s, &TrigramProvider::new(64), &WordTruncator)
            .await
            .unwrap();
        assert_eq!(index_stats(&s).unwrap().passages, 3);

        assert!(clean_index(&s).unwrap());
        assert!(!s.index_path().exists());
    }

    #[tokio::test]
    async fn test_empty_dataset_rejected() {
        let temp = TempDir::new().unwrap();
        let s = settings(&temp, "empty_no_embeddings", "on_the_fly");
        let path = s.dataset.jsonl_path(&s.data_dir);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "").unwrap();

        let err = Retriever::open(&s, &TrigramProvider::new(64), &WordTruncator)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no passages"));
    }
}
