//! Passage retrieval for ragqa.
//!
//! Provides the retriever half of the pipeline:
//! - Passage datasets (JSONL / psgs_w100 TSV)
//! - Question encoders (embedding providers)
//! - SQLite passage indexes, persisted or built on the fly
//! - Dense top-k retrieval by cosine similarity

pub mod dataset;
pub mod documents;
pub mod embeddings;
pub mod index;
pub mod retriever;
pub mod truncate;
pub mod types;

pub use dataset::DatasetSpec;
pub use documents::{index_documents, IngestStats};
pub use embeddings::{create_provider, EmbeddingConfig, EmbeddingProvider};
pub use index::SqliteIndex;
pub use retriever::{
    build_index, clean_index, index_stats, IndexKind, Retriever, RetrieverSettings,
};
pub use truncate::{ContextTruncator, WordTruncator};
pub use types::{IndexMetadata, IndexStats, Passage, RetrievedDoc};
