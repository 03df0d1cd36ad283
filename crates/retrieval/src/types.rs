//! Retrieval type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A passage from a retrieval dataset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Passage {
    /// Passage identifier, unique within its dataset
    pub id: String,

    /// Title of the source document
    pub title: String,

    /// Passage body
    pub text: String,

    /// Precomputed dense embedding, if the dataset ships one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Passage {
    pub fn new(id: impl Into<String>, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            text: text.into(),
            embedding: None,
        }
    }
}

/// A passage returned for a question, with its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedDoc {
    pub passage: Passage,
    pub score: f32,
}

/// Metadata persisted alongside an index.
///
/// Queries must be embedded by the same provider, model and dimensions
/// that produced the stored passage vectors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IndexMetadata {
    pub provider: String,
    pub model: String,
    pub dimensions: usize,

    /// SHA-256 of the dataset file the index was built from
    #[serde(default)]
    pub dataset_fingerprint: Option<String>,

    pub built_at: DateTime<Utc>,
}

/// Statistics about a passage index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    /// Dataset the index covers (`<dataset>/<name>.<split>`)
    pub dataset: String,

    /// Number of indexed passages
    pub passages: u64,

    /// Index kind: "exact" or "on_the_fly"
    pub kind: String,

    /// Size of the index file (0 for in-memory indexes)
    pub db_size_bytes: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<IndexMetadata>,
}
