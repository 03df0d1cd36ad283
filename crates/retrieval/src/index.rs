//! SQLite-backed vector index for passages.

use crate::types::{IndexMetadata, Passage};
use ragqa_core::{AppError, AppResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const METADATA_KEY: &str = "metadata";

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS passages (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        text TEXT NOT NULL,
        embedding BLOB NOT NULL
    );

    CREATE TABLE IF NOT EXISTS index_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
"#;

/// Passage index stored in SQLite, on disk or in memory.
///
/// Search is exhaustive: every stored vector is scored against the query.
pub struct SqliteIndex {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for SqliteIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteIndex").field("path", &self.path).finish()
    }
}

impl SqliteIndex {
    /// Open (or create) an index file.
    pub fn open(db_path: &Path) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Retrieval(format!("Failed to create index directory: {}", e))
            })?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| AppError::Retrieval(format!("Failed to open SQLite index: {}", e)))?;
        init_schema(&conn)?;

        tracing::debug!("Initialized SQLite index at {:?}", db_path);
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(db_path.to_path_buf()),
        })
    }

    /// Create a transient index that lives only as long as this value.
    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            AppError::Retrieval(format!("Failed to open in-memory index: {}", e))
        })?;
        init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Location of the index file, `None` for in-memory indexes.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Retrieval("Index connection lock poisoned".to_string()))
    }

    /// Read the stored index metadata.
    pub fn metadata(&self) -> AppResult<Option<IndexMetadata>> {
        let conn = self.conn()?;
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM index_meta WHERE key = ?1",
                params![METADATA_KEY],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| AppError::Retrieval(format!("Failed to read index metadata: {}", e)))?;

        value
            .map(|json| serde_json::from_str(&json).map_err(AppError::from))
            .transpose()
    }

    /// Store index metadata, replacing any previous value.
    pub fn write_metadata(&self, metadata: &IndexMetadata) -> AppResult<()> {
        let json = serde_json::to_string(metadata)?;
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO index_meta (key, value) VALUES (?1, ?2)",
                params![METADATA_KEY, json],
            )
            .map_err(|e| AppError::Retrieval(format!("Failed to write index metadata: {}", e)))?;
        Ok(())
    }

    /// Insert many passages in a single transaction.
    pub fn insert_passages(&mut self, passages: &[Passage]) -> AppResult<()> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Retrieval(format!("Failed to begin transaction: {}", e)))?;

        for passage in passages {
            insert_passage(&tx, passage)?;
        }

        tx.commit()
            .map_err(|e| AppError::Retrieval(format!("Failed to commit passages: {}", e)))?;

        tracing::debug!("Inserted {} passages", passages.len());
        Ok(())
    }

    /// Top-k passages for each query embedding, best first. Equal scores
    /// keep insertion order.
    pub fn search_batch(
        &self,
        query_embeddings: &[Vec<f32>],
        top_k: usize,
    ) -> AppResult<Vec<Vec<(Passage, f32)>>> {
        let passages = self.load_all()?;

        let results = query_embeddings
            .iter()
            .map(|query| rank(&passages, query, top_k))
            .collect();

        tracing::debug!(
            "Searched {} passages for {} queries (top-{})",
            passages.len(),
            query_embeddings.len(),
            top_k
        );

        Ok(results)
    }

    /// Number of stored passages.
    pub fn len(&self) -> AppResult<u64> {
        self.conn()?
            .query_row("SELECT COUNT(*) FROM passages", [], |row| {
                row.get::<_, i64>(0).map(|v| v as u64)
            })
            .map_err(|e| AppError::Retrieval(format!("Failed to count passages: {}", e)))
    }

    pub fn is_empty(&self) -> AppResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Remove all passages and metadata.
    pub fn reset(&mut self) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM passages", [])
            .map_err(|e| AppError::Retrieval(format!("Failed to delete passages: {}", e)))?;
        conn.execute("DELETE FROM index_meta", [])
            .map_err(|e| AppError::Retrieval(format!("Failed to delete metadata: {}", e)))?;

        tracing::info!("Reset passage index");
        Ok(())
    }

    fn load_all(&self) -> AppResult<Vec<Passage>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT id, title, text, embedding FROM passages ORDER BY rowid")
            .map_err(|e| AppError::Retrieval(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| {
                let embedding_bytes: Vec<u8> = row.get(3)?;
                let embedding = bytes_to_embedding(&embedding_bytes).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        3,
                        rusqlite::types::Type::Blob,
                        Box::new(e),
                    )
                })?;

                Ok(Passage {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    text: row.get(2)?,
                    embedding: Some(embedding),
                })
            })
            .map_err(|e| AppError::Retrieval(format!("Failed to query passages: {}", e)))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::Retrieval(format!("Failed to read passage row: {}", e)))
    }
}

fn init_schema(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(SCHEMA)
        .map_err(|e| AppError::Retrieval(format!("Failed to create tables: {}", e)))
}

fn insert_passage(conn: &Connection, passage: &Passage) -> AppResult<()> {
    let embedding = passage.embedding.as_ref().ok_or_else(|| {
        AppError::Retrieval(format!("Passage '{}' is missing an embedding", passage.id))
    })?;

    conn.execute(
        "INSERT INTO passages (id, title, text, embedding) VALUES (?1, ?2, ?3, ?4)",
        params![
            passage.id,
            passage.title,
            passage.text,
            embedding_to_bytes(embedding)
        ],
    )
    .map_err(|e| match e.sqlite_error_code() {
        Some(rusqlite::ErrorCode::ConstraintViolation) => {
            AppError::Retrieval(format!("Duplicate passage id '{}'", passage.id))
        }
        _ => AppError::Retrieval(format!("Failed to insert passage: {}", e)),
    })?;

    Ok(())
}

/// Score all passages against a query and keep the top-k.
fn rank(passages: &[Passage], query: &[f32], top_k: usize) -> Vec<(Passage, f32)> {
    let mut scored: Vec<(usize, f32)> = passages
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let embedding = p.embedding.as_deref().unwrap_or(&[]);
            (i, cosine_similarity(query, embedding))
        })
        .collect();

    // Stable sort keeps insertion order among equal scores
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_k);

    scored
        .into_iter()
        .map(|(i, score)| (passages[i].clone(), score))
        .collect()
}

/// Convert embedding vector to bytes for storage.
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convert bytes back to embedding vector.
fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::Retrieval(
            "Invalid embedding bytes length".to_string(),
        ));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Calculate cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
