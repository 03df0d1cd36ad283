//! Error types for ragqa.
//!
//! A single error enum covers every failure category of the pipeline:
//! configuration, I/O, generator backends, retrieval, model assembly,
//! tokenization, prompts and serialization.

use thiserror::Error;

/// Unified error type for ragqa.
///
/// All fallible functions return `Result<T, AppError>`. Failures from
/// checkpoints, datasets or backends are never recovered from; they
/// propagate to the caller.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generator backend errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Dataset, index and embedding errors
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Model assembly and generation errors
    #[error("Model error: {0}")]
    Model(String),

    /// Tokenizer loading, encoding and decoding errors
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// Prompt template errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
