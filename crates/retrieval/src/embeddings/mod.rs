//! Question and passage encoders.
//!
//! Dense embeddings come from a provider-agnostic `EmbeddingProvider`.
//! The same provider embeds questions at query time and passages at
//! index time.

pub mod config;
pub mod provider;
pub mod providers;

pub use config::EmbeddingConfig;
pub use provider::{create_provider, EmbeddingProvider};
