//! Embedding configuration.

use ragqa_core::config::EncoderSettings;
use ragqa_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::types::IndexMetadata;

/// Question encoder configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    /// Provider name: "trigram" or "ollama"
    pub provider: String,

    /// Model identifier (provider-specific)
    pub model: String,

    /// Embedding vector dimensions
    pub dimensions: usize,

    /// Maximum batch size for embedding requests
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Provider endpoint (Ollama base URL)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

fn default_batch_size() -> usize {
    100
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "trigram".to_string(),
            model: "trigram-v1".to_string(),
            dimensions: 384,
            batch_size: default_batch_size(),
            endpoint: None,
        }
    }
}

impl From<&EncoderSettings> for EmbeddingConfig {
    fn from(settings: &EncoderSettings) -> Self {
        Self {
            provider: settings.provider.clone(),
            model: settings.model.clone(),
            dimensions: settings.dimensions,
            batch_size: default_batch_size(),
            endpoint: settings.endpoint.clone(),
        }
    }
}

impl EmbeddingConfig {
    /// Check that an index was built with the encoder described here.
    pub fn validate_against(&self, metadata: &IndexMetadata) -> AppResult<()> {
        if self.provider != metadata.provider {
            return Err(AppError::Retrieval(format!(
                "Provider mismatch: index built with '{}', question encoder is '{}'",
                metadata.provider, self.provider
            )));
        }

        if self.model != metadata.model {
            return Err(AppError::Retrieval(format!(
                "Model mismatch: index built with '{}', question encoder is '{}'",
                metadata.model, self.model
            )));
        }

        if self.dimensions != metadata.dimensions {
            return Err(AppError::Retrieval(format!(
                "Dimension mismatch: index has {}, question encoder produces {}",
                metadata.dimensions, self.dimensions
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn metadata() -> IndexMetadata {
        IndexMetadata {
            provider: "trigram".to_string(),
            model: "trigram-v1".to_string(),
            dimensions: 384,
            dataset_fingerprint: None,
            built_at: Utc::now(),
        }
    }

    #[test]
    fn test_default_config() {
        let config = EmbeddingConfig::default();
        assert_eq!(config.provider, "trigram");
        assert_eq!(config.model, "trigram-v1");
        assert_eq!(config.dimensions, 384);
        assert_eq!(config.batch_size, 100);
    }

    #[test]
    fn test_from_encoder_settings() {
        let settings = EncoderSettings {
            provider: "ollama".to_string(),
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
            endpoint: Some("http://gpu-box:11434".to_string()),
        };

        let config = EmbeddingConfig::from(&settings);
        assert_eq!(config.provider, "ollama");
        assert_eq!(config.dimensions, 768);
        assert_eq!(config.endpoint.as_deref(), Some("http://gpu-box:11434"));
    }

    #[test]
    fn test_validate_against_success() {
        assert!(EmbeddingConfig::default().validate_against(&metadata()).is_ok());
    }

    #[test]
    fn test_validate_against_provider_mismatch() {
        let config = EmbeddingConfig {
            provider: "ollama".to_string(),
            ..EmbeddingConfig::default()
        };

        let err = config.validate_against(&metadata()).unwrap_err();
        assert!(err.to_string().contains("Provider mismatch"));
    }

    #[test]
    fn test_validate_against_dimension_mismatch() {
        let config = EmbeddingConfig {
            dimensions: 1536,
            ..EmbeddingConfig::default()
        };

        let err = config.validate_against(&metadata()).unwrap_err();
        assert!(err.to_string().contains("Dimension mismatch"));
    }
}
