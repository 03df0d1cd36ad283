//! Generator backend factory.

use crate::client::LlmClient;
use crate::providers::ollama::{OllamaClient, DEFAULT_OLLAMA_URL};
use ragqa_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;

/// Create a generator backend client by provider name.
///
/// # Arguments
/// * `provider` - Provider identifier ("ollama")
/// * `endpoint` - Optional custom endpoint URL
/// * `timeout` - Optional request timeout in seconds
///
/// # Errors
/// Returns `AppError::Config` if the provider is unknown or the HTTP
/// client cannot be built.
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    timeout: Option<u64>,
) -> AppResult<Arc<dyn LlmClient>> {
    match provider.to_lowercase().as_str() {
        "ollama" => {
            let base_url = endpoint.unwrap_or(DEFAULT_OLLAMA_URL);
            let client = match timeout {
                Some(secs) => OllamaClient::with_timeout(base_url, Duration::from_secs(secs))?,
                None => OllamaClient::with_base_url(base_url),
            };
            Ok(Arc::new(client))
        }
        _ => Err(AppError::Config(format!(
            "Unknown LLM provider: {}. Supported: ollama",
            provider
        ))),
    }
}
