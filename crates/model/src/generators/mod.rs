//! Generator backends.
//!
//! A generator turns one contextualized input into ranked answer
//! candidates. Tokenization constraints are applied afterwards by
//! `generation::shape_candidates`.

mod extractive;
mod llm;

pub use extractive::ExtractiveGenerator;
pub use llm::LlmGenerator;

use crate::device::Device;
use async_trait::async_trait;
use ragqa_core::config::GeneratorSettings;
use ragqa_core::{AppError, AppResult};
use ragqa_prompt::{PromptDefinition, PromptDocument};

/// One generator call.
#[derive(Debug, Clone)]
pub struct GeneratorInput {
    /// The question as asked
    pub question: String,

    /// Question with its retrieved context, joined with the configured
    /// separators
    pub input: String,

    /// Retrieved documents behind `input`, best first
    pub documents: Vec<PromptDocument>,
}

/// Decoding limits for one generator call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationRequest {
    pub num_candidates: usize,
    pub max_length: usize,
    pub early_stopping: bool,
}

/// An untokenized answer candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub text: String,

    /// Higher is better; comparable only within one call
    pub score: f64,
}

#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;

    /// Place the backend on `device`. Backends without device control
    /// ignore this.
    fn set_device(&mut self, _device: Device) {}

    /// Candidates best first, at most `request.num_candidates`.
    async fn generate(
        &self,
        input: &GeneratorInput,
        request: &GenerationRequest,
    ) -> AppResult<Vec<Candidate>>;
}

/// Create a generator backend from settings.
pub fn create_generator(
    settings: &GeneratorSettings,
    prompt: PromptDefinition,
) -> AppResult<Box<dyn Generator>> {
    match settings.provider.to_lowercase().as_str() {
        "ollama" => {
            let client = ragqa_llm::create_client(
                "ollama",
                settings.endpoint.as_deref(),
                settings.timeout,
            )?;
            Ok(Box::new(LlmGenerator::new(
                client,
                settings.model.clone(),
                prompt,
            )))
        }
        "extractive" => Ok(Box::new(ExtractiveGenerator::new())),
        other => Err(AppError::Config(format!(
            "Unknown generator provider: {}. Supported: ollama, extractive",
            other
        ))),
    }
}
