//! Generator backed by a language model server.

use super::{Candidate, GenerationRequest, Generator, GeneratorInput};
use crate::device::Device;
use async_trait::async_trait;
use ragqa_core::AppResult;
use ragqa_llm::{LlmClient, LlmRequest};
use ragqa_prompt::{build_prompt, PromptDefinition, PromptVariables};
use std::collections::HashSet;
use std::sync::Arc;

/// Draws allowed per requested candidate.
const ATTEMPTS_PER_CANDIDATE: usize = 3;

const SAMPLING_TEMPERATURE: f32 = 0.8;
const BASE_SEED: u64 = 42;

/// Draws answer candidates from an `LlmClient`.
///
/// The first draw is greedy, the rest are sampled with distinct seeds
/// until enough distinct answers are collected. A candidate's score is
/// its negated rank.
pub struct LlmGenerator {
    client: Arc<dyn LlmClient>,
    model: String,
    prompt: PromptDefinition,
    name: String,
    num_gpu: Option<u32>,
}

impl LlmGenerator {
    pub fn new(
        client: Arc<dyn LlmClient>,
        model: impl Into<String>,
        prompt: PromptDefinition,
    ) -> Self {
        let model = model.into();
        Self {
            name: format!("{}:{}", client.provider_name(), model),
            client,
            model,
            prompt,
            num_gpu: Device::default().num_gpu(),
        }
    }

    fn request(
        &self,
        prompt: &str,
        system: Option<&str>,
        stop: &[String],
        draw: usize,
        max_length: usize,
    ) -> LlmRequest {
        // Generator tokens and backend tokens differ; leave headroom
        let mut request = LlmRequest::new(prompt, self.model.clone())
            .with_max_tokens((max_length * 2).max(1) as u32);

        request = if draw == 0 {
            request.with_temperature(0.0)
        } else {
            request
                .with_temperature(SAMPLING_TEMPERATURE)
                .with_seed(BASE_SEED + draw as u64)
        };

        for s in stop {
            request = request.with_stop(s.clone());
        }
        if let Some(system) = system {
            request = request.with_system(system);
        }
        if let Some(num_gpu) = self.num_gpu {
            request = request.with_num_gpu(num_gpu);
        }
        request
    }
}

#[async_trait]
impl Generator for LlmGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_device(&mut self, device: Device) {
        self.num_gpu = device.num_gpu();
    }

    async fn generate(
        &self,
        input: &GeneratorInput,
        request: &GenerationRequest,
    ) -> AppResult<Vec<Candidate>> {
        let built = build_prompt(
            &self.prompt,
            &PromptVariables {
                question: input.question.clone(),
                input: input.input.clone(),
                documents: input.documents.clone(),
            },
        )?;

        let mut answers: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        let budget = request.num_candidates * ATTEMPTS_PER_CANDIDATE;

        for draw in 0..budget {
            if answers.len() >= request.num_candidates {
                break;
            }

            let llm_request = self.request(
                &built.user,
                built.system.as_deref(),
                &built.stop,
                draw,
                request.max_length,
            );
            let response = self.client.complete(&llm_request).await?;
            let answer = clean_answer(&response.content);

            if answer.is_empty() {
                continue;
            }
            if !seen.insert(answer.to_lowercase()) {
                if request.early_stopping {
                    tracing::debug!("Draw {} repeated '{}', stopping early", draw, answer);
                    break;
                }
                continue;
            }
            answers.push(answer);
        }

        tracing::debug!(
            "{} produced {} of {} candidates for '{}'",
            self.name,
            answers.len(),
            request.num_candidates,
            input.question
        );

        Ok(answers
            .into_iter()
            .enumerate()
            .map(|(rank, text)| Candidate {
                text,
                score: -(rank as f64),
            })
            .collect())
    }
}

/// First line of a completion without an "Answer:" label, quotes or a
/// trailing period.
pub(crate) fn clean_answer(raw: &str) -> String {
    let line = raw.trim().lines().next().unwrap_or("").trim();
    let line = line
        .strip_prefix("Answer:")
        .or_else(|| line.strip_prefix("answer:"))
        .unwrap_or(line)
        .trim();
    let line = line.trim_matches(|c| c == '"' || c == '\'' || c == '`').trim();
    line.strip_suffix('.').unwrap_or(line).trim().to_string()
}
