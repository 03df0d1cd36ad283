//! Retrieval-augmented generation model.
//!
//! A `RagModel` is assembled from a question encoder, a retriever, a
//! generator backend and the tokenizers around them. Generation runs:
//! 1. decode the question batch with the generator tokenizer
//! 2. embed the questions and retrieve `n_docs` passages each
//! 3. build `title / text // question` generator inputs
//! 4. generate, shape and combine hypotheses per variant
//! 5. return exactly `num_return_sequences` rows per question

use crate::batch::{GeneratedBatch, QuestionBatch};
use crate::config::{RagConfig, RagConfigOverrides};
use crate::context::ModelContext;
use crate::device::Device;
use crate::generation::{shape_candidates, GenerationConfig, Hypothesis};
use crate::generators::{create_generator, GenerationRequest, Generator, GeneratorInput};
use crate::tokenizer::RagTokenizer;
use ragqa_core::{AppError, AppResult};
use ragqa_prompt::{load_prompt, PromptDocument, SEQUENCE_PROMPT_ID, TOKEN_PROMPT_ID};
use ragqa_retrieval::{
    create_provider, EmbeddingProvider, RetrievedDoc, Retriever, WordTruncator,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// How retrieved documents condition the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RagVariant {
    /// One generation over all retrieved documents
    Token,
    /// One generation per document, marginalized over documents
    Sequence,
}

impl RagVariant {
    pub fn parse(name: &str) -> AppResult<Self> {
        match name.to_lowercase().as_str() {
            "token" => Ok(Self::Token),
            "sequence" => Ok(Self::Sequence),
            other => Err(AppError::Config(format!(
                "Unknown RAG variant: {}. Supported: token, sequence",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Token => "token",
            Self::Sequence => "sequence",
        }
    }

    pub fn prompt_id(self) -> &'static str {
        match self {
            Self::Token => TOKEN_PROMPT_ID,
            Self::Sequence => SEQUENCE_PROMPT_ID,
        }
    }
}

/// The sub-models a `RagModel` is composed of.
pub struct RagComponents {
    /// Truncates passages before embedding; word-based when absent
    pub context_tokenizer: Option<RagTokenizer>,
    pub question_encoder: Arc<dyn EmbeddingProvider>,
    pub retriever: Retriever,
    pub generator: Box<dyn Generator>,
    pub generator_tokenizer: RagTokenizer,
}

impl RagComponents {
    /// Build every component named by `config`.
    pub async fn load(
        config: &RagConfig,
        variant: RagVariant,
        ctx: &ModelContext,
    ) -> AppResult<Self> {
        config.validate()?;
        let resolver = ctx.resolver()?;

        let context_tokenizer = match config.context_tokenizer_source() {
            Some(source) => Some(RagTokenizer::from_pretrained(&source, &resolver).await?),
            None => None,
        };

        let question_encoder = create_provider(&config.question_encoder).await?;

        let settings = config.retriever_settings(ctx);
        let retriever = match &context_tokenizer {
            Some(tokenizer) => {
                Retriever::open(&settings, question_encoder.as_ref(), tokenizer).await?
            }
            None => Retriever::open(&settings, question_encoder.as_ref(), &WordTruncator).await?,
        };

        let prompt = load_prompt(&ctx.prompt_dir, variant.prompt_id())?;
        let generator = create_generator(&config.generator, prompt)?;

        let generator_tokenizer =
            RagTokenizer::from_pretrained(&config.generator_tokenizer_source(), &resolver).await?;

        Ok(Self {
            context_tokenizer,
            question_encoder,
            retriever,
            generator,
            generator_tokenizer,
        })
    }
}

pub struct RagModel {
    config: RagConfig,
    variant: RagVariant,
    components: RagComponents,
    device: Device,
    eval: bool,
}

impl RagModel {
    /// Build a model from a config constructed by the caller.
    pub async fn new(
        config: RagConfig,
        variant: RagVariant,
        ctx: &ModelContext,
    ) -> AppResult<Self> {
        let components = RagComponents::load(&config, variant, ctx).await?;
        Ok(Self::from_components(config, variant, components))
    }

    /// Build a model from the config saved in `path`.
    pub async fn from_pretrained(
        path: &Path,
        variant: RagVariant,
        overrides: &RagConfigOverrides,
        ctx: &ModelContext,
    ) -> AppResult<Self> {
        let config = RagConfig::from_pretrained(path, overrides)?;
        Self::new(config, variant, ctx).await
    }

    /// Compose caller-supplied components.
    pub fn from_components(
        config: RagConfig,
        variant: RagVariant,
        components: RagComponents,
    ) -> Self {
        tracing::info!(
            "Assembled {} model: retriever '{}' ({}), generator {}, generator tokenizer '{}'",
            variant.as_str(),
            components.retriever.dataset(),
            components.retriever.kind().as_str(),
            components.generator.name(),
            components.generator_tokenizer.name()
        );

        Self {
            config,
            variant,
            components,
            device: Device::Cpu,
            eval: false,
        }
    }

    /// Move the model to `device`.
    pub fn to(mut self, device: Device) -> Self {
        self.components.generator.set_device(device);
        self.components.question_encoder.set_num_gpu(device.num_gpu());
        self.device = device;
        tracing::debug!("Model moved to {}", device);
        self
    }

    /// Mark the model for inference.
    pub fn eval(mut self) -> Self {
        self.eval = true;
        self
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn variant(&self) -> RagVariant {
        self.variant
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn retriever(&self) -> &Retriever {
        &self.components.retriever
    }

    pub fn generator_tokenizer(&self) -> &RagTokenizer {
        &self.components.generator_tokenizer
    }

    /// Generate `num_return_sequences` answers per question, grouped by
    /// question and right-padded with the generator pad token.
    pub async fn generate(
        &self,
        batch: &QuestionBatch,
        config: &GenerationConfig,
    ) -> AppResult<GeneratedBatch> {
        config.validate()?;
        if batch.device != self.device {
            return Err(AppError::Model(format!(
                "Question batch is on {} but the model is on {}",
                batch.device, self.device
            )));
        }
        if !self.eval {
            tracing::warn!("generate() called on a model not marked eval()");
        }

        let n = config.num_return_sequences;
        let tokenizer = &self.components.generator_tokenizer;
        let questions = tokenizer.batch_decode(&batch.input_ids, true)?;
        if questions.is_empty() {
            return Ok(GeneratedBatch {
                sequences: Vec::new(),
                num_return_sequences: n,
            });
        }

        let embeddings = self.components.question_encoder.embed_batch(&questions).await?;
        let retrieved = self
            .components
            .retriever
            .retrieve(&embeddings, self.config.n_docs)?;

        let mut rows = Vec::with_capacity(questions.len() * n);
        for (question, docs) in questions.iter().zip(retrieved) {
            tracing::debug!("Retrieved {} documents for '{}'", docs.len(), question);

            let hypotheses = match self.variant {
                RagVariant::Sequence => self.generate_sequence(question, &docs, config).await?,
                RagVariant::Token => self.generate_token(question, &docs, config).await?,
            };
            if hypotheses.len() < n {
                tracing::debug!(
                    "{} of {} answers survived for '{}', filling",
                    hypotheses.len(),
                    n,
                    question
                );
            }

            rows.extend(fill_to(
                hypotheses.into_iter().map(|h| h.token_ids).collect(),
                n,
            ));
        }

        Ok(GeneratedBatch {
            sequences: pad_rows(rows, tokenizer.pad_id()),
            num_return_sequences: n,
        })
    }

    /// Generate per document and marginalize:
    /// `score(y) = logsumexp_d(log_softmax(doc_scores)_d + score_d(y))`.
    async fn generate_sequence(
        &self,
        question: &str,
        docs: &[RetrievedDoc],
        config: &GenerationConfig,
    ) -> AppResult<Vec<Hypothesis>> {
        let priors = log_softmax(&docs.iter().map(|d| d.score as f64).collect::<Vec<_>>());
        let request = self.request(config);

        let mut pooled: Vec<(Hypothesis, Vec<f64>)> = Vec::new();
        let mut by_tokens: HashMap<Vec<u32>, usize> = HashMap::new();

        for (rank, (doc, prior)) in docs.iter().zip(priors).enumerate() {
            let input = GeneratorInput {
                question: question.to_string(),
                input: self.contextualize(question, std::slice::from_ref(doc))?,
                documents: vec![prompt_document(rank, doc)],
            };
            let candidates = self.components.generator.generate(&input, &request).await?;
            let hypotheses =
                shape_candidates(candidates, &self.components.generator_tokenizer, config)?;

            for hypothesis in hypotheses {
                let contribution = prior + hypothesis.score;
                let existing = if self.config.do_deduplication {
                    by_tokens.get(&hypothesis.token_ids).copied()
                } else {
                    None
                };

                match existing {
                    Some(i) => pooled[i].1.push(contribution),
                    None => {
                        by_tokens.insert(hypothesis.token_ids.clone(), pooled.len());
                        pooled.push((hypothesis, vec![contribution]));
                    }
                }
            }
        }

        let mut scored: Vec<Hypothesis> = pooled
            .into_iter()
            .map(|(mut hypothesis, contributions)| {
                hypothesis.score = log_sum_exp(&contributions);
                hypothesis
            })
            .collect();
        // Stable: ties keep the order hypotheses were first produced in
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(config.num_return_sequences);
        Ok(scored)
    }

    /// Generate once, conditioned on all documents jointly.
    async fn generate_token(
        &self,
        question: &str,
        docs: &[RetrievedDoc],
        config: &GenerationConfig,
    ) -> AppResult<Vec<Hypothesis>> {
        let input = GeneratorInput {
            question: question.to_string(),
            input: self.contextualize(question, docs)?,
            documents: docs
                .iter()
                .enumerate()
                .map(|(rank, doc)| prompt_document(rank, doc))
                .collect(),
        };

        let candidates = self
            .components
            .generator
            .generate(&input, &self.request(config))
            .await?;
        let mut hypotheses =
            shape_candidates(candidates, &self.components.generator_tokenizer, config)?;

        if self.config.do_deduplication {
            let mut seen = std::collections::HashSet::new();
            hypotheses.retain(|h| seen.insert(h.token_ids.clone()));
        }
        hypotheses.truncate(config.num_return_sequences);
        Ok(hypotheses)
    }

    fn request(&self, config: &GenerationConfig) -> GenerationRequest {
        GenerationRequest {
            num_candidates: config.num_beams,
            max_length: config.max_length,
            early_stopping: config.early_stopping,
        }
    }

    /// `prefix + title + title_sep + text + doc_sep` per document, then the
    /// question. Passage text is cut so the whole input fits
    /// `max_combined_length` generator tokens; the question is never cut.
    pub fn contextualize(&self, question: &str, docs: &[RetrievedDoc]) -> AppResult<String> {
        let tokenizer = &self.components.generator_tokenizer;
        let prefix = self.config.generator_prefix.as_deref().unwrap_or("");
        let title_sep = &self.config.title_sep;
        let doc_sep = &self.config.doc_sep;

        let titles: Vec<&str> = docs
            .iter()
            .map(|d| d.passage.title.trim().trim_matches('"'))
            .collect();

        let skeleton = titles
            .iter()
            .map(|t| format!("{}{}{}", t, title_sep, doc_sep))
            .collect::<String>();
        let fixed = tokenizer
            .encode(&format!("{}{}{}", prefix, skeleton, question), false)?
            .len();

        let budget = self.config.max_combined_length.saturating_sub(fixed);
        let per_doc = if docs.is_empty() { 0 } else { budget / docs.len() };

        let mut out = String::from(prefix);
        for (doc, title) in docs.iter().zip(&titles) {
            let text = tokenizer.truncate_to_tokens(doc.passage.text.trim(), per_doc)?;
            out.push_str(title);
            out.push_str(title_sep);
            out.push_str(&text);
            out.push_str(doc_sep);
        }
        out.push_str(question);

        Ok(out.replace("  ", " "))
    }
}

fn prompt_document(rank: usize, doc: &RetrievedDoc) -> PromptDocument {
    PromptDocument {
        rank: rank + 1,
        title: doc.passage.title.clone(),
        text: doc.passage.text.clone(),
    }
}

/// Pad `rows` to exactly `n` by repeating surviving rows best first,
/// or with empty rows when nothing survived.
fn fill_to(mut rows: Vec<Vec<u32>>, n: usize) -> Vec<Vec<u32>> {
    rows.truncate(n);
    let survivors = rows.len();
    for i in survivors..n {
        let row = if survivors > 0 {
            rows[i % survivors].clone()
        } else {
            Vec::new()
        };
        rows.push(row);
    }
    rows
}

fn pad_rows(mut rows: Vec<Vec<u32>>, pad_id: u32) -> Vec<Vec<u32>> {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    for row in &mut rows {
        row.resize(width, pad_id);
    }
    rows
}

fn log_softmax(scores: &[f64]) -> Vec<f64> {
    let norm = log_sum_exp(scores);
    scores.iter().map(|s| s - norm).collect()
}

fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}
