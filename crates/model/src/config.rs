//! RAG model configuration.
//!
//! A `RagConfig` names every component a model is assembled from. It is
//! built before the model, either from defaults ("built fresh") or from
//! `rag_config.yaml` in a saved model directory.

use crate::context::ModelContext;
use ragqa_core::config::GeneratorSettings;
use ragqa_core::{AppConfig, AppError, AppResult};
use ragqa_retrieval::{DatasetSpec, EmbeddingConfig, IndexKind, RetrieverSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file names searched in a saved model directory, in order.
pub const CONFIG_FILES: &[&str] = &["rag_config.yaml", "rag_config.yml", "rag_config.json"];

/// Subdirectory of a saved model holding the generator tokenizer.
pub const GENERATOR_TOKENIZER_DIR: &str = "generator_tokenizer";

/// Subdirectory of a saved model holding the context tokenizer.
pub const CONTEXT_TOKENIZER_DIR: &str = "question_encoder_tokenizer";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Tokenizer that truncates passages before they are embedded
    pub pretrained_context_tokenizer_name_or_path: Option<String>,

    /// Question encoder (embeds questions and passages)
    pub question_encoder: EmbeddingConfig,

    /// Generator tokenizer checkpoint
    pub pretrained_generator_name_or_path: String,

    /// Generator backend
    pub generator: GeneratorSettings,

    pub dataset: String,
    pub dataset_name: String,
    pub dataset_split: String,

    /// "exact" or "on_the_fly"
    pub index_name: String,

    /// Passages retrieved per question
    pub n_docs: usize,

    /// Generator input budget in generator tokens
    pub max_combined_length: usize,

    /// Context tokens kept per passage when embedding
    pub max_passage_tokens: usize,

    pub title_sep: String,
    pub doc_sep: String,

    /// Merge identical answers from different passages
    pub do_deduplication: bool,

    /// Prepended to every generator input
    pub generator_prefix: Option<String>,

    /// Saved model directory this config was loaded from
    #[serde(skip)]
    pub source_dir: Option<PathBuf>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            pretrained_context_tokenizer_name_or_path: Some(
                "facebook/dpr-ctx_encoder-single-nq-base".to_string(),
            ),
            question_encoder: EmbeddingConfig::default(),
            pretrained_generator_name_or_path: "facebook/bart-large".to_string(),
            generator: GeneratorSettings::default(),
            dataset: "wiki_dpr".to_string(),
            dataset_name: "psgs_w100".to_string(),
            dataset_split: "train".to_string(),
            index_name: "exact".to_string(),
            n_docs: 5,
            max_combined_length: 300,
            max_passage_tokens: 256,
            title_sep: " / ".to_string(),
            doc_sep: " // ".to_string(),
            do_deduplication: true,
            generator_prefix: None,
            source_dir: None,
        }
    }
}

/// Values replacing fields of a loaded config.
#[derive(Debug, Clone, Default)]
pub struct RagConfigOverrides {
    pub dataset_name: Option<String>,
    pub index_name: Option<String>,
    pub n_docs: Option<usize>,
    pub pretrained_generator_name_or_path: Option<String>,
}

impl RagConfig {
    pub fn with_generator_checkpoint(mut self, name_or_path: impl Into<String>) -> Self {
        self.pretrained_generator_name_or_path = name_or_path.into();
        self
    }

    /// Take the generator backend and question encoder from application
    /// settings.
    pub fn with_app_settings(mut self, app: &AppConfig) -> Self {
        self.generator = app.generator.clone();
        self.question_encoder = EmbeddingConfig::from(&app.question_encoder);
        self
    }

    /// Load the config saved in `path`, then apply `overrides`.
    pub fn from_pretrained(path: &Path, overrides: &RagConfigOverrides) -> AppResult<Self> {
        if !path.is_dir() {
            return Err(AppError::Model(format!(
                "Saved model directory not found: {:?}",
                path
            )));
        }

        let file = CONFIG_FILES
            .iter()
            .map(|name| path.join(name))
            .find(|p| p.is_file())
            .ok_or_else(|| {
                AppError::Model(format!(
                    "No {} in saved model directory {:?}",
                    CONFIG_FILES.join(" / "),
                    path
                ))
            })?;

        let content = std::fs::read_to_string(&file)?;
        let mut config: RagConfig = if file.extension().is_some_and(|e| e == "json") {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };
        tracing::debug!("Loaded RAG config from {:?}", file);

        config.source_dir = Some(path.to_path_buf());
        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Write `rag_config.yaml` into `path`.
    pub fn save_pretrained(&self, path: &Path) -> AppResult<PathBuf> {
        std::fs::create_dir_all(path)?;
        let file = path.join(CONFIG_FILES[0]);
        std::fs::write(&file, serde_yaml::to_string(self)?)?;
        tracing::info!("Saved RAG config to {:?}", file);
        Ok(file)
    }

    pub fn apply(&mut self, overrides: &RagConfigOverrides) {
        if let Some(name) = &overrides.dataset_name {
            self.dataset_name = name.clone();
        }
        if let Some(name) = &overrides.index_name {
            self.index_name = name.clone();
        }
        if let Some(n) = overrides.n_docs {
            self.n_docs = n;
        }
        if let Some(name) = &overrides.pretrained_generator_name_or_path {
            self.pretrained_generator_name_or_path = name.clone();
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.n_docs == 0 {
            return Err(AppError::Config("n_docs must be at least 1".to_string()));
        }
        if self.max_combined_length == 0 || self.max_passage_tokens == 0 {
            return Err(AppError::Config(
                "max_combined_length and max_passage_tokens must be at least 1".to_string(),
            ));
        }
        for (field, value) in [
            ("dataset", &self.dataset),
            ("dataset_name", &self.dataset_name),
            ("dataset_split", &self.dataset_split),
            ("pretrained_generator_name_or_path", &self.pretrained_generator_name_or_path),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::Config(format!("{} must not be empty", field)));
            }
        }
        IndexKind::parse(&self.index_name)?;
        Ok(())
    }

    pub fn dataset_spec(&self) -> DatasetSpec {
        DatasetSpec::new(&self.dataset, &self.dataset_name, &self.dataset_split)
    }

    pub fn retriever_settings(&self, ctx: &ModelContext) -> RetrieverSettings {
        RetrieverSettings {
            dataset: self.dataset_spec(),
            index_name: self.index_name.clone(),
            data_dir: ctx.data_dir.clone(),
            index_dir: ctx.index_dir.clone(),
            max_passage_tokens: self.max_passage_tokens,
            batch_size: self.question_encoder.batch_size,
        }
    }

    /// Generator tokenizer location, preferring the copy saved with the model.
    pub fn generator_tokenizer_source(&self) -> String {
        self.saved_component(GENERATOR_TOKENIZER_DIR)
            .unwrap_or_else(|| self.pretrained_generator_name_or_path.clone())
    }

    /// Context tokenizer location, preferring the copy saved with the model.
    pub fn context_tokenizer_source(&self) -> Option<String> {
        self.saved_component(CONTEXT_TOKENIZER_DIR)
            .or_else(|| self.pretrained_context_tokenizer_name_or_path.clone())
    }

    fn saved_component(&self, dir: &str) -> Option<String> {
        let path = self.source_dir.as_ref()?.join(dir);
        path.is_dir().then(|| path.display().to_string())
    }
}
