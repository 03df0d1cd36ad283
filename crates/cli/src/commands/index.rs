//! Index command handler.
//!
//! Builds, inspects and removes the persisted passage index of a model's
//! dataset.

use super::{model_context, resolve_rag_config};
use clap::{Args, Subcommand};
use ragqa_core::{config::AppConfig, AppResult};
use ragqa_model::{ModelContext, RagConfig, RagConfigOverrides, RagTokenizer};
use ragqa_retrieval::{
    build_index, clean_index, create_provider, index_documents, index_stats, IndexStats,
    RetrieverSettings, WordTruncator,
};
use std::path::PathBuf;

/// Passage index management
#[derive(Args, Debug)]
pub struct IndexCommand {
    #[command(subcommand)]
    pub action: IndexAction,
}

#[derive(Subcommand, Debug)]
pub enum IndexAction {
    /// Embed a dataset into a persisted index
    Build(IndexBuildCommand),
    /// Show index statistics
    Stats(IndexStatsCommand),
    /// Delete a persisted index
    Clean(IndexCleanCommand),
}

impl IndexCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        match &self.action {
            IndexAction::Build(cmd) => cmd.execute(config).await,
            IndexAction::Stats(cmd) => cmd.execute(config),
            IndexAction::Clean(cmd) => cmd.execute(config),
        }
    }
}

/// Which model's dataset an index command works on.
#[derive(Args, Debug, Clone)]
pub struct DatasetArgs {
    /// Saved model directory (default: configured defaults)
    #[arg(short, long)]
    pub model_path: Option<PathBuf>,

    /// Dataset name replacing the model's
    #[arg(long)]
    pub dataset_name: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl DatasetArgs {
    fn resolve(
        &self,
        config: &AppConfig,
    ) -> AppResult<(RagConfig, ModelContext, RetrieverSettings)> {
        let overrides = RagConfigOverrides {
            dataset_name: self.dataset_name.clone(),
            ..RagConfigOverrides::default()
        };
        let rag_config = resolve_rag_config(config, self.model_path.as_deref(), &overrides)?;
        let ctx = model_context(config)?;
        let settings = rag_config.retriever_settings(&ctx);
        Ok((rag_config, ctx, settings))
    }
}

/// Embed a dataset into a persisted index
#[derive(Args, Debug)]
pub struct IndexBuildCommand {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Split the text files of a directory into the dataset first
    #[arg(long)]
    pub from_dir: Option<PathBuf>,

    /// Truncate passages by words instead of the context tokenizer
    #[arg(long)]
    pub word_truncation: bool,
}

impl IndexBuildCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let (rag_config, ctx, settings) = self.dataset.resolve(config)?;
        tracing::info!("Executing index build for '{}'", settings.dataset);

        if settings.dataset.requires_on_the_fly() {
            tracing::warn!(
                "Dataset '{}' is indexed on the fly at load time; building a persisted index anyway",
                settings.dataset
            );
        }

        if let Some(dir) = &self.from_dir {
            let output = settings.dataset.jsonl_path(&ctx.data_dir);
            let ingest = index_documents(&config.resolve(dir), &output)?;
            if !self.dataset.json {
                println!(
                    "Split {} files into {} passages",
                    ingest.files, ingest.passages
                );
            }
        }

        let encoder = create_provider(&rag_config.question_encoder).await?;
        let stats = match rag_config.context_tokenizer_source() {
            Some(source) if !self.word_truncation => {
                let tokenizer = RagTokenizer::from_pretrained(&source, &ctx.resolver()?).await?;
                build_index(&settings, encoder.as_ref(), &tokenizer).await?
            }
            _ => build_index(&settings, encoder.as_ref(), &WordTruncator).await?,
        };

        print_stats(&stats, self.dataset.json)
    }
}

/// Show index statistics
#[derive(Args, Debug)]
pub struct IndexStatsCommand {
    #[command(flatten)]
    pub dataset: DatasetArgs,
}

impl IndexStatsCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let (_, _, settings) = self.dataset.resolve(config)?;
        tracing::info!("Executing index stats for '{}'", settings.dataset);

        let stats = index_stats(&settings)?;
        print_stats(&stats, self.dataset.json)
    }
}

/// Delete a persisted index
#[derive(Args, Debug)]
pub struct IndexCleanCommand {
    #[command(flatten)]
    pub dataset: DatasetArgs,
}

impl IndexCleanCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let (_, _, settings) = self.dataset.resolve(config)?;
        tracing::info!("Executing index clean for '{}'", settings.dataset);

        let removed = clean_index(&settings)?;

        if self.dataset.json {
            let output = serde_json::json!({
                "dataset": settings.dataset.to_string(),
                "removed": removed,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else if removed {
            println!("Index for '{}' removed", settings.dataset);
        } else {
            println!("No index for '{}'", settings.dataset);
        }

        Ok(())
    }
}

fn print_stats(stats: &IndexStats, json: bool) -> AppResult<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(stats)?);
        return Ok(());
    }

    println!("Index Statistics:");
    println!("  Dataset: {}", stats.dataset);
    println!("  Kind: {}", stats.kind);
    println!("  Passages: {}", stats.passages);
    println!("  Size: {} bytes", stats.db_size_bytes);
    if let Some(metadata) = &stats.metadata {
        println!(
            "  Encoder: {} ({}, {} dims)",
            metadata.provider, metadata.model, metadata.dimensions
        );
        println!("  Built: {}", metadata.built_at.to_rfc3339());
    }

    Ok(())
}
