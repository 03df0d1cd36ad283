//! Ask command handler.
//!
//! Answers questions with a single RAG model, loaded from a saved model
//! directory or built from the configured defaults.

use super::{format_answers, generate_answers, model_context, resolve_rag_config};
use clap::Args;
use ragqa_core::{config::AppConfig, AppError, AppResult};
use ragqa_model::{GenerationConfig, RagConfigOverrides, RagModel, RagVariant};
use std::path::{Path, PathBuf};

/// Answer questions with one model
#[derive(Args, Debug)]
pub struct AskCommand {
    /// Questions to answer
    pub questions: Vec<String>,

    /// Read additional questions from a file, one per line
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Model variant (token, sequence)
    #[arg(long, default_value = "sequence")]
    pub variant: String,

    /// Saved model directory (default: build from configuration)
    #[arg(short, long)]
    pub model_path: Option<PathBuf>,

    /// Dataset name replacing the configured one
    #[arg(long)]
    pub dataset_name: Option<String>,

    /// Passages retrieved per question
    #[arg(long)]
    pub n_docs: Option<usize>,

    /// Beams, and answers returned per question
    #[arg(long, default_value = "4")]
    pub num_beams: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let questions = self.collect_questions()?;
        tracing::info!("Executing ask command for {} question(s)", questions.len());

        let variant = RagVariant::parse(&self.variant)?;
        let generation = GenerationConfig::demo(self.num_beams);
        generation.validate()?;

        let overrides = RagConfigOverrides {
            dataset_name: self.dataset_name.clone(),
            n_docs: self.n_docs,
            ..RagConfigOverrides::default()
        };
        let rag_config = resolve_rag_config(config, self.model_path.as_deref(), &overrides)?;

        let ctx = model_context(config)?;
        let model = RagModel::new(rag_config, variant, &ctx)
            .await?
            .eval()
            .to(ctx.device);

        let answers =
            generate_answers(&model, model.generator_tokenizer(), &questions, &generation).await?;

        if self.json {
            let results: Vec<_> = questions
                .iter()
                .zip(&answers)
                .map(|(question, answers)| {
                    serde_json::json!({
                        "question": question,
                        "answers": answers,
                    })
                })
                .collect();
            let output = serde_json::json!({
                "variant": variant.as_str(),
                "dataset": model.retriever().dataset().to_string(),
                "generator": model.config().generator.model,
                "device": model.device().as_str(),
                "results": results,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            for (question, answers) in questions.iter().zip(&answers) {
                println!("{}", format_answers(question, answers));
            }
        }

        Ok(())
    }

    fn collect_questions(&self) -> AppResult<Vec<String>> {
        let mut questions: Vec<String> = self
            .questions
            .iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect();

        if let Some(file) = &self.file {
            questions.extend(read_questions(file)?);
        }

        if questions.is_empty() {
            return Err(AppError::Config(
                "No question provided. Pass questions as arguments or use --file".to_string(),
            ));
        }
        Ok(questions)
    }
}

fn read_questions(path: &Path) -> AppResult<Vec<String>> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        AppError::Config(format!("Failed to read questions from {:?}: {}", path, e))
    })?;

    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}
