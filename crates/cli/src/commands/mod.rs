//! Command handlers for the ragqa CLI.
//!
//! This module organizes all CLI commands into separate submodules, plus
//! the helpers they share for loading models and printing answers.

pub mod ask;
pub mod demo;
pub mod index;

// Re-export command types for convenience
pub use ask::AskCommand;
pub use demo::DemoCommand;
pub use index::IndexCommand;

use ragqa_core::{AppConfig, AppResult};
use ragqa_model::{
    GenerationConfig, ModelContext, QuestionBatch, RagConfig, RagConfigOverrides, RagModel,
    RagTokenizer,
};
use std::path::Path;

/// The model config a command works with: the one saved in `model_path`
/// when given, otherwise defaults built from application settings.
pub(crate) fn resolve_rag_config(
    config: &AppConfig,
    model_path: Option<&Path>,
    overrides: &RagConfigOverrides,
) -> AppResult<RagConfig> {
    match model_path {
        Some(path) => RagConfig::from_pretrained(&config.resolve(path), overrides),
        None => {
            let mut rag_config = RagConfig::default().with_app_settings(config);
            rag_config.apply(overrides);
            rag_config.validate()?;
            Ok(rag_config)
        }
    }
}

/// Encode `questions`, generate, and decode the answers of each question.
pub(crate) async fn generate_answers(
    model: &RagModel,
    tokenizer: &RagTokenizer,
    questions: &[String],
    generation: &GenerationConfig,
) -> AppResult<Vec<Vec<String>>> {
    let batch: QuestionBatch = tokenizer
        .batch_encode(questions, None)?
        .to(model.device());

    let output = model.generate(&batch, generation).await?;

    output
        .per_question()
        .map(|rows| tokenizer.batch_decode(rows, true))
        .collect()
}

/// Console block for one question.
///
/// Answers render as a `Debug` list (`["a", "b"]`): strings are always
/// double-quoted with Rust escapes, so an answer containing a quote prints
/// as `"it\"s"`. This is the intended console format.
pub(crate) fn format_answers(question: &str, answers: &[String]) -> String {
    format!(
        "Question: {}\nTop {} Answers:  {:?}",
        question,
        answers.len(),
        answers
    )
}

/// Resolve a model context, failing early on an unknown device.
pub(crate) fn model_context(config: &AppConfig) -> AppResult<ModelContext> {
    let ctx = ModelContext::from_app_config(config)?;
    tracing::debug!("Model context: device {}, data {:?}", ctx.device, ctx.data_dir);
    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_answers() {
        let answers = vec![
            "linda davis".to_string(),
            "reba mcentire".to_string(),
            "".to_string(),
            "linda davis".to_string(),
        ];
        let text = format_answers("who sings does he love me with reba", &answers);

        assert_eq!(
            text,
            "Question: who sings does he love me with reba\n\
             Top 4 Answers:  [\"linda davis\", \"reba mcentire\", \"\", \"linda davis\"]"
        );
    }

    #[test]
    fn test_format_answers_escapes_quotes() {
        let answers = vec!["it's".to_string(), "the \"nerves\"".to_string()];
        let text = format_answers("q", &answers);

        assert!(text.ends_with(r#"Top 2 Answers:  ["it's", "the \"nerves\""]"#));
    }

    #[test]
    fn test_resolve_defaults_with_overrides() {
        let temp = TempDir::new().unwrap();
        let config = AppConfig {
            workspace: temp.path().to_path_buf(),
            ..AppConfig::default()
        };
        let overrides = RagConfigOverrides {
            dataset_name: Some("dummy_psgs_w100_no_embeddings".to_string()),
            n_docs: Some(2),
            ..RagConfigOverrides::default()
        };

        let rag_config = resolve_rag_config(&config, None, &overrides).unwrap();
        assert_eq!(rag_config.dataset_name, "dummy_psgs_w100_no_embeddings");
        assert_eq!(rag_config.n_docs, 2);
        assert_eq!(rag_config.generator, config.generator);
    }

    #[test]
    fn test_resolve_missing_saved_model() {
        let temp = TempDir::new().unwrap();
        let config = AppConfig {
            workspace: temp.path().to_path_buf(),
            ..AppConfig::default()
        };

        let result = resolve_rag_config(
            &config,
            Some(Path::new("models/absent")),
            &RagConfigOverrides::default(),
        );
        assert!(result.is_err());
    }
}
