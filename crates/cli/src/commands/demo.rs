//! Demo command handler.
//!
//! Runs every model configuration over the same questions: a custom
//! composition with a T5 generator tokenizer, token and sequence models
//! loaded from saved paths and built fresh, and a sequence model that
//! indexes its dataset on the fly.

use super::{format_answers, generate_answers, model_context, resolve_rag_config};
use clap::Args;
use ragqa_core::{config::AppConfig, AppError, AppResult};
use ragqa_model::{
    GenerationConfig, ModelContext, RagComponents, RagConfig, RagConfigOverrides, RagModel,
    RagTokenizer, RagVariant,
};
use tokio::sync::OnceCell;

/// Questions answered when none are given.
pub const DEFAULT_QUESTIONS: [&str; 3] = [
    "who sings does he love me with reba",
    "who were the two mathematicians that invented calculus",
    "what parts make up the peripheral nervous system",
];

const T5_TOKENIZER: &str = "t5-base";
const BART_TOKENIZER: &str = "facebook/bart-large";
const ON_THE_FLY_DATASET: &str = "dummy_psgs_w100_no_embeddings";

/// Run every model configuration on the demo questions
#[derive(Args, Debug)]
pub struct DemoCommand {
    /// Beams, and answers printed per question
    #[arg(long, default_value = "4")]
    pub num_beams: usize,

    /// Question to answer (repeatable; replaces the built-in questions)
    #[arg(short, long = "question")]
    pub questions: Vec<String>,
}

/// One model configuration of the demo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DemoRun {
    T5Custom,
    TokenSaved,
    TokenFresh,
    SequenceSaved,
    SequenceFresh,
    SequenceOnTheFly,
}

impl DemoRun {
    const ALL: [DemoRun; 6] = [
        DemoRun::T5Custom,
        DemoRun::TokenSaved,
        DemoRun::TokenFresh,
        DemoRun::SequenceSaved,
        DemoRun::SequenceFresh,
        DemoRun::SequenceOnTheFly,
    ];

    /// Heading printed before the first run of a group.
    fn heading(self) -> Option<&'static str> {
        match self {
            DemoRun::T5Custom => Some("RAG WITH T5 MODEL"),
            DemoRun::TokenSaved => Some("TOKEN MODEL"),
            DemoRun::SequenceSaved => Some("SEQUENCE MODEL"),
            DemoRun::SequenceOnTheFly => Some("SEQUENCE MODEL WITH INDEXING ON THE FLY"),
            DemoRun::TokenFresh | DemoRun::SequenceFresh => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            DemoRun::T5Custom => "t5 custom composition",
            DemoRun::TokenSaved => "token model (saved)",
            DemoRun::TokenFresh => "token model (fresh)",
            DemoRun::SequenceSaved => "sequence model (saved)",
            DemoRun::SequenceFresh => "sequence model (fresh)",
            DemoRun::SequenceOnTheFly => "sequence model (on-the-fly index)",
        }
    }

    fn variant(self) -> RagVariant {
        match self {
            DemoRun::TokenSaved | DemoRun::TokenFresh => RagVariant::Token,
            _ => RagVariant::Sequence,
        }
    }
}

impl DemoCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing demo command with {} beams", self.num_beams);

        let generation = GenerationConfig::demo(self.num_beams);
        generation.validate()?;

        run_all(config, &self.questions(), &generation, |line| println!("{}", line)).await
    }

    fn questions(&self) -> Vec<String> {
        if self.questions.is_empty() {
            DEFAULT_QUESTIONS.iter().map(|q| q.to_string()).collect()
        } else {
            self.questions.clone()
        }
    }
}

/// Run every configuration in order, handing each output line to `emit`.
/// A failed run is logged and the remaining runs still execute; failures
/// are reported together at the end.
async fn run_all(
    config: &AppConfig,
    questions: &[String],
    generation: &GenerationConfig,
    mut emit: impl FnMut(&str),
) -> AppResult<()> {
    let ctx = model_context(config)?;
    let bart_tokenizer = OnceCell::new();
    let mut failures = Vec::new();

    for run in DemoRun::ALL {
        if let Some(heading) = run.heading() {
            emit("");
            emit(heading);
        }

        match run_once(run, config, &ctx, &bart_tokenizer, questions, generation).await {
            Ok(blocks) => blocks.iter().for_each(|block| emit(block.as_str())),
            Err(e) => {
                tracing::error!("Demo run '{}' failed: {}", run.label(), e);
                failures.push(run.label());
            }
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(AppError::Other(format!(
            "{} of {} demo runs failed: {}",
            failures.len(),
            DemoRun::ALL.len(),
            failures.join(", ")
        )))
    }
}

/// Load the model of one run and format its answers, one block per
/// question.
async fn run_once(
    run: DemoRun,
    config: &AppConfig,
    ctx: &ModelContext,
    bart_tokenizer: &OnceCell<RagTokenizer>,
    questions: &[String],
    generation: &GenerationConfig,
) -> AppResult<Vec<String>> {
    let model = load_model(run, config, ctx).await?;

    // The T5 composition encodes with its own generator tokenizer
    let tokenizer = match run {
        DemoRun::T5Custom => model.generator_tokenizer(),
        _ => {
            let resolver = ctx.resolver()?;
            bart_tokenizer
                .get_or_try_init(|| RagTokenizer::from_pretrained(BART_TOKENIZER, &resolver))
                .await?
        }
    };

    let answers = generate_answers(&model, tokenizer, questions, generation).await?;
    Ok(questions
        .iter()
        .zip(&answers)
        .map(|(question, answers)| format_answers(question, answers))
        .collect())
}

/// Build the model of one demo run, ready for inference on the context
/// device.
async fn load_model(run: DemoRun, config: &AppConfig, ctx: &ModelContext) -> AppResult<RagModel> {
    let fresh = || RagConfig::default().with_app_settings(config);

    let model = match run {
        DemoRun::T5Custom => {
            // Composed explicitly around a T5 generator tokenizer
            let rag_config = fresh().with_generator_checkpoint(T5_TOKENIZER);
            let components = RagComponents::load(&rag_config, run.variant(), ctx).await?;
            RagModel::from_components(rag_config, run.variant(), components)
        }
        DemoRun::TokenSaved | DemoRun::SequenceSaved => {
            let path = match run {
                DemoRun::TokenSaved => &config.demo.token_model_path,
                _ => &config.demo.sequence_model_path,
            };
            RagModel::from_pretrained(
                &config.resolve(path),
                run.variant(),
                &RagConfigOverrides::default(),
                ctx,
            )
            .await?
        }
        DemoRun::TokenFresh | DemoRun::SequenceFresh => {
            RagModel::new(
                fresh().with_generator_checkpoint(BART_TOKENIZER),
                run.variant(),
                ctx,
            )
            .await?
        }
        DemoRun::SequenceOnTheFly => {
            let overrides = RagConfigOverrides {
                dataset_name: Some(ON_THE_FLY_DATASET.to_string()),
                ..RagConfigOverrides::default()
            };
            let saved = config.demo.sequence_model_path.as_path();
            let rag_config = resolve_rag_config(config, Some(saved), &overrides)?;
            RagModel::new(rag_config, run.variant(), ctx).await?
        }
    };

    Ok(model.eval().to(ctx.device))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::index::{DatasetArgs, IndexBuildCommand};
    use ragqa_core::config::{EncoderSettings, GeneratorSettings};
    use ragqa_retrieval::dataset::write_jsonl;
    use ragqa_retrieval::{DatasetSpec, Passage};
    use std::fs;
    use tempfile::TempDir;

    const CONTEXT_TOKENIZER: &str = "facebook/dpr-ctx_encoder-single-nq-base";

    fn corpus() -> Vec<Passage> {
        vec![
            Passage::new(
                "1",
                "Linda Davis",
                "Linda Kaye Davis is an American country music singer. Her duet Does He Love You was recorded with Reba McEntire.",
            ),
            Passage::new(
                "2",
                "Isaac Newton",
                "Most historians believe that Newton and Leibniz invented calculus independently.",
            ),
            Passage::new(
                "3",
                "Peripheral nervous system",
                "The peripheral nervous system is made up of the nerves and ganglia outside the brain and spinal cord.",
            ),
        ]
    }

    /// Word-level tokenizer covering the questions and the corpus.
    fn tokenizer_json() -> String {
        let mut vocab = serde_json::json!({"<s>": 0, "<pad>": 1, "</s>": 2, "<unk>": 3});
        let mut text = DEFAULT_QUESTIONS.join(" ");
        for passage in corpus() {
            text.push_str(&format!(" {} {}", passage.title, passage.text));
        }
        let mut next_id = 4u32;
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .chain(["/", "//", ".", ","])
            .filter(|w| !w.is_empty())
        {
            let word = word.to_lowercase();
            if vocab.get(&word).is_none() {
                vocab[word] = serde_json::json!(next_id);
                next_id += 1;
            }
        }

        let added = |id: u32, content: &str| {
            serde_json::json!({
                "id": id, "content": content, "single_word": false, "lstrip": false,
                "rstrip": false, "normalized": false, "special": true
            })
        };
        serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [added(0, "<s>"), added(1, "<pad>"), added(2, "</s>"), added(3, "<unk>")],
            "normalizer": {"type": "Lowercase"},
            "pre_tokenizer": {"type": "Whitespace"},
            "post_processor": {
                "type": "TemplateProcessing",
                "single": [
                    {"SpecialToken": {"id": "<s>", "type_id": 0}},
                    {"Sequence": {"id": "A", "type_id": 0}},
                    {"SpecialToken": {"id": "</s>", "type_id": 0}}
                ],
                "pair": [
                    {"SpecialToken": {"id": "<s>", "type_id": 0}},
                    {"Sequence": {"id": "A", "type_id": 0}},
                    {"SpecialToken": {"id": "</s>", "type_id": 0}},
                    {"Sequence": {"id": "B", "type_id": 0}},
                    {"SpecialToken": {"id": "</s>", "type_id": 0}}
                ],
                "special_tokens": {
                    "<s>": {"id": "<s>", "ids": [0], "tokens": ["<s>"]},
                    "</s>": {"id": "</s>", "ids": [2], "tokens": ["</s>"]}
                }
            },
            "decoder": null,
            "model": {"type": "WordLevel", "vocab": vocab, "unk_token": "<unk>"}
        })
        .to_string()
    }

    /// Offline workspace: cached tokenizers, both datasets, a built exact
    /// index and the two saved models.
    async fn demo_workspace(temp: &TempDir) -> AppConfig {
        let config = AppConfig {
            workspace: temp.path().to_path_buf(),
            device: "cpu".to_string(),
            allow_downloads: false,
            generator: GeneratorSettings {
                provider: "extractive".to_string(),
                ..GeneratorSettings::default()
            },
            question_encoder: EncoderSettings {
                provider: "trigram".to_string(),
                dimensions: 64,
                ..EncoderSettings::default()
            },
            ..AppConfig::default()
        };

        let json = tokenizer_json();
        for name in [T5_TOKENIZER, BART_TOKENIZER, CONTEXT_TOKENIZER] {
            let dir = config.cache_dir().join(name);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("tokenizer.json"), &json).unwrap();
        }

        for name in ["psgs_w100", ON_THE_FLY_DATASET] {
            let spec = DatasetSpec::new("wiki_dpr", name, "train");
            write_jsonl(&spec.jsonl_path(&config.data_dir()), &corpus()).unwrap();
        }

        IndexBuildCommand {
            dataset: DatasetArgs {
                model_path: None,
                dataset_name: None,
                json: false,
            },
            from_dir: None,
            word_truncation: false,
        }
        .execute(&config)
        .await
        .unwrap();

        let saved = RagConfig::default().with_app_settings(&config);
        saved
            .save_pretrained(&config.resolve(&config.demo.token_model_path))
            .unwrap();
        saved
            .save_pretrained(&config.resolve(&config.demo.sequence_model_path))
            .unwrap();

        config
    }

    fn questions() -> Vec<String> {
        DEFAULT_QUESTIONS.iter().map(|q| q.to_string()).collect()
    }

    #[test]
    fn test_default_questions() {
        let cmd = DemoCommand {
            num_beams: 4,
            questions: Vec::new(),
        };
        let questions = cmd.questions();
        assert_eq!(questions.len(), 3);
        assert_eq!(questions[0], "who sings does he love me with reba");
    }

    #[test]
    fn test_questions_replace_defaults() {
        let cmd = DemoCommand {
            num_beams: 2,
            questions: vec!["who wrote hamlet".to_string()],
        };
        assert_eq!(cmd.questions(), vec!["who wrote hamlet".to_string()]);
    }

    #[test]
    fn test_run_order_and_headings() {
        let headings: Vec<_> = DemoRun::ALL.iter().filter_map(|r| r.heading()).collect();
        assert_eq!(
            headings,
            vec![
                "RAG WITH T5 MODEL",
                "TOKEN MODEL",
                "SEQUENCE MODEL",
                "SEQUENCE MODEL WITH INDEXING ON THE FLY"
            ]
        );

        let tokens = DemoRun::ALL
            .iter()
            .filter(|r| r.variant() == RagVariant::Token)
            .count();
        assert_eq!(tokens, 2);
    }

    #[tokio::test]
    async fn test_every_run_answers_each_question() {
        let temp = TempDir::new().unwrap();
        let config = demo_workspace(&temp).await;
        let ctx = model_context(&config).unwrap();
        let generation = GenerationConfig::demo(4);
        let resolver = ctx.resolver().unwrap();
        let bart = RagTokenizer::from_pretrained(BART_TOKENIZER, &resolver)
            .await
            .unwrap();

        for run in DemoRun::ALL {
            let model = load_model(run, &config, &ctx).await.unwrap();
            assert_eq!(model.variant(), run.variant(), "{}", run.label());

            let tokenizer = match run {
                DemoRun::T5Custom => {
                    assert_eq!(model.generator_tokenizer().name(), T5_TOKENIZER);
                    model.generator_tokenizer()
                }
                _ => &bart,
            };
            let answers = generate_answers(&model, tokenizer, &questions(), &generation)
                .await
                .unwrap();

            assert_eq!(answers.len(), DEFAULT_QUESTIONS.len(), "{}", run.label());
            assert!(answers.iter().all(|a| a.len() == 4), "{}", run.label());
        }
    }

    #[tokio::test]
    async fn test_run_all_prints_one_block_per_question() {
        let temp = TempDir::new().unwrap();
        let config = demo_workspace(&temp).await;
        let mut lines = Vec::new();

        run_all(&config, &questions(), &GenerationConfig::demo(4), |line| {
            lines.push(line.to_string())
        })
        .await
        .unwrap();

        let blocks: Vec<_> = lines.iter().filter(|l| l.starts_with("Question: ")).collect();
        assert_eq!(blocks.len(), DemoRun::ALL.len() * DEFAULT_QUESTIONS.len());
        assert!(blocks.iter().all(|b| b.contains("\nTop 4 Answers:  [")));
        assert!(lines.iter().any(|l| l == "SEQUENCE MODEL WITH INDEXING ON THE FLY"));
    }

    #[tokio::test]
    async fn test_failed_run_is_reported_after_the_rest() {
        let temp = TempDir::new().unwrap();
        let config = demo_workspace(&temp).await;
        fs::remove_dir_all(config.resolve(&config.demo.token_model_path)).unwrap();
        let mut lines = Vec::new();

        let result = run_all(&config, &questions(), &GenerationConfig::demo(2), |line| {
            lines.push(line.to_string())
        })
        .await;

        match result {
            Err(AppError::Other(msg)) => {
                assert!(msg.starts_with("1 of 6 demo runs failed"), "{}", msg);
                assert!(msg.contains("token model (saved)"), "{}", msg);
            }
            other => panic!("Expected a demo failure, got {:?}", other),
        }

        let blocks = lines.iter().filter(|l| l.starts_with("Question: ")).count();
        assert_eq!(blocks, (DemoRun::ALL.len() - 1) * DEFAULT_QUESTIONS.len());
    }
}
