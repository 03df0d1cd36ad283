//! Retrieval-augmented generation models for ragqa.
//!
//! Assembles a `RagModel` from a question encoder, a retriever and a
//! generator backend, and generates answers for batches of questions.
//!
//! # Example
//! ```no_run
//! use ragqa_core::AppConfig;
//! use ragqa_model::{GenerationConfig, ModelContext, RagConfig, RagModel, RagTokenizer, RagVariant};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let app = AppConfig::load(None, None)?;
//! let ctx = ModelContext::from_app_config(&app)?;
//!
//! let config = RagConfig::default().with_app_settings(&app);
//! let model = RagModel::new(config, RagVariant::Sequence, &ctx).await?.eval();
//!
//! let tokenizer = RagTokenizer::from_pretrained("facebook/bart-large", &ctx.resolver()?).await?;
//! let batch = tokenizer.batch_encode(&["who invented calculus".to_string()], None)?;
//! let output = model.generate(&batch, &GenerationConfig::demo(4)).await?;
//! println!("{:?}", tokenizer.batch_decode(&output.sequences, true)?);
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod checkpoint;
pub mod config;
pub mod context;
pub mod device;
pub mod generation;
pub mod generators;
pub mod model;
pub mod tokenizer;

pub use batch::{GeneratedBatch, QuestionBatch};
pub use checkpoint::CheckpointResolver;
pub use config::{RagConfig, RagConfigOverrides};
pub use context::ModelContext;
pub use device::Device;
pub use generation::{GenerationConfig, Hypothesis};
pub use generators::{create_generator, Candidate, Generator, GeneratorInput};
pub use model::{RagComponents, RagModel, RagVariant};
pub use tokenizer::RagTokenizer;
