//! Generator prompt templates for ragqa.
//!
//! This crate provides:
//! - Built-in templates for per-passage and all-passage generation
//! - YAML overrides under `.ragqa/prompts/`
//! - Handlebars template rendering

pub mod builder;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::build_prompt;
pub use loader::{default_prompt, load_prompt};
pub use types::{
    BuiltPrompt, PromptDefinition, PromptDocument, PromptVariables, SEQUENCE_PROMPT_ID,
    TOKEN_PROMPT_ID,
};
