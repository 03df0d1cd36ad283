//! Generator backend crate for ragqa.
//!
//! Provides a provider-agnostic client abstraction for text-generation
//! engines. Generators in `ragqa-model` draw answer candidates through it.
//!
//! # Providers
//! - **Ollama**: local LLM runtime
//!
//! # Example
//! ```no_run
//! use ragqa_llm::{LlmClient, LlmRequest, OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("who invented calculus", "llama3.2").with_max_tokens(10);
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;

pub use client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
pub use factory::create_client;
pub use providers::OllamaClient;
