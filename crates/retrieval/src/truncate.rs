//! Passage truncation before embedding.

use ragqa_core::AppResult;
use unicode_segmentation::UnicodeSegmentation;

/// Shortens passage text to a token budget before it is embedded.
///
/// The model crate implements this with the context tokenizer; retrieval
/// falls back to counting words.
pub trait ContextTruncator: Send + Sync {
    fn truncate(&self, text: &str, max_tokens: usize) -> AppResult<String>;
}

/// Truncates at Unicode word boundaries.
#[derive(Debug, Default, Clone, Copy)]
pub struct WordTruncator;

impl ContextTruncator for WordTruncator {
    fn truncate(&self, text: &str, max_tokens: usize) -> AppResult<String> {
        match text.unicode_word_indices().nth(max_tokens) {
            Some((cut, _)) => Ok(text[..cut].trim_end().to_string()),
            None => Ok(text.to_string()),
        }
    }
}
