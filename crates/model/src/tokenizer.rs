//! Pretrained tokenizers.
//!
//! Wraps a Hugging Face `tokenizer.json`. Padding and truncation are
//! handled here rather than by the tokenizer's own settings, so a
//! checkpoint's padding config never changes batch shapes.

use crate::batch::QuestionBatch;
use crate::checkpoint::CheckpointResolver;
use crate::device::Device;
use ragqa_core::{AppError, AppResult};
use ragqa_retrieval::{ContextTruncator, WordTruncator};
use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;
use tokenizers::Tokenizer;

/// Tokenizer file inside a checkpoint.
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// Questions longer than this are truncated when batching.
pub const DEFAULT_MAX_INPUT_LENGTH: usize = 512;

const PAD_TOKENS: &[&str] = &["<pad>", "[PAD]", "<|pad|>"];

#[derive(Debug, Clone)]
pub struct RagTokenizer {
    name: String,
    inner: Tokenizer,
    pad_id: u32,
    special_ids: BTreeSet<u32>,
}

impl RagTokenizer {
    /// Load `tokenizer.json` from a checkpoint directory, the cache or the Hub.
    pub async fn from_pretrained(
        name_or_path: &str,
        resolver: &CheckpointResolver,
    ) -> AppResult<Self> {
        let path = resolver.resolve_file(name_or_path, TOKENIZER_FILE).await?;
        let mut tokenizer = Self::from_file(&path)?;
        tokenizer.name = name_or_path.to_string();
        Ok(tokenizer)
    }

    pub fn from_file(path: &Path) -> AppResult<Self> {
        let inner = Tokenizer::from_file(path).map_err(|e| {
            AppError::Tokenizer(format!("Failed to load tokenizer {:?}: {}", path, e))
        })?;
        Self::from_tokenizer(path.display().to_string(), inner)
    }

    pub fn from_json(name: impl Into<String>, json: &str) -> AppResult<Self> {
        let inner = Tokenizer::from_str(json)
            .map_err(|e| AppError::Tokenizer(format!("Invalid tokenizer JSON: {}", e)))?;
        Self::from_tokenizer(name.into(), inner)
    }

    fn from_tokenizer(name: String, mut inner: Tokenizer) -> AppResult<Self> {
        inner.with_padding(None);
        inner
            .with_truncation(None)
            .map_err(|e| AppError::Tokenizer(format!("Failed to reset truncation: {}", e)))?;

        let pad_id = PAD_TOKENS
            .iter()
            .find_map(|token| inner.token_to_id(token))
            .unwrap_or(0);

        let special_ids = inner
            .get_added_tokens_decoder()
            .iter()
            .filter(|(_, token)| token.special)
            .map(|(id, _)| *id)
            .collect::<BTreeSet<_>>();

        tracing::debug!(
            "Loaded tokenizer '{}' (vocab {}, pad id {}, {} special tokens)",
            name,
            inner.get_vocab_size(true),
            pad_id,
            special_ids.len()
        );

        Ok(Self {
            name,
            inner,
            pad_id,
            special_ids,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pad_id(&self) -> u32 {
        self.pad_id
    }

    pub fn is_special(&self, id: u32) -> bool {
        self.special_ids.contains(&id)
    }

    pub fn encode(&self, text: &str, add_special_tokens: bool) -> AppResult<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, add_special_tokens)
            .map_err(|e| AppError::Tokenizer(format!("Failed to encode '{}': {}", text, e)))?;
        Ok(encoding.get_ids().to_vec())
    }

    /// Encode questions into a right-padded batch on the CPU.
    pub fn batch_encode(
        &self,
        questions: &[String],
        max_length: Option<usize>,
    ) -> AppResult<QuestionBatch> {
        let max_length = max_length.unwrap_or(DEFAULT_MAX_INPUT_LENGTH).max(1);

        let mut encoded = questions
            .iter()
            .map(|q| self.encode(q, true))
            .collect::<AppResult<Vec<_>>>()?;
        for ids in &mut encoded {
            ids.truncate(max_length);
        }

        let width = encoded.iter().map(Vec::len).max().unwrap_or(0);
        let mut input_ids = Vec::with_capacity(encoded.len());
        let mut attention_mask = Vec::with_capacity(encoded.len());

        for mut ids in encoded {
            let mut mask = vec![1u8; ids.len()];
            mask.resize(width, 0);
            ids.resize(width, self.pad_id);
            input_ids.push(ids);
            attention_mask.push(mask);
        }

        Ok(QuestionBatch {
            input_ids,
            attention_mask,
            pad_id: self.pad_id,
            device: Device::Cpu,
        })
    }

    pub fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> AppResult<String> {
        let text = self
            .inner
            .decode(ids, skip_special_tokens)
            .map_err(|e| AppError::Tokenizer(format!("Failed to decode: {}", e)))?;
        Ok(text.trim().to_string())
    }

    pub fn batch_decode(
        &self,
        sequences: &[Vec<u32>],
        skip_special_tokens: bool,
    ) -> AppResult<Vec<String>> {
        sequences
            .iter()
            .map(|ids| self.decode(ids, skip_special_tokens))
            .collect()
    }

    /// Longest prefix of `text` that encodes to at most `max_tokens`
    /// tokens (special tokens excluded).
    pub fn truncate_to_tokens(&self, text: &str, max_tokens: usize) -> AppResult<String> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| AppError::Tokenizer(format!("Failed to encode passage: {}", e)))?;

        if encoding.get_ids().len() <= max_tokens {
            return Ok(text.to_string());
        }
        if max_tokens == 0 {
            return Ok(String::new());
        }

        let end = encoding.get_offsets()[max_tokens - 1].1;
        match text.get(..end) {
            Some(prefix) => Ok(prefix.trim_end().to_string()),
            // Offsets that do not land on a char boundary
            None => WordTruncator.truncate(text, max_tokens),
        }
    }
}

impl ContextTruncator for RagTokenizer {
    fn truncate(&self, text: &str, max_tokens: usize) -> AppResult<String> {
        self.truncate_to_tokens(text, max_tokens)
    }
}

/// Word-level tokenizer JSON with BART-style special tokens
/// (`<s>`=0, `<pad>`=1, `</s>`=2, `<unk>`=3). Shared by tests across
/// the crate.
#[cfg(test)]
pub(crate) fn test_tokenizer_json(words: &[&str]) -> String {
    let mut vocab = serde_json::json!({"<s>": 0, "<pad>": 1, "</s>": 2, "<unk>": 3});
    let mut next_id = 4u32;
    for word in words {
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
