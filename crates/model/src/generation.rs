//! Generation hyperparameters and hypothesis shaping.

use crate::generators::Candidate;
use crate::tokenizer::RagTokenizer;
use ragqa_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Hyperparameters for `RagModel::generate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Candidate answers requested from the generator per context
    pub num_beams: usize,

    /// Sequences returned per question
    pub num_return_sequences: usize,

    /// Minimum answer length in generator tokens, special tokens excluded
    pub min_length: usize,

    /// Maximum sequence length in generator tokens, special tokens included
    pub max_length: usize,

    /// Stop drawing candidates once the generator repeats itself
    pub early_stopping: bool,

    /// Token-id sequences that must never appear in an output
    pub bad_words_ids: Vec<Vec<u32>>,
}

impl GenerationConfig {
    /// Short-answer settings used by the demo and `ragqa ask`.
    pub fn demo(num_beams: usize) -> Self {
        Self {
            num_beams,
            num_return_sequences: num_beams,
            min_length: 1,
            max_length: 10,
            early_stopping: false,
            // Repeated start-of-sequence tokens
            bad_words_ids: vec![vec![0, 0]],
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.num_beams == 0 || self.num_return_sequences == 0 {
            return Err(AppError::Config(
                "num_beams and num_return_sequences must be at least 1".to_string(),
            ));
        }
        if self.num_return_sequences > self.num_beams {
            return Err(AppError::Config(format!(
                "num_return_sequences ({}) must not exceed num_beams ({})",
                self.num_return_sequences, self.num_beams
            )));
        }
        if self.max_length == 0 {
            return Err(AppError::Config("max_length must be at least 1".to_string()));
        }
        if self.min_length > self.max_length {
            return Err(AppError::Config(format!(
                "min_length ({}) must not exceed max_length ({})",
                self.min_length, self.max_length
            )));
        }
        if self.bad_words_ids.iter().any(Vec::is_empty) {
            return Err(AppError::Config(
                "bad_words_ids must not contain empty sequences".to_string(),
            ));
        }
        Ok(())
    }
}

/// A generated answer, tokenized with the generator tokenizer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hypothesis {
    pub token_ids: Vec<u32>,

    /// Log-probability-like score, higher is better
    pub score: f64,
}

/// Whether `ids` contains any banned sequence contiguously.
pub fn contains_banned(ids: &[u32], banned: &[Vec<u32>]) -> bool {
    banned
        .iter()
        .filter(|seq| !seq.is_empty())
        .any(|seq| ids.windows(seq.len()).any(|window| window == seq.as_slice()))
}

/// Tokenize candidates and apply the length and banned-sequence
/// constraints. Order is preserved.
pub fn shape_candidates(
    candidates: Vec<Candidate>,
    tokenizer: &RagTokenizer,
    config: &GenerationConfig,
) -> AppResult<Vec<Hypothesis>> {
    let mut shaped = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let mut ids = tokenizer.encode(&candidate.text, true)?;
        ids.truncate(config.max_length);

        let content = ids.iter().filter(|id| !tokenizer.is_special(**id)).count();
        if content < config.min_length {
            tracing::trace!("Dropping short candidate '{}'", candidate.text);
            continue;
        }
        if contains_banned(&ids, &config.bad_words_ids) {
            tracing::trace!("Dropping banned candidate '{}'", candidate.text);
            continue;
        }

        shaped.push(Hypothesis {
            token_ids: ids,
            score: candidate.score,
        });
    }

    Ok(shaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::test_tokenizer_json;

    fn tokenizer() -> RagTokenizer {
        let words = [
            "gottfried", "wilhelm", "leibniz", "and", "isaac", "newton", "a", "b", "c", "d", "e",
            "f", "g", "h", "i", "j",
        ];
        RagTokenizer::from_json("test", &test_tokenizer_json(&words)).unwrap()
    }

    fn candidate(text: &str, score: f64) -> Candidate {
        Candidate {
            text: text.to_string(),
            score,
        }
    }

    #[test]
    fn test_demo_config() {
        let config = GenerationConfig::demo(4);
        assert_eq!(config.num_return_sequences, 4);
        assert_eq!(config.min_length, 1);
        assert_eq!(config.max_length, 10);
        assert!(!config.early_stopping);
        assert_eq!(config.bad_words_ids, vec![vec![0, 0]]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_invalid() {
        let mut config = GenerationConfig::demo(4);
        config.num_return_sequences = 5;
        assert!(config.validate().is_err());

        let mut config = GenerationConfig::demo(4);
        config.min_length = 11;
        assert!(config.validate().is_err());

        assert!(GenerationConfig::demo(0).validate().is_err());

        let mut config = GenerationConfig::demo(2);
        config.bad_words_ids = vec![vec![]];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_contains_banned() {
        let banned = vec![vec![0, 0]];
        assert!(contains_banned(&[2, 0, 0, 5], &banned));
        assert!(!contains_banned(&[0, 5, 0], &banned));
        assert!(!contains_banned(&[], &banned));
    }

    #[test]
    fn test_shape_truncates_to_max_length() {
        let tok = tokenizer();
        let config = GenerationConfig::demo(4);
        let shaped = shape_candidates(
            vec![candidate("a b c d e f g h i j", -1.0)],
            &tok,
            &config,
        )
        .unwrap();

        assert_eq!(shaped.len(), 1);
        assert_eq!(shaped[0].token_ids.len(), 10);
        assert_eq!(tok.decode(&shaped[0].token_ids, true).unwrap(), "a b c d e f g h i");
        assert_eq!(shaped[0].score, -1.0);
    }

    #[test]
    fn test_shape_drops_short_and_banned() {
        let tok = tokenizer();
        let mut config = GenerationConfig::demo(4);
        config.min_length = 2;
        config.bad_words_ids = vec![vec![0, 0], vec![8, 9]];

        // "isaac newton" encodes to 0 8 9 2
        let shaped = shape_candidates(
            vec![
                candidate("leibniz", 0.0),
                candidate("Isaac Newton", -1.0),
                candidate("Gottfried Wilhelm Leibniz", -2.0),
                candidate("   ", -3.0),
            ],
            &tok,
            &config,
        )
        .unwrap();

        assert_eq!(shaped.len(), 1);
        assert_eq!(
            tok.decode(&shaped[0].token_ids, true).unwrap(),
            "gottfried wilhelm leibniz"
        );
    }
}
