//! Offline generator that extracts answer spans from retrieved passages.

use super::{Candidate, GenerationRequest, Generator, GeneratorInput};
use async_trait::async_trait;
use ragqa_core::AppResult;
use ragqa_prompt::PromptDocument;
use std::collections::{HashMap, HashSet};
use unicode_segmentation::UnicodeSegmentation;

const MAX_PHRASE_WORDS: usize = 4;
const MAX_FOLLOW_WORDS: usize = 2;

/// Passage titles name the passage subject and start ahead of spans.
const TITLE_BOOST: f64 = 1.5;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "did", "do", "does", "for", "from", "had",
    "has", "have", "he", "her", "his", "how", "in", "is", "it", "its", "me", "of", "on", "or",
    "she", "that", "the", "their", "they", "this", "to", "was", "were", "what", "when", "where",
    "which", "who", "whom", "why", "with", "you",
];

/// Proposes titles, capitalized phrases and the words following question
/// terms as answers, scored by passage rank and proximity to question
/// terms. Deterministic for a given input.
///
/// A candidate's score is the log of its share of all candidate weight
/// plus the log of how well the best passage covers the question terms,
/// so calls over unrelated passages score lower.
#[derive(Debug, Default)]
pub struct ExtractiveGenerator;

impl ExtractiveGenerator {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug)]
struct Word<'a> {
    text: &'a str,
    /// Punctuation separates this word from the previous one
    boundary_before: bool,
}

impl Word<'_> {
    fn key(&self) -> String {
        self.text.to_lowercase()
    }

    fn is_capitalized(&self) -> bool {
        self.text
            .chars()
            .next()
            .map(|c| c.is_uppercase() || c.is_numeric())
            .unwrap_or(false)
    }
}

fn words(text: &str) -> Vec<Word<'_>> {
    let mut out = Vec::new();
    let mut boundary = false;

    for segment in text.split_word_bounds() {
        if segment.chars().any(char::is_alphanumeric) {
            out.push(Word {
                text: segment,
                boundary_before: boundary,
            });
            boundary = false;
        } else if !segment.trim().is_empty() {
            boundary = true;
        }
    }
    out
}

fn is_stop_word(key: &str) -> bool {
    STOP_WORDS.contains(&key)
}

/// Accumulates candidate scores, remembering first-seen order and form.
#[derive(Default)]
struct Tally {
    order: Vec<String>,
    surface: HashMap<String, String>,
    score: HashMap<String, f64>,
}

impl Tally {
    fn add(&mut self, phrase: &[Word<'_>], score: f64) {
        let surface = phrase.iter().map(|w| w.text).collect::<Vec<_>>().join(" ");
        self.add_text(surface, score);
    }

    fn add_text(&mut self, surface: String, score: f64) {
        let key = surface.to_lowercase();
        if !self.score.contains_key(&key) {
            self.order.push(key.clone());
            self.surface.insert(key.clone(), surface);
        }
        *self.score.entry(key).or_insert(0.0) += score;
    }

    fn ranked(self, limit: usize, coverage: f64) -> Vec<Candidate> {
        let total: f64 = self.score.values().sum();
        let mut ranked: Vec<(usize, &String)> = self.order.iter().enumerate().collect();
        ranked.sort_by(|a, b| {
            self.score[b.1]
                .partial_cmp(&self.score[a.1])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });

        ranked
            .into_iter()
            .take(limit)
            .map(|(_, key)| Candidate {
                text: self.surface[key].clone(),
                score: (self.score[key] / total).ln() + coverage.ln(),
            })
            .collect()
    }
}

fn proximity(start: usize, end: usize, anchors: &[usize]) -> f64 {
    let distance = anchors
        .iter()
        .map(|&q| {
            if q < start {
                start - q
            } else if q > end {
                q - end
            } else {
                0
            }
        })
        .min();

    match distance {
        Some(d) => 0.5 + 1.0 / (1.0 + d as f64),
        None => 0.5,
    }
}

/// Smoothed share of question terms found in a document.
fn coverage(document: &PromptDocument, question_terms: &HashSet<String>) -> f64 {
    let found: HashSet<String> = document
        .title
        .unicode_words()
        .chain(document.text.unicode_words())
        .map(str::to_lowercase)
        .filter(|w| question_terms.contains(w))
        .collect();
    (found.len() + 1) as f64 / (question_terms.len() + 1) as f64
}

/// Drop stop words and question terms from both ends of a phrase.
fn trim_phrase<'w, 'a>(
    mut phrase: &'w [Word<'a>],
    question_terms: &HashSet<String>,
) -> (&'w [Word<'a>], usize) {
    let mut offset = 0;
    let skip = |w: &Word<'_>| {
        let key = w.key();
        is_stop_word(&key) || question_terms.contains(&key)
    };

    while let Some((first, rest)) = phrase.split_first() {
        if !skip(first) {
            break;
        }
        phrase = rest;
        offset += 1;
    }
    while let Some((last, rest)) = phrase.split_last() {
        if !skip(last) {
            break;
        }
        phrase = rest;
    }
    (phrase, offset)
}

#[async_trait]
impl Generator for ExtractiveGenerator {
    fn name(&self) -> &str {
        "extractive"
    }

    async fn generate(
        &self,
        input: &GeneratorInput,
        request: &GenerationRequest,
    ) -> AppResult<Vec<Candidate>> {
        let question_terms: HashSet<String> = input
            .question
            .unicode_words()
            .map(str::to_lowercase)
            .filter(|w| !is_stop_word(w))
            .collect();

        let mut tally = Tally::default();
        let mut best_coverage: f64 = 0.0;

        for document in &input.documents {
            let weight = 1.0 / document.rank.max(1) as f64;
            best_coverage = best_coverage.max(coverage(document, &question_terms));

            let title_words = words(&document.title);
            let (title, _) = trim_phrase(&title_words, &question_terms);
            if !title.is_empty() {
                tally.add_text(document.title.trim().to_string(), weight * TITLE_BOOST);
            }

            let text = words(&document.text);
            let anchors: Vec<usize> = text
                .iter()
                .enumerate()
                .filter(|(_, w)| question_terms.contains(&w.key()))
                .map(|(i, _)| i)
                .collect();

            // Capitalized phrases
            let mut i = 0;
            while i < text.len() {
                if !text[i].is_capitalized() {
                    i += 1;
                    continue;
                }
                let mut end = i + 1;
                while end < text.len()
                    && end - i < MAX_PHRASE_WORDS
                    && text[end].is_capitalized()
                    && !text[end].boundary_before
                {
                    end += 1;
                }

                let (phrase, offset) = trim_phrase(&text[i..end], &question_terms);
                if !phrase.is_empty() {
                    let start = i + offset;
                    let score = proximity(start, start + phrase.len() - 1, &anchors);
                    tally.add(phrase, weight * score);
                }
                i = end;
            }

            // Words right after a question term
            for &anchor in &anchors {
                let mut start = anchor + 1;
                while start < text.len()
                    && is_stop_word(&text[start].key())
                    && !text[start].boundary_before
                {
                    start += 1;
                }

                let mut end = start;
                while end < text.len()
                    && end - start < MAX_FOLLOW_WORDS
                    && !text[end].boundary_before
                    && !is_stop_word(&text[end].key())
                    && !question_terms.contains(&text[end].key())
                {
                    end += 1;
                }

                // Capitalized words were scored as phrases
                if end > start && !text[start].is_capitalized() {
                    let score = proximity(start, end - 1, &anchors);
                    tally.add(&text[start..end], weight * score);
                }
            }
        }

        let candidates = tally.ranked(request.num_candidates, best_coverage);
        tracing::debug!(
            "Extracted {} candidates for '{}'",
            candidates.len(),
            input.question
        );
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(rank: usize, title: &str, text: &str) -> PromptDocument {
        PromptDocument {
            rank,
            title: title.to_string(),
            text: text.to_string(),
        }
    }

    fn input(question: &str, documents: Vec<PromptDocument>) -> GeneratorInput {
        GeneratorInput {
            question: question.to_string(),
            input: String::new(),
            documents,
        }
    }

    fn request(n: usize) -> GenerationRequest {
        GenerationRequest {
            num_candidates: n,
            max_length: 10,
            early_stopping: false,
        }
    }

    #[test]
    fn test_words_track_boundaries() {
        let w = words("Reba McEntire. Her duet");
        let texts: Vec<_> = w.iter().map(|w| w.text).collect();
        assert_eq!(texts, vec!["Reba", "McEntire", "Her", "duet"]);
        assert!(w[2].boundary_before);
        assert!(!w[1].boundary_before);
    }

    #[test]
    fn test_coverage() {
        let terms: HashSet<String> = ["love", "reba", "sings"].map(String::from).into();
        let linda = doc(1, "Linda Davis", "Does He Love You, her duet with Reba McEntire.");
        let other = doc(2, "Isaac Newton", "Newton developed calculus.");
        assert_eq!(coverage(&linda, &terms), 0.75);
        assert_eq!(coverage(&other, &terms), 0.25);
    }

    #[test]
    fn test_proximity() {
        assert_eq!(proximity(3, 4, &[4]), 1.5);
        assert_eq!(proximity(3, 4, &[5]), 1.0);
        assert_eq!(proximity(3, 4, &[]), 0.5);
    }

    #[tokio::test]
    async fn test_title_ranks_first() {
        let gen = ExtractiveGenerator::new();
        let documents = vec![doc(
            1,
            "Linda Davis",
            "Linda Kaye Davis is an American country music singer. Her highest chart entry is Does He Love You, her duet with Reba McEntire.",
        )];

        let candidates = gen
            .generate(&input("who sings does he love me with reba", documents), &request(4))
            .await
            .unwrap();

        assert_eq!(candidates.len(), 4);
        assert_eq!(candidates[0].text, "Linda Davis");
        assert!(candidates.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(candidates.iter().all(|c| c.score <= 0.0));
        // Question terms alone are never proposed
        assert!(candidates.iter().all(|c| c.text.to_lowercase() != "love"));
        assert!(candidates.iter().any(|c| c.text == "McEntire"));
    }

    #[tokio::test]
    async fn test_rank_weighting() {
        let gen = ExtractiveGenerator::new();
        let documents = vec![
            doc(1, "Isaac Newton", "Newton developed calculus."),
            doc(2, "Gottfried Leibniz", "Leibniz developed calculus."),
        ];

        let candidates = gen
            .generate(&input("who invented calculus", documents), &request(4))
            .await
            .unwrap();
        let texts: Vec<_> = candidates.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["Isaac Newton", "Newton", "Gottfried Leibniz", "Leibniz"]
        );
    }

    #[tokio::test]
    async fn test_deterministic_and_empty() {
        let gen = ExtractiveGenerator::new();
        let documents = vec![doc(
            1,
            "Peripheral nervous system",
            "The peripheral nervous system consists of the nerves and ganglia outside the brain and spinal cord.",
        )];
        let q = "what parts make up the peripheral nervous system";

        let a = gen.generate(&input(q, documents.clone()), &request(4)).await.unwrap();
        let b = gen.generate(&input(q, documents), &request(4)).await.unwrap();
        assert_eq!(a, b);
        assert!(!a.is_empty());

        let none = gen.generate(&input(q, Vec::new()), &request(4)).await.unwrap();
        assert!(none.is_empty());
    }
}
