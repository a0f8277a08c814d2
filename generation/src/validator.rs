use crate::generator::AnswerDraft;
use crate::sources::SourceMap;
use regex::Regex;
use std::collections::BTreeSet;
use tracing::{debug, warn};

const CITATION_PATTERN: &str = r"(?i)\[Source\s+\d+(\s*,\s*\d+)*\]";

const UNCERTAINTY_PATTERNS: [&str; 9] = [
    r"(?i)I don't have",
    r"(?i)I do not have",
    r"(?i)insufficient information",
    r"(?i)not enough information",
    r"(?i)cannot find",
    r"(?i)unable to answer",
    r"(?i)no information",
    r"(?i)sources don't contain",
    r"(?i)sources do not contain",
];

const GENERIC_PATTERNS: [&str; 7] = [
    r"(?i)in general",
    r"(?i)typically",
    r"(?i)usually",
    r"(?i)commonly",
    r"(?i)it is known that",
    r"(?i)studies show",
    r"(?i)research indicates",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedAnswer {
    pub answer: String,
    pub citations: Vec<u32>,
    pub invalid_citations: Vec<u32>,
    pub has_hallucinations: bool,
    pub confidence: f32,
    pub warnings: Vec<String>,
    pub usage: Option<corpora_core::model::TokenUsage>,
    pub latency_ms: f64,
    pub model: String,
}

/// Checks the generated text against the source map: extracts citations,
/// flags likely hallucinations, scores confidence, and collects the
/// user-visible warnings.
pub struct AnswerValidator {
    citation_regex: Regex,
    uncertainty_regexes: Vec<Regex>,
    generic_regexes: Vec<Regex>,
    digits_regex: Regex,
}

impl AnswerValidator {
    pub fn new() -> Self {
        Self {
            citation_regex: Regex::new(CITATION_PATTERN).expect("static citation regex"),
            uncertainty_regexes: UNCERTAINTY_PATTERNS
                .iter()
                .map(|p| Regex::new(p).expect("static uncertainty regex"))
                .collect(),
            generic_regexes: GENERIC_PATTERNS
                .iter()
                .map(|p| Regex::new(p).expect("static generic regex"))
                .collect(),
            digits_regex: Regex::new(r"\d+").expect("static digits regex"),
        }
    }

    pub fn validate(&self, draft: AnswerDraft, source_map: &SourceMap) -> ValidatedAnswer {
        let citations = self.extract_citations(&draft.answer);
        let invalid_citations = validate_citations(&citations, source_map);
        let has_hallucinations =
            self.detect_hallucinations(&draft.answer, &citations, &invalid_citations);
        let confidence = self.calculate_confidence(&draft.answer, &citations, &invalid_citations);

        let mut warnings = Vec::new();
        if citations.is_empty() {
            warnings.push("Answer does not cite any sources. Verify factual accuracy.".to_string());
        }
        if !invalid_citations.is_empty() {
            warnings.push(format!(
                "Answer contains invalid citations: {:?}. These sources were not provided in the context.",
                invalid_citations
            ));
        }
        if confidence < 0.5 {
            warnings.push(format!(
                "Low confidence score ({confidence:.2}). Answer may not be reliable."
            ));
        }
        if has_hallucinations {
            warnings.push(
                "Potential hallucinations detected. Answer may contain unsupported claims."
                    .to_string(),
            );
        }

        debug!(
            citations = citations.len(),
            invalid = invalid_citations.len(),
            has_hallucinations,
            confidence,
            "answer validated"
        );

        ValidatedAnswer {
            answer: draft.answer,
            citations,
            invalid_citations,
            has_hallucinations,
            confidence,
            warnings,
            usage: draft.usage,
            latency_ms: draft.latency_ms,
            model: draft.model,
        }
    }

    /// Unique, sorted citation numbers from every `[Source k]` /
    /// `[Source a, b]` match of the canonical pattern.
    pub fn extract_citations(&self, answer: &str) -> Vec<u32> {
        let mut citations: BTreeSet<u32> = BTreeSet::new();
        for matched in self.citation_regex.find_iter(answer) {
            for digits in self.digits_regex.find_iter(matched.as_str()) {
                if let Ok(number) = digits.as_str().parse::<u32>() {
                    citations.insert(number);
                }
            }
        }
        citations.into_iter().collect()
    }

    fn detect_hallucinations(
        &self,
        answer: &str,
        citations: &[u32],
        invalid_citations: &[u32],
    ) -> bool {
        // Substantive answer with no citations at all.
        let word_count = answer.split_whitespace().count();
        if word_count > 20 && citations.is_empty() {
            warn!(word_count, "substantive answer without citations");
            return true;
        }

        if !invalid_citations.is_empty() {
            warn!(invalid = invalid_citations.len(), "invalid citations present");
            return true;
        }

        // Generic filler statements with too few citations to back them.
        let generic_count: usize = self
            .generic_regexes
            .iter()
            .map(|regex| regex.find_iter(answer).count())
            .sum();
        if generic_count > 2 && citations.len() < 2 {
            warn!(generic_count, citations = citations.len(), "generic statements undercited");
            return true;
        }

        false
    }

    /// Base 0.5, plus valid-citation ratio (0.4), invalid-citation bonus or
    /// penalty (0.3), citation density (0.2), and uncertainty phrasing
    /// (0.1), clamped to [0, 1].
    fn calculate_confidence(
        &self,
        answer: &str,
        citations: &[u32],
        invalid_citations: &[u32],
    ) -> f32 {
        let mut score = 0.5f32;

        if !citations.is_empty() {
            let valid = citations.len() - invalid_citations.len();
            score += 0.4 * valid as f32 / citations.len() as f32;
        }

        if invalid_citations.is_empty() {
            score += 0.3;
        } else if !citations.is_empty() {
            score -= 0.3 * invalid_citations.len() as f32 / citations.len() as f32;
        }

        let word_count = answer.split_whitespace().count();
        if word_count > 0 {
            let per_hundred_words = citations.len() as f32 / word_count as f32 * 100.0;
            score += (per_hundred_words / 25.0 * 0.2).min(0.2);
        }

        let uncertainty_count: usize = self
            .uncertainty_regexes
            .iter()
            .map(|regex| regex.find_iter(answer).count())
            .sum();
        if uncertainty_count == 0 {
            score += 0.1;
        } else {
            score -= (uncertainty_count as f32 * 0.05).min(0.1);
        }

        score.clamp(0.0, 1.0)
    }
}

impl Default for AnswerValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_citations(citations: &[u32], source_map: &SourceMap) -> Vec<u32> {
    citations
        .iter()
        .copied()
        .filter(|number| !source_map.contains_key(number))
        .collect()
}
