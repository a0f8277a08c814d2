use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Query class, decided from surface patterns. The class selects the
/// retrieval parameter set for the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryClass {
    Factual,
    Comparative,
    Temporal,
    Conversational,
    MultiHop,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalParams {
    pub top_k: usize,
    pub vector_weight: f32,
    pub lexical_weight: f32,
    pub recency_weight: f32,
    pub mmr_lambda: f32,
}

const FACTUAL_PATTERNS: [&str; 3] = [
    r"(?i)\b(what|who|when|where|which|how many|how much)\b",
    r"(?i)\b(define|definition|explain|describe)\b",
    r"(?i)\b(is|are|was|were|does|did)\b.*\?",
];

const COMPARATIVE_PATTERNS: [&str; 3] = [
    r"(?i)\b(vs|versus|compare|comparison|difference|similar|different)\b",
    r"(?i)\b(better|worse|more|less|greater|smaller)\s+than\b",
    r"(?i)\b(advantage|disadvantage|pros|cons)\b",
];

const TEMPORAL_PATTERNS: [&str; 4] = [
    r"(?i)\b(before|after|during|since|until|between)\b",
    r"(?i)\b(recent|latest|current|past|future|history)\b",
    r"(?i)\b(today|yesterday|tomorrow|last|next)\b",
    r"(?i)\b(timeline|chronology|sequence|evolution)\b",
];

const CONVERSATIONAL_PATTERNS: [&str; 3] = [
    r"(?i)\b(also|too|as well|additionally|furthermore)\b",
    r"(?i)\b(this|that|these|those|it|they)\b",
    r"(?i)\b(tell me more|can you|what about)\b",
];

const MULTI_HOP_PATTERNS: [&str; 5] = [
    r"(?i)\band\b.*\band\b",
    r"(?i)\bor\b.*\bor\b",
    r"(?i)\b(both|all|each|every)\b",
    r"(?i)\b(first.*then|step.*step)\b",
    r"(?i)\b(because|therefore|thus|hence)\b",
];

pub struct QueryClassifier {
    factual: Vec<Regex>,
    comparative: Vec<Regex>,
    temporal: Vec<Regex>,
    conversational: Vec<Regex>,
    multi_hop: Vec<Regex>,
}

impl QueryClassifier {
    pub fn new() -> Self {
        Self {
            factual: compile(&FACTUAL_PATTERNS),
            comparative: compile(&COMPARATIVE_PATTERNS),
            temporal: compile(&TEMPORAL_PATTERNS),
            conversational: compile(&CONVERSATIONAL_PATTERNS),
            multi_hop: compile(&MULTI_HOP_PATTERNS),
        }
    }

    pub fn classify(&self, query: &str) -> QueryClass {
        let query = query.trim();
        if query.is_empty() {
            return QueryClass::Conversational;
        }

        let scores = [
            (QueryClass::Factual, score_patterns(query, &self.factual)),
            (
                QueryClass::Comparative,
                score_patterns(query, &self.comparative),
            ),
            (QueryClass::Temporal, score_patterns(query, &self.temporal)),
            (
                QueryClass::Conversational,
                score_patterns(query, &self.conversational),
            ),
        ];
        let multi_hop_score = score_patterns(query, &self.multi_hop);

        // Multi-hop takes priority once enough of its markers line up.
        let class = if multi_hop_score >= 2 {
            QueryClass::MultiHop
        } else {
            let (best_class, best_score) = scores
                .iter()
                .copied()
                .max_by_key(|(_, score)| *score)
                .unwrap_or((QueryClass::Factual, 0));
            if best_score == 0 {
                QueryClass::Factual
            } else {
                best_class
            }
        };

        debug!(query_class = ?class, multi_hop_score, "query classified");
        class
    }

    /// Retrieval parameters per class: higher diversity for comparative and
    /// multi-hop queries, higher recency weight for temporal ones.
    pub fn params(&self, class: QueryClass) -> RetrievalParams {
        match class {
            QueryClass::Factual => RetrievalParams {
                top_k: 5,
                vector_weight: 0.7,
                lexical_weight: 0.2,
                recency_weight: 0.1,
                mmr_lambda: 0.5,
            },
            QueryClass::Comparative => RetrievalParams {
                top_k: 8,
                vector_weight: 0.6,
                lexical_weight: 0.3,
                recency_weight: 0.1,
                mmr_lambda: 0.7,
            },
            QueryClass::Temporal => RetrievalParams {
                top_k: 5,
                vector_weight: 0.5,
                lexical_weight: 0.2,
                recency_weight: 0.3,
                mmr_lambda: 0.6,
            },
            QueryClass::Conversational => RetrievalParams {
                top_k: 5,
                vector_weight: 0.8,
                lexical_weight: 0.1,
                recency_weight: 0.1,
                mmr_lambda: 0.5,
            },
            QueryClass::MultiHop => RetrievalParams {
                top_k: 10,
                vector_weight: 0.6,
                lexical_weight: 0.3,
                recency_weight: 0.1,
                mmr_lambda: 0.8,
            },
        }
    }
}

impl Default for QueryClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|pattern| Regex::new(pattern).expect("static classifier regex"))
        .collect()
}

fn score_patterns(query: &str, patterns: &[Regex]) -> usize {
    patterns
        .iter()
        .filter(|pattern| pattern.is_match(query))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrogatives_classify_as_factual() {
        let classifier = QueryClassifier::new();
        assert_eq!(
            classifier.classify("What is the refund policy?"),
            QueryClass::Factual
        );
    }

    #[test]
    fn comparison_markers_classify_as_comparative() {
        let classifier = QueryClassifier::new();
        assert_eq!(
            classifier.classify("Compare plan A versus plan B, pros and cons"),
            QueryClass::Comparative
        );
    }

    #[test]
    fn temporal_markers_classify_as_temporal() {
        let classifier = QueryClassifier::new();
        assert_eq!(
            classifier.classify("Show the timeline of releases since the latest audit"),
            QueryClass::Temporal
        );
    }

    #[test]
    fn stacked_conjunctions_win_as_multi_hop() {
        let classifier = QueryClassifier::new();
        assert_eq!(
            classifier.classify(
                "List every dependency and its license and therefore the compliance impact"
            ),
            QueryClass::MultiHop
        );
    }

    #[test]
    fn unmatched_queries_default_to_factual() {
        let classifier = QueryClassifier::new();
        assert_eq!(classifier.classify("zebra xylophone"), QueryClass::Factual);
    }

    #[test]
    fn empty_queries_are_conversational() {
        let classifier = QueryClassifier::new();
        assert_eq!(classifier.classify("   "), QueryClass::Conversational);
    }

    #[test]
    fn params_follow_the_class_table() {
        let classifier = QueryClassifier::new();
        let factual = classifier.params(QueryClass::Factual);
        assert_eq!(factual.top_k, 5);
        assert!((factual.vector_weight - 0.7).abs() < f32::EPSILON);

        let multi_hop = classifier.params(QueryClass::MultiHop);
        assert_eq!(multi_hop.top_k, 10);
        assert!((multi_hop.mmr_lambda - 0.8).abs() < f32::EPSILON);
    }
}
