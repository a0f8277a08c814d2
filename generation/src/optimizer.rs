use crate::budget::TokenBudget;
use query::RetrievalResult;
use tracing::{debug, info};

/// Prepares retrieved chunks for the context window: near-duplicate removal,
/// budget trim, and lost-in-the-middle reordering.
pub struct ContextOptimizer {
    similarity_threshold: f32,
}

impl ContextOptimizer {
    pub fn new(similarity_threshold: f32) -> Self {
        Self {
            similarity_threshold,
        }
    }

    pub fn optimize(
        &self,
        results: Vec<RetrievalResult>,
        budget: &TokenBudget,
        context_budget: usize,
    ) -> Vec<RetrievalResult> {
        if results.is_empty() {
            return results;
        }
        let original = results.len();

        let deduplicated = self.remove_near_duplicates(results);
        let trimmed = self.trim_to_budget(deduplicated, budget, context_budget);
        let reordered = reorder_lost_in_middle(trimmed);

        info!(
            original,
            optimized = reordered.len(),
            context_budget,
            "context optimization complete"
        );
        reordered
    }

    /// Drops the lower-scoring member of any pair with cosine similarity
    /// above the threshold. Candidates without embeddings are kept as-is.
    fn remove_near_duplicates(&self, results: Vec<RetrievalResult>) -> Vec<RetrievalResult> {
        if results.len() <= 1 {
            return results;
        }

        let mut keep = vec![true; results.len()];
        for i in 0..results.len() {
            if !keep[i] {
                continue;
            }
            let Some(embedding_i) = &results[i].embedding else {
                continue;
            };
            for j in (i + 1)..results.len() {
                if !keep[j] {
                    continue;
                }
                let Some(embedding_j) = &results[j].embedding else {
                    continue;
                };
                let similarity = cosine(embedding_i, embedding_j);
                if similarity > self.similarity_threshold {
                    let doomed = if results[j].score < results[i].score { j } else { i };
                    keep[doomed] = false;
                    debug!(
                        similarity,
                        dropped_chunk = %results[doomed].chunk_id,
                        "near-duplicate removed"
                    );
                    if doomed == i {
                        break;
                    }
                }
            }
        }

        results
            .into_iter()
            .zip(keep)
            .filter_map(|(result, kept)| kept.then_some(result))
            .collect()
    }

    fn trim_to_budget(
        &self,
        results: Vec<RetrievalResult>,
        budget: &TokenBudget,
        context_budget: usize,
    ) -> Vec<RetrievalResult> {
        let texts: Vec<String> = results.iter().map(|r| r.content.clone()).collect();
        let scores: Vec<f32> = results.iter().map(|r| r.score).collect();
        let selected = budget.truncate_to_budget(&texts, &scores, context_budget);

        let mut slots: Vec<Option<RetrievalResult>> = results.into_iter().map(Some).collect();
        selected
            .into_iter()
            .filter_map(|idx| slots[idx].take())
            .collect()
    }
}

impl Default for ContextOptimizer {
    fn default() -> Self {
        Self::new(0.95)
    }
}

/// Long-context models attend to the head and tail of the window, so the
/// best chunks go there: ranks 1,3,5,... fill from the left and ranks
/// 2,4,6,... from the right. Scores [.9,.8,.7,.6,.5] come out as
/// [.9,.7,.5,.6,.8].
fn reorder_lost_in_middle(results: Vec<RetrievalResult>) -> Vec<RetrievalResult> {
    let n = results.len();
    if n <= 2 {
        return results;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|a, b| {
        results[*b]
            .score
            .partial_cmp(&results[*a].score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut source: Vec<Option<RetrievalResult>> = results.into_iter().map(Some).collect();
    let mut slots: Vec<Option<RetrievalResult>> = (0..n).map(|_| None).collect();
    let mut left = 0usize;
    let mut right = n - 1;
    let mut take_left = true;

    for idx in order {
        if let Some(item) = source[idx].take() {
            if take_left {
                slots[left] = Some(item);
                left += 1;
            } else {
                slots[right] = Some(item);
                right = right.saturating_sub(1);
            }
            take_left = !take_left;
        }
    }

    slots.into_iter().flatten().collect()
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    dot / (norm_a * norm_b + 1e-8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use corpora_core::tokenizer::Tokenizer;
    use uuid::Uuid;

    fn result(score: f32, content: &str, embedding: Option<Vec<f32>>) -> RetrievalResult {
        RetrievalResult {
            chunk_id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            content: content.to_string(),
            score,
            vector_score: score,
            lexical_score: 0.0,
            recency_score: 0.0,
            chunk_index: 0,
            section_title: None,
            page_number: None,
            filename: None,
            embedding,
        }
    }

    fn token_budget() -> TokenBudget {
        TokenBudget::new(Tokenizer::new(), 32_768, 2_048, 100)
    }

    #[test]
    fn near_duplicates_keep_only_the_higher_score() {
        let optimizer = ContextOptimizer::default();
        // Cosine of these two is ~0.98.
        let winner = result(0.9, "kept", Some(vec![1.0, 0.1, 0.0]));
        let loser = result(0.8, "dropped", Some(vec![1.0, 0.3, 0.0]));
        let unrelated = result(0.5, "other", Some(vec![0.0, 0.0, 1.0]));

        let out = optimizer.optimize(
            vec![winner.clone(), loser, unrelated],
            &token_budget(),
            10_000,
        );

        let contents: Vec<&str> = out.iter().map(|r| r.content.as_str()).collect();
        assert!(contents.contains(&"kept"));
        assert!(!contents.contains(&"dropped"));
        assert!(contents.contains(&"other"));
    }

    #[test]
    fn lost_in_the_middle_reorder_matches_the_documented_pattern() {
        let results: Vec<RetrievalResult> = [0.9f32, 0.8, 0.7, 0.6, 0.5]
            .iter()
            .map(|score| result(*score, &format!("s{score}"), None))
            .collect();

        let out = reorder_lost_in_middle(results);
        let scores: Vec<f32> = out.iter().map(|r| r.score).collect();
        assert_eq!(scores, vec![0.9, 0.7, 0.5, 0.6, 0.8]);
    }

    #[test]
    fn one_or_two_results_keep_their_order() {
        let results = vec![result(0.4, "a", None), result(0.9, "b", None)];
        let out = reorder_lost_in_middle(results);
        assert_eq!(out[0].content, "a");
        assert_eq!(out[1].content, "b");
    }

    #[test]
    fn budget_trim_drops_the_lowest_scores_first() {
        let optimizer = ContextOptimizer::default();
        let budget = token_budget();
        let a = result(0.9, "alpha alpha alpha alpha", None);
        let b = result(0.1, "beta beta beta beta", None);
        let tokens_a = budget.count_tokens(&a.content);

        let out = optimizer.optimize(vec![a, b], &budget, tokens_a);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].content, "alpha alpha alpha alpha");
    }
}
