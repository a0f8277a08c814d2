use std::cmp::Ordering;
use tracing::debug;

/// Greedy Maximal Marginal Relevance:
/// `MMR(d) = lambda * sim(d, q) - (1 - lambda) * max_{s in selected} sim(d, s)`
/// over cosine similarity on L2-normalized vectors. Selection is seeded with
/// the highest-relevance candidate and returns indices in pick order.
pub fn rerank(
    query_embedding: &[f32],
    candidate_embeddings: &[Vec<f32>],
    candidate_scores: &[f32],
    top_k: usize,
    lambda: f32,
) -> Vec<usize> {
    if candidate_embeddings.is_empty() || top_k == 0 {
        return Vec::new();
    }

    let query = l2_normalize(query_embedding);
    let candidates: Vec<Vec<f32>> = candidate_embeddings
        .iter()
        .map(|embedding| l2_normalize(embedding))
        .collect();

    let query_similarities: Vec<f32> = candidates.iter().map(|c| dot(c, &query)).collect();

    let mut selected: Vec<usize> = Vec::new();
    let mut remaining: Vec<usize> = (0..candidates.len()).collect();

    // Seed: most relevant by the incoming combined score.
    let seed_position = argmax(candidate_scores, &remaining);
    selected.push(remaining.remove(seed_position));

    let wanted = top_k.min(candidates.len());
    while selected.len() < wanted && !remaining.is_empty() {
        let mut best_position = 0;
        let mut best_score = f32::NEG_INFINITY;

        for (position, &idx) in remaining.iter().enumerate() {
            let relevance = query_similarities[idx];
            let max_similarity = selected
                .iter()
                .map(|&s| dot(&candidates[idx], &candidates[s]))
                .fold(f32::NEG_INFINITY, f32::max);
            let mmr = lambda * relevance - (1.0 - lambda) * max_similarity;
            if mmr > best_score {
                best_score = mmr;
                best_position = position;
            }
        }

        selected.push(remaining.remove(best_position));
    }

    debug!(
        selected = selected.len(),
        requested = top_k,
        lambda,
        "mmr selection complete"
    );
    selected
}

/// 1 minus the average pairwise similarity; 1.0 means fully diverse.
/// Test and health hook, no runtime consumer.
pub fn diversity_score(embeddings: &[Vec<f32>]) -> f32 {
    if embeddings.len() < 2 {
        return 1.0;
    }

    let normalized: Vec<Vec<f32>> = embeddings.iter().map(|e| l2_normalize(e)).collect();
    let mut total = 0.0f32;
    let mut pairs = 0usize;
    for i in 0..normalized.len() {
        for j in (i + 1)..normalized.len() {
            total += dot(&normalized[i], &normalized[j]);
            pairs += 1;
        }
    }

    1.0 - total / pairs as f32
}

fn argmax(scores: &[f32], indices: &[usize]) -> usize {
    indices
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| {
            scores[**a]
                .partial_cmp(&scores[**b])
                .unwrap_or(Ordering::Equal)
        })
        .map(|(position, _)| position)
        .unwrap_or(0)
}

fn l2_normalize(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt() + 1e-8;
    vector.iter().map(|x| x / norm).collect()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
