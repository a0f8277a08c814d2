use chrono::{DateTime, Utc};
use tracing::warn;

const EPSILON: f32 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeMethod {
    MinMax,
    ZScore,
}

/// Normalizes scores into [0, 1]. A single score maps to 1.0. A degenerate
/// range maps to all 1.0 under min-max and all 0.5 under z-score.
pub fn normalize_scores(scores: &[f32], method: NormalizeMethod) -> Vec<f32> {
    if scores.is_empty() {
        return Vec::new();
    }
    if scores.len() == 1 {
        return vec![1.0];
    }

    match method {
        NormalizeMethod::MinMax => {
            let min = scores.iter().copied().fold(f32::INFINITY, f32::min);
            let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            if max - min < EPSILON {
                return vec![1.0; scores.len()];
            }
            scores.iter().map(|s| (s - min) / (max - min)).collect()
        }
        NormalizeMethod::ZScore => {
            let n = scores.len() as f32;
            let mean = scores.iter().sum::<f32>() / n;
            let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f32>() / n;
            let std = variance.sqrt();
            if std < EPSILON {
                return vec![0.5; scores.len()];
            }
            scores
                .iter()
                .map(|s| {
                    let z = (s - mean) / std;
                    1.0 / (1.0 + (-z).exp())
                })
                .collect()
        }
    }
}

/// Weighted combination of the three normalized score channels. Weights that
/// do not sum to 1 are renormalized.
pub fn combine_scores(
    vector_scores: &[f32],
    lexical_scores: &[f32],
    recency_scores: &[f32],
    mut vector_weight: f32,
    mut lexical_weight: f32,
    mut recency_weight: f32,
) -> Vec<f32> {
    if vector_scores.is_empty() {
        return Vec::new();
    }
    debug_assert_eq!(vector_scores.len(), lexical_scores.len());
    debug_assert_eq!(vector_scores.len(), recency_scores.len());

    let total = vector_weight + lexical_weight + recency_weight;
    if (total - 1.0).abs() > 1e-6 && total > 0.0 {
        warn!(total, "retrieval weights do not sum to 1, renormalizing");
        vector_weight /= total;
        lexical_weight /= total;
        recency_weight /= total;
    }

    vector_scores
        .iter()
        .zip(lexical_scores)
        .zip(recency_scores)
        .map(|((v, l), r)| vector_weight * v + lexical_weight * l + recency_weight * r)
        .collect()
}

/// Exponential age decay: `exp(-age_days / decay_days)`. A document one
/// decay period old scores ~0.37.
pub fn recency_score(created_at: DateTime<Utc>, now: DateTime<Utc>, decay_days: f32) -> f32 {
    let age_days = (now - created_at).num_seconds().max(0) as f32 / 86_400.0;
    (-age_days / decay_days.max(EPSILON)).exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn min_max_maps_to_unit_interval() {
        let normalized = normalize_scores(&[2.0, 4.0, 6.0], NormalizeMethod::MinMax);
        assert_eq!(normalized, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn single_score_normalizes_to_one() {
        assert_eq!(normalize_scores(&[7.3], NormalizeMethod::MinMax), vec![1.0]);
        assert_eq!(normalize_scores(&[7.3], NormalizeMethod::ZScore), vec![1.0]);
    }

    #[test]
    fn degenerate_ranges_follow_method_specific_defaults() {
        assert_eq!(
            normalize_scores(&[3.0, 3.0, 3.0], NormalizeMethod::MinMax),
            vec![1.0, 1.0, 1.0]
        );
        assert_eq!(
            normalize_scores(&[3.0, 3.0, 3.0], NormalizeMethod::ZScore),
            vec![0.5, 0.5, 0.5]
        );
    }

    #[test]
    fn combine_renormalizes_unbalanced_weights() {
        let combined = combine_scores(&[1.0], &[1.0], &[1.0], 2.0, 1.0, 1.0);
        assert!((combined[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn recency_decays_with_age() {
        let now = Utc::now();
        let fresh = recency_score(now, now, 365.0);
        let year_old = recency_score(now - Duration::days(365), now, 365.0);
        assert!(fresh > 0.99);
        assert!((year_old - 0.3679).abs() < 0.01);
    }
}
