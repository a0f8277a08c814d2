use corpora_core::config::ModelPrice;
use tracing::warn;

/// Cost estimation from the configured pricing table. Model names match by
/// substring; unknown models fall back to the first entry.
pub struct CostTracker {
    pricing: Vec<ModelPrice>,
}

impl CostTracker {
    pub fn new(pricing: Vec<ModelPrice>) -> Self {
        Self { pricing }
    }

    pub fn calculate_cost(
        &self,
        model_name: &str,
        prompt_tokens: u32,
        completion_tokens: u32,
    ) -> f64 {
        let Some(price) = self.price_for(model_name) else {
            return 0.0;
        };
        let input_cost = prompt_tokens as f64 / 1_000_000.0 * price.input_per_million;
        let output_cost = completion_tokens as f64 / 1_000_000.0 * price.output_per_million;
        input_cost + output_cost
    }

    pub fn calculate_embedding_cost(&self, model_name: &str, token_count: u64) -> f64 {
        let Some(price) = self.price_for(model_name) else {
            return 0.0;
        };
        token_count as f64 / 1_000_000.0 * price.input_per_million
    }

    fn price_for(&self, model_name: &str) -> Option<&ModelPrice> {
        let lower = model_name.to_lowercase();
        let matched = self
            .pricing
            .iter()
            .find(|price| lower.contains(&price.model_contains.to_lowercase()));
        if matched.is_none() {
            warn!(model = model_name, "unknown model, using default pricing");
        }
        matched.or_else(|| self.pricing.first())
    }
}
