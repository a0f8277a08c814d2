use corpora_core::tokenizer::Tokenizer;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetBreakdown {
    pub total_budget: usize,
    pub system_tokens: usize,
    pub query_tokens: usize,
    pub output_tokens: usize,
    pub safety_margin: usize,
    pub context_budget: usize,
    pub budget_exceeded: bool,
}

/// Token budget arithmetic for the context window. Shares its tokenizer with
/// the chunker so chunk token counts line up with budget math.
pub struct TokenBudget {
    tokenizer: Tokenizer,
    model_max_tokens: usize,
    max_output_tokens: usize,
    safety_margin: usize,
}

impl TokenBudget {
    pub fn new(
        tokenizer: Tokenizer,
        model_max_tokens: usize,
        max_output_tokens: usize,
        safety_margin: usize,
    ) -> Self {
        Self {
            tokenizer,
            model_max_tokens,
            max_output_tokens,
            safety_margin,
        }
    }

    pub fn count_tokens(&self, text: &str) -> usize {
        self.tokenizer.count(text)
    }

    /// `context_budget = model_max - system - query - max_output - margin`.
    /// A non-positive result clamps to zero; the caller proceeds with an
    /// empty context and the generator is instructed to refuse.
    pub fn calculate(&self, query: &str, system_prompt: &str) -> BudgetBreakdown {
        let query_tokens = self.tokenizer.count(query);
        let system_tokens = self.tokenizer.count(system_prompt);
        let reserved = query_tokens + system_tokens + self.max_output_tokens + self.safety_margin;
        let context_budget = self.model_max_tokens.saturating_sub(reserved);
        let budget_exceeded = reserved >= self.model_max_tokens;

        if budget_exceeded {
            warn!(
                model_max = self.model_max_tokens,
                reserved, "token budget exhausted before any context"
            );
        } else {
            debug!(context_budget, query_tokens, system_tokens, "token budget calculated");
        }

        BudgetBreakdown {
            total_budget: self.model_max_tokens,
            system_tokens,
            query_tokens,
            output_tokens: self.max_output_tokens,
            safety_margin: self.safety_margin,
            context_budget,
            budget_exceeded,
        }
    }

    /// Greedy by-score selection under the budget; returns indices of the
    /// kept texts sorted back into their original order.
    pub fn truncate_to_budget(&self, texts: &[String], scores: &[f32], budget: usize) -> Vec<usize> {
        if texts.is_empty() {
            return Vec::new();
        }

        let mut order: Vec<usize> = (0..texts.len()).collect();
        order.sort_by(|a, b| {
            scores[*b]
                .partial_cmp(&scores[*a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut selected = Vec::new();
        let mut used = 0usize;
        for idx in order {
            let tokens = self.tokenizer.count(&texts[idx]);
            if used + tokens <= budget {
                selected.push(idx);
                used += tokens;
            }
        }

        selected.sort_unstable();
        debug!(
            kept = selected.len(),
            of = texts.len(),
            used,
            budget,
            "budget truncation complete"
        );
        selected
    }
}
