use crate::budget::TokenBudget;
use crate::optimizer::ContextOptimizer;
use crate::sources::{self, SourceMap};
use query::RetrievalResult;
use tracing::{info, warn};

/// Canonical refusal line; the validator and tests key off it staying stable.
pub const INSUFFICIENT_INFORMATION: &str =
    "I don't have enough information in the provided sources to answer this question";

const SYSTEM_INSTRUCTIONS: &str = "\
You are a helpful assistant that answers questions based on provided source documents.

CRITICAL RULES:
1. Answer ONLY using information from the provided sources
2. If the sources don't contain sufficient information to answer the question, explicitly state: \"I don't have enough information in the provided sources to answer this question\"
3. ALWAYS cite your sources using [Source X] notation when referencing information
4. If sources provide conflicting information, mention the conflict and cite both sources
5. When providing numbers, dates, or specific facts, quote them exactly as they appear in the sources
6. Do not make assumptions or add information not present in the sources
7. Be concise but complete in your answers

CITATION FORMAT:
- Reference sources as [Source 1], [Source 2], etc.
- Multiple sources for the same fact: [Source 1, 3]
- When quoting directly, use quotation marks and cite the source";

#[derive(Debug, Clone, PartialEq)]
pub struct PromptComponents {
    pub system_prompt: String,
    pub user_prompt: String,
    pub context: String,
    pub source_count: usize,
    pub context_tokens: usize,
    pub total_tokens: usize,
    pub source_map: SourceMap,
}

/// Assembles the system and user prompts from optimized retrieval results
/// and tracks the source-number map for citation validation.
pub struct PromptBuilder {
    budget: TokenBudget,
    optimizer: ContextOptimizer,
}

impl PromptBuilder {
    pub fn new(budget: TokenBudget, optimizer: ContextOptimizer) -> Self {
        Self { budget, optimizer }
    }

    pub fn budget(&self) -> &TokenBudget {
        &self.budget
    }

    pub fn build(&self, query: &str, results: Vec<RetrievalResult>) -> PromptComponents {
        let system_prompt = SYSTEM_INSTRUCTIONS.to_string();
        let breakdown = self.budget.calculate(query, &system_prompt);

        if breakdown.budget_exceeded {
            warn!(
                query_tokens = breakdown.query_tokens,
                "no context budget available, building refusal prompt"
            );
        }

        if results.is_empty() || breakdown.context_budget == 0 {
            let user_prompt = build_no_context_prompt(query);
            let total_tokens = breakdown.system_tokens + self.budget.count_tokens(&user_prompt);
            return PromptComponents {
                system_prompt,
                user_prompt,
                context: String::new(),
                source_count: 0,
                context_tokens: 0,
                total_tokens,
                source_map: SourceMap::new(),
            };
        }

        let optimized = self
            .optimizer
            .optimize(results, &self.budget, breakdown.context_budget);
        let context = sources::format_sources(&optimized);
        let source_map = sources::build_source_map(&optimized);
        let user_prompt = build_user_prompt(query, &context);

        let context_tokens = self.budget.count_tokens(&context);
        let total_tokens = breakdown.system_tokens + self.budget.count_tokens(&user_prompt);

        info!(
            source_count = optimized.len(),
            context_tokens,
            total_tokens,
            "prompt assembled"
        );

        PromptComponents {
            system_prompt,
            user_prompt,
            context,
            source_count: optimized.len(),
            context_tokens,
            total_tokens,
            source_map,
        }
    }
}

fn build_user_prompt(query: &str, context: &str) -> String {
    format!(
        "Based on the following sources, please answer the question.\n\n\
         SOURCES:\n{context}\n\nQUESTION:\n{query}\n\nANSWER:"
    )
}

fn build_no_context_prompt(query: &str) -> String {
    format!(
        "There are no relevant sources available for this question.\n\n\
         QUESTION:\n{query}\n\n\
         Respond that you don't have information to answer this question."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use corpora_core::tokenizer::Tokenizer;
    use uuid::Uuid;

    fn builder(model_max: usize) -> PromptBuilder {
        PromptBuilder::new(
            TokenBudget::new(Tokenizer::new(), model_max, 2_048, 100),
            ContextOptimizer::default(),
        )
    }

    fn result(score: f32, content: &str) -> RetrievalResult {
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
            filename: Some("doc.txt".to_string()),
            embedding: None,
        }
    }

    #[test]
    fn prompt_contains_numbered_sources_and_the_question() {
        let components = builder(32_768).build(
            "what is the refund window?",
            vec![result(0.9, "Refunds are accepted for 30 days.")],
        );

        assert_eq!(components.source_count, 1);
        assert!(components.user_prompt.contains("[Source 1]"));
        assert!(components.user_prompt.contains("QUESTION:\nwhat is the refund window?"));
        assert!(components.user_prompt.ends_with("ANSWER:"));
        assert_eq!(components.source_map.len(), 1);
    }

    #[test]
    fn empty_retrieval_produces_the_refusal_prompt() {
        let components = builder(32_768).build("anything", Vec::new());
        assert_eq!(components.source_count, 0);
        assert!(components.context.is_empty());
        assert!(components
            .user_prompt
            .contains("no relevant sources available"));
    }

    #[test]
    fn exhausted_budget_forces_an_empty_context() {
        let components = builder(1_024).build("query", vec![result(0.9, "some context")]);
        assert_eq!(components.source_count, 0);
        assert!(components.source_map.is_empty());
    }

    #[test]
    fn system_rules_pin_citation_format_and_refusal_string() {
        let components = builder(32_768).build("q", vec![result(0.9, "ctx")]);
        assert!(components.system_prompt.contains("[Source X]"));
        assert!(components.system_prompt.contains(INSUFFICIENT_INFORMATION));
    }
}
