use std::sync::Arc;
use tiktoken_rs::{cl100k_base, CoreBPE};

/// Shared BPE tokenizer (`cl100k_base`). The chunker and the token budget
/// manager must agree on token counts, so both hold the same instance.
#[derive(Clone)]
pub struct Tokenizer {
    bpe: Arc<CoreBPE>,
}

impl Tokenizer {
    pub fn new() -> Self {
        let bpe = cl100k_base().expect("cl100k_base vocabulary is bundled with the binary");
        Self { bpe: Arc::new(bpe) }
    }

    pub fn count(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        self.bpe.encode_ordinary(text).len()
    }

    pub fn encode(&self, text: &str) -> Vec<u32> {
        self.bpe.encode_ordinary(text)
    }

    /// Decoding an arbitrary token window can land inside a multi-byte
    /// codepoint; callers that slice windows handle the `None`.
    pub fn decode(&self, tokens: &[u32]) -> Option<String> {
        self.bpe.decode(tokens.to_vec()).ok()
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer").field("encoding", &"cl100k_base").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trips_plain_text() {
        let tokenizer = Tokenizer::new();
        let text = "The quick brown fox jumps over the lazy dog.";
        let tokens = tokenizer.encode(text);
        assert_eq!(tokenizer.decode(&tokens).as_deref(), Some(text));
    }

    #[test]
    fn count_is_subadditive_over_concatenation() {
        let tokenizer = Tokenizer::new();
        let a = "retrieval augmented generation";
        let b = " with grounded citations";
        let joined = format!("{}{}", a, b);
        assert!(tokenizer.count(&joined) <= tokenizer.count(a) + tokenizer.count(b) + 1);
    }

    #[test]
    fn empty_text_counts_zero() {
        let tokenizer = Tokenizer::new();
        assert_eq!(tokenizer.count(""), 0);
    }
}
