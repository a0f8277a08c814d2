use chrono::Utc;
use corpora_core::config::ChunkingConfig;
use corpora_core::model::{content_hash, Chunk, Document, ParsedSection};
use corpora_core::tokenizer::Tokenizer;
use regex::Regex;
use tracing::debug;
use uuid::Uuid;

/// Section carried into chunking after the merge pass. `source_index` keeps
/// pointing at the original section so parent ids stay resolvable.
struct MergedSection {
    title: Option<String>,
    content: String,
    page_number: Option<u32>,
    source_index: usize,
}

/// Semantic chunker: merges small consecutive sections, splits large ones at
/// sentence boundaries with token overlap, and assigns contiguous chunk
/// indices per document. Token counts come from the same tokenizer the
/// budget manager uses.
pub struct SemanticChunker {
    tokenizer: Tokenizer,
    config: ChunkingConfig,
    sentence_boundary: Regex,
}

impl SemanticChunker {
    pub fn new(tokenizer: Tokenizer, config: ChunkingConfig) -> Self {
        let mut config = config;
        if config.overlap >= config.max_tokens {
            // Overlap must stay below the chunk budget or splitting stalls.
            config.overlap = config.max_tokens / 2;
        }
        Self {
            tokenizer,
            config,
            sentence_boundary: Regex::new(r"[.!?]\s+").expect("static sentence regex"),
        }
    }

    pub fn chunk_document(&self, document: &Document, sections: &[ParsedSection]) -> Vec<Chunk> {
        let merged = self.merge_small_sections(sections);
        let mut chunks: Vec<Chunk> = Vec::new();

        for section in &merged {
            let start_index = chunks.len();
            self.chunk_section(document, section, start_index, &mut chunks);
        }

        debug!(
            document_id = %document.id,
            sections = sections.len(),
            merged_sections = merged.len(),
            chunks = chunks.len(),
            "semantic chunking complete"
        );

        chunks
    }

    fn merge_small_sections(&self, sections: &[ParsedSection]) -> Vec<MergedSection> {
        let mut merged = Vec::new();
        let mut pending: Vec<(usize, &ParsedSection)> = Vec::new();

        for (idx, section) in sections.iter().enumerate() {
            let text = section.content.trim();
            if text.is_empty() {
                continue;
            }

            if self.tokenizer.count(text) >= self.config.min_chunk_tokens {
                if !pending.is_empty() {
                    merged.push(flush_pending(&mut pending));
                }
                merged.push(MergedSection {
                    title: section.section_title.clone(),
                    content: text.to_string(),
                    page_number: section.page_number,
                    source_index: idx,
                });
            } else {
                pending.push((idx, section));
            }
        }

        if !pending.is_empty() {
            merged.push(flush_pending(&mut pending));
        }

        merged
    }

    fn chunk_section(
        &self,
        document: &Document,
        section: &MergedSection,
        start_index: usize,
        out: &mut Vec<Chunk>,
    ) {
        if self.tokenizer.count(&section.content) <= self.config.max_tokens {
            out.push(self.create_chunk(document, section, &section.content, start_index));
            return;
        }

        let pieces = self.split_by_token_limit(&section.content);
        for (offset, piece) in pieces.iter().enumerate() {
            out.push(self.create_chunk(document, section, piece, start_index + offset));
        }
    }

    /// Splits text into chunks of at most `max_tokens`, preferring sentence
    /// boundaries and falling back to token windows for oversized sentences.
    /// Consecutive chunks overlap by up to `overlap` tokens.
    fn split_by_token_limit(&self, text: &str) -> Vec<String> {
        let max_tokens = self.config.max_tokens;
        let sentences = self.split_sentences(text);

        let mut chunks: Vec<String> = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut current_tokens = 0usize;

        for sentence in sentences {
            let sentence_tokens = self.tokenizer.count(&sentence);

            if sentence_tokens > max_tokens {
                if !current.is_empty() {
                    chunks.push(current.join(" "));
                    current.clear();
                    current_tokens = 0;
                }
                chunks.extend(self.force_split(&sentence));
                continue;
            }

            if current_tokens + sentence_tokens > max_tokens {
                if !current.is_empty() {
                    chunks.push(current.join(" "));
                }
                let mut next = self.overlap_tail(&current);
                next.push(sentence);
                current_tokens = self.tokenizer.count(&next.join(" "));
                current = next;
            } else {
                current.push(sentence);
                current_tokens += sentence_tokens;
            }
        }

        if !current.is_empty() {
            chunks.push(current.join(" "));
        }

        chunks
            .into_iter()
            .map(|chunk| chunk.trim().to_string())
            .filter(|chunk| !chunk.is_empty())
            .collect()
    }

    fn split_sentences(&self, text: &str) -> Vec<String> {
        let mut sentences: Vec<String> = self
            .sentence_boundary
            .split(text)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        // No punctuation: fall back to line boundaries.
        if sentences.len() <= 1 {
            sentences = text
                .split('\n')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if sentences.is_empty() {
            sentences.push(text.to_string());
        }

        sentences
    }

    /// Token-window split for a single sentence larger than the budget.
    /// Windows advance by `max_tokens - overlap` so neighbors share context.
    fn force_split(&self, sentence: &str) -> Vec<String> {
        let tokens = self.tokenizer.encode(sentence);
        let stride = self.config.max_tokens - self.config.overlap;

        let mut out = Vec::new();
        let mut start = 0usize;
        while start < tokens.len() {
            let end = (start + self.config.max_tokens).min(tokens.len());
            let piece = self.decode_window(&tokens[start..end]);
            if !piece.trim().is_empty() {
                out.push(piece.trim().to_string());
            }
            if end == tokens.len() {
                break;
            }
            start += stride;
        }

        out
    }

    fn decode_window(&self, window: &[u32]) -> String {
        // A window boundary can land inside a multi-byte codepoint; shrink
        // until the tail decodes. The overlap covers anything dropped.
        let mut end = window.len();
        while end > 0 {
            if let Some(text) = self.tokenizer.decode(&window[..end]) {
                return text;
            }
            end -= 1;
        }
        String::new()
    }

    /// Sentences from the end of the previous chunk that fit in the overlap
    /// budget, oldest first.
    fn overlap_tail(&self, sentences: &[String]) -> Vec<String> {
        if sentences.is_empty() || self.config.overlap == 0 {
            return Vec::new();
        }

        let mut tail = Vec::new();
        let mut used = 0usize;
        for sentence in sentences.iter().rev() {
            let tokens = self.tokenizer.count(sentence);
            if used + tokens > self.config.overlap {
                break;
            }
            tail.insert(0, sentence.clone());
            used += tokens;
        }
        tail
    }

    fn create_chunk(
        &self,
        document: &Document,
        section: &MergedSection,
        content: &str,
        chunk_index: usize,
    ) -> Chunk {
        Chunk {
            id: Uuid::new_v4(),
            document_id: document.id,
            tenant_id: document.tenant_id.clone(),
            chunk_index,
            content: content.to_string(),
            content_hash: content_hash(content),
            token_count: self.tokenizer.count(content),
            section_title: section.title.clone(),
            page_number: section.page_number,
            parent_section_id: format!("section_{}", section.source_index),
            created_at: Utc::now(),
        }
    }
}

fn flush_pending(pending: &mut Vec<(usize, &ParsedSection)>) -> MergedSection {
    let source_index = pending[0].0;
    let page_number = pending
        .iter()
        .find_map(|(_, section)| section.page_number);
    let content = pending
        .iter()
        .map(|(_, section)| section.content.trim())
        .collect::<Vec<_>>()
        .join("\n\n");
    pending.clear();

    MergedSection {
        // Merged sections lose their individual titles.
        title: None,
        content,
        page_number,
        source_index,
    }
}
