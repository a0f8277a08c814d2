use corpora_core::model::Chunk;
use std::collections::HashMap;
use tracing::warn;

/// Offline validation of the chunk hierarchy: every chunk must reference a
/// real source section and chunk indices must form a contiguous prefix of
/// the naturals. The parent layer is reconstructed by value from
/// `parent_section_id`, never held as a pointer.
pub fn validate(chunks: &[Chunk], section_count: usize) -> bool {
    for chunk in chunks {
        match parse_section_index(&chunk.parent_section_id) {
            Some(idx) if idx < section_count => {}
            _ => {
                warn!(
                    chunk_id = %chunk.id,
                    parent = %chunk.parent_section_id,
                    section_count,
                    "chunk references a nonexistent section"
                );
                return false;
            }
        }
    }

    let mut indices: Vec<usize> = chunks.iter().map(|chunk| chunk.chunk_index).collect();
    indices.sort_unstable();
    for (expected, actual) in indices.iter().enumerate() {
        if expected != *actual {
            warn!(expected, actual, "chunk indices are not contiguous");
            return false;
        }
    }

    true
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct HierarchyStats {
    pub total_chunks: usize,
    pub sections_with_chunks: usize,
    pub max_chunks_per_section: usize,
    pub avg_chunks_per_section: f32,
}

/// Statistics over the reconstructed parent layer. Consumed by tests and
/// health endpoints only.
pub fn stats(chunks: &[Chunk]) -> HierarchyStats {
    let mut by_section: HashMap<&str, usize> = HashMap::new();
    for chunk in chunks {
        *by_section.entry(chunk.parent_section_id.as_str()).or_insert(0) += 1;
    }

    let sections_with_chunks = by_section.len();
    let max_chunks_per_section = by_section.values().copied().max().unwrap_or(0);
    let avg_chunks_per_section = if sections_with_chunks > 0 {
        chunks.len() as f32 / sections_with_chunks as f32
    } else {
        0.0
    };

    HierarchyStats {
        total_chunks: chunks.len(),
        sections_with_chunks,
        max_chunks_per_section,
        avg_chunks_per_section,
    }
}

fn parse_section_index(parent_section_id: &str) -> Option<usize> {
    parent_section_id.strip_prefix("section_")?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use corpora_core::model::content_hash;
    use uuid::Uuid;

    fn chunk(index: usize, parent: &str) -> Chunk {
        Chunk {
            id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            tenant_id: "t".to_string(),
            chunk_index: index,
            content: "c".to_string(),
            content_hash: content_hash("c"),
            token_count: 1,
            section_title: None,
            page_number: None,
            parent_section_id: parent.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn valid_hierarchy_passes() {
        let chunks = vec![chunk(0, "section_0"), chunk(1, "section_0"), chunk(2, "section_1")];
        assert!(validate(&chunks, 2));
    }

    #[test]
    fn out_of_range_parent_fails() {
        let chunks = vec![chunk(0, "section_5")];
        assert!(!validate(&chunks, 2));
    }

    #[test]
    fn gapped_indices_fail() {
        let chunks = vec![chunk(0, "section_0"), chunk(2, "section_0")];
        assert!(!validate(&chunks, 1));
    }

    #[test]
    fn stats_group_by_parent_section() {
        let chunks = vec![chunk(0, "section_0"), chunk(1, "section_0"), chunk(2, "section_1")];
        let s = stats(&chunks);
        assert_eq!(s.total_chunks, 3);
        assert_eq!(s.sections_with_chunks, 2);
        assert_eq!(s.max_chunks_per_section, 2);
    }
}
