use query::RetrievalResult;
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Metadata kept per numbered source for citation validation and the
/// response's source listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceMeta {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub chunk_index: usize,
    pub section_title: Option<String>,
    pub page_number: Option<u32>,
    pub score: f32,
}

/// Source numbers are 1-based and dense; the map is what the validator
/// checks citations against.
pub type SourceMap = BTreeMap<u32, SourceMeta>;

pub fn build_source_map(results: &[RetrievalResult]) -> SourceMap {
    results
        .iter()
        .enumerate()
        .map(|(i, result)| {
            (
                (i + 1) as u32,
                SourceMeta {
                    chunk_id: result.chunk_id,
                    document_id: result.document_id,
                    chunk_index: result.chunk_index,
                    section_title: result.section_title.clone(),
                    page_number: result.page_number,
                    score: result.score,
                },
            )
        })
        .collect()
}

/// Renders the numbered source blocks fed to the generator:
///
/// ```text
/// [Source 1]
/// Document: notes.txt
/// Section: Overview
/// Page: 3
/// Content:
/// ...
/// ```
pub fn format_sources(results: &[RetrievalResult]) -> String {
    let blocks: Vec<String> = results
        .iter()
        .enumerate()
        .map(|(i, result)| format_source(i as u32 + 1, result))
        .collect();
    blocks.join("\n\n---\n\n")
}

fn format_source(source_number: u32, result: &RetrievalResult) -> String {
    let mut lines = vec![format!("[Source {source_number}]")];

    let document_label = result
        .filename
        .clone()
        .unwrap_or_else(|| format!("Document {}", &result.document_id.to_string()[..8]));
    lines.push(format!("Document: {document_label}"));

    if let Some(section) = &result.section_title {
        lines.push(format!("Section: {section}"));
    }
    if let Some(page) = result.page_number {
        lines.push(format!("Page: {page}"));
    }

    lines.push("Content:".to_string());
    lines.push(result.content.trim().to_string());
    lines.join("\n")
}
