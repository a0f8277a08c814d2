use async_trait::async_trait;
use corpora_core::model::{Document, ParsedSection};
use dashmap::DashMap;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no parsed content registered for document {0}")]
    MissingContent(Uuid),
    #[error("unsupported document type: {0}")]
    UnsupportedType(String),
}

/// Pluggable producer of the parsed section stream. Real parsers for
/// PDF/DOCX/PPTX live outside this crate; ingestion only consumes the
/// ordered sections they emit.
#[async_trait]
pub trait SectionSource: Send + Sync {
    async fn sections(&self, document: &Document) -> Result<Vec<ParsedSection>, ParseError>;
}

/// Splits plain text into sections on blank lines. A short leading line
/// without terminal punctuation is treated as the section title.
pub fn parse_plain_text(text: &str) -> Vec<ParsedSection> {
    let mut sections = Vec::new();

    for block in text.split("\n\n") {
        let block = block.trim();
        if block.is_empty() {
            continue;
        }

        let mut lines = block.lines();
        let first = lines.next().unwrap_or_default().trim();
        let rest: Vec<&str> = lines.map(|line| line.trim()).collect();

        let looks_like_title = !rest.is_empty()
            && first.len() <= 80
            && !first.ends_with(['.', '!', '?', ':', ';', ',']);

        if looks_like_title {
            sections.push(ParsedSection {
                section_title: Some(first.to_string()),
                content: rest.join("\n"),
                page_number: None,
                metadata: Default::default(),
            });
        } else {
            sections.push(ParsedSection::new(block.to_string()));
        }
    }

    sections
}

/// Section source over raw text registered per document. Serves the `Txt`
/// path directly and doubles as the seam where external parsers hand their
/// output to the pipeline.
#[derive(Default)]
pub struct PlainTextSource {
    texts: DashMap<Uuid, String>,
}

impl PlainTextSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, document_id: Uuid, text: impl Into<String>) {
        self.texts.insert(document_id, text.into());
    }
}

#[async_trait]
impl SectionSource for PlainTextSource {
    async fn sections(&self, document: &Document) -> Result<Vec<ParsedSection>, ParseError> {
        let text = self
            .texts
            .get(&document.id)
            .ok_or(ParseError::MissingContent(document.id))?;
        Ok(parse_plain_text(&text))
    }
}

/// Section source over pre-parsed sections, for tests and for feeding the
/// pipeline from an external parser.
#[derive(Default)]
pub struct StaticSectionSource {
    sections: DashMap<Uuid, Vec<ParsedSection>>,
}

impl StaticSectionSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, document_id: Uuid, sections: Vec<ParsedSection>) {
        self.sections.insert(document_id, sections);
    }
}

#[async_trait]
impl SectionSource for StaticSectionSource {
    async fn sections(&self, document: &Document) -> Result<Vec<ParsedSection>, ParseError> {
        self.sections
            .get(&document.id)
            .map(|sections| sections.clone())
            .ok_or(ParseError::MissingContent(document.id))
    }
}
