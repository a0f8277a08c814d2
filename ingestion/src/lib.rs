pub mod chunker;
pub mod embedding;
pub mod hierarchy;
pub mod parse;
pub mod pipeline;
pub mod writers;

pub use chunker::SemanticChunker;
pub use embedding::{EmbeddedChunk, EmbedError, EmbeddingService};
pub use parse::{PlainTextSource, SectionSource, StaticSectionSource};
pub use pipeline::{DocumentProcessor, IngestError, IngestReport};
pub use writers::{DenseWriter, RowWriter};
