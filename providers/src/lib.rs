pub mod embedder;
pub mod error;
pub mod generator;
pub mod retry;

pub use embedder::{deterministic_embedding, EmbeddingProvider, EmbeddingTask, HashEmbedder};
pub use error::ProviderError;
pub use generator::{CannedGenerator, Generation, GenerationParams, GeneratorProvider};
pub use retry::{retry_transient, RetryPolicy};
