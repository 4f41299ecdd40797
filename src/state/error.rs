use thiserror::Error;

use crate::core::errors::ApiError;
use crate::rag::RagError;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to load configuration: {0}")]
    Config(#[source] ApiError),

    #[error("Invalid auth settings: {0}")]
    Auth(#[source] ApiError),

    #[error("Failed to initialize vector store: {0}")]
    VectorStore(#[source] RagError),

    #[error("Failed to initialize LLM provider: {0}")]
    Llm(#[source] ApiError),

    #[error("Failed to initialize web loader: {0}")]
    WebLoader(#[source] RagError),

    #[error("Embedding model produces {embedder}-dimensional vectors but vector_store.dimension is {configured}")]
    EmbeddingDimensions { configured: usize, embedder: usize },
}
