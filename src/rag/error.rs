//! Error types for the ingestion and retrieval stack.

use thiserror::Error;

/// Errors raised by loaders, the vector store gateway and the pipeline.
#[derive(Debug, Error)]
pub enum RagError {
    /// Missing or malformed input.
    #[error("{0}")]
    Validation(String),

    /// An uploaded file exceeds the configured size cap.
    #[error("File size {actual} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize, actual: usize },

    /// A document could not be read or fetched.
    #[error("Failed to load document: {0}")]
    Load(String),

    /// Loading produced nothing to index.
    #[error("No documents to index for {0}")]
    NoDocuments(String),

    /// The embedding service failed.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// The vector store could not be reached or rejected the request.
    #[error("Vector store unavailable: {0}")]
    StoreUnavailable(String),

    /// The collection does not exist.
    #[error("Collection not found: {0}")]
    NotFound(String),

    /// The collection belongs to another tenant.
    #[error("Collection is not owned by the caller")]
    Forbidden,

    /// Archiving an upload failed.
    #[error("Blob storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, RagError>;
