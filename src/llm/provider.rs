use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::errors::ApiError;
use super::types::ChatRequest;

/// Incremental completion output. Dropping the receiver stops the upstream
/// request.
pub type TokenStream = mpsc::Receiver<Result<String, ApiError>>;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// return the provider name (e.g. "openai")
    fn name(&self) -> &str;

    /// chat completion (non-streaming)
    async fn chat(&self, request: ChatRequest) -> Result<String, ApiError>;

    /// chat completion (streaming)
    async fn stream_chat(&self, request: ChatRequest) -> Result<TokenStream, ApiError>;
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// one vector per input, in input order
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError>;

    /// dimensionality of produced vectors
    fn dimensions(&self) -> usize;

    async fn embed(&self, input: &str) -> Result<Vec<f32>, ApiError> {
        let mut vectors = self.embed_batch(&[input.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| ApiError::Internal("embedding service returned no vectors".to_string()))
    }
}
