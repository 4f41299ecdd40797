//! Tenant-aware front for the vector store and the embedding service.

use std::sync::Arc;

use futures_util::{stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::llm::EmbeddingProvider;
use super::collection::CollectionKey;
use super::error::{RagError, Result};
use super::mmr::{mmr_select, MmrConfig};
use super::store::{StoredPoint, VectorStore};
use super::types::{DocumentChunk, RetrievedChunk};

pub const DEFAULT_DIMENSIONS: usize = 1536;
pub const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Similarity,
    #[default]
    Mmr,
}

#[derive(Debug, Clone)]
pub struct GatewayOptions {
    pub dimensions: usize,
    pub embed_batch_size: usize,
    pub embed_concurrency: usize,
    pub mmr: MmrConfig,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_DIMENSIONS,
            embed_batch_size: 64,
            embed_concurrency: 4,
            mmr: MmrConfig::default(),
        }
    }
}

#[derive(Clone)]
pub struct VectorStoreGateway {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    options: GatewayOptions,
}

impl VectorStoreGateway {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        options: GatewayOptions,
    ) -> Self {
        Self {
            store,
            embedder,
            options,
        }
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Create-if-absent. Returns whether this call created the collection.
    pub async fn ensure_collection(&self, key: &CollectionKey) -> Result<bool> {
        let physical = key.physical();
        let created = self
            .store
            .create_collection(&physical, self.options.dimensions)
            .await?;
        if created {
            info!(collection = %key, physical = %physical, "created collection");
        }
        Ok(created)
    }

    pub async fn exists(&self, key: &CollectionKey) -> Result<bool> {
        self.store.collection_exists(&key.physical()).await
    }

    /// Embed and persist `chunks`, creating the collection on first write.
    ///
    /// Every chunk is embedded before anything is written, so a failed
    /// embedding leaves the store untouched.
    pub async fn upsert(&self, key: &CollectionKey, chunks: Vec<DocumentChunk>) -> Result<bool> {
        if chunks.is_empty() {
            return Ok(false);
        }
        let vectors = self.embed_chunks(&chunks).await?;
        let created = self.ensure_collection(key).await?;

        let points: Vec<StoredPoint> = vectors
            .into_iter()
            .zip(chunks)
            .map(|(vector, chunk)| StoredPoint::new(vector, chunk))
            .collect();
        let count = points.len();
        self.store.upsert(&key.physical(), points).await?;
        debug!(collection = %key, chunk_count = count, "upserted chunks");
        Ok(created)
    }

    async fn embed_chunks(&self, chunks: &[DocumentChunk]) -> Result<Vec<Vec<f32>>> {
        let batch_size = self.options.embed_batch_size.max(1);
        let batches: Vec<Vec<String>> = chunks
            .chunks(batch_size)
            .map(|batch| batch.iter().map(|c| c.text.clone()).collect())
            .collect();

        let embedded: Vec<Vec<Vec<f32>>> = stream::iter(batches)
            .map(|batch| {
                let embedder = Arc::clone(&self.embedder);
                async move {
                    let vectors = embedder
                        .embed_batch(&batch)
                        .await
                        .map_err(|e| RagError::Embedding(e.to_string()))?;
                    if vectors.len() != batch.len() {
                        return Err(RagError::Embedding(format!(
                            "expected {} vectors, got {}",
                            batch.len(),
                            vectors.len()
                        )));
                    }
                    Ok(vectors)
                }
            })
            .buffered(self.options.embed_concurrency.max(1))
            .try_collect()
            .await?;

        Ok(embedded.into_iter().flatten().collect())
    }

    /// Top-`k` chunks for `query`. A missing collection is `NotFound`.
    pub async fn search(
        &self,
        key: &CollectionKey,
        query: &str,
        k: usize,
        mode: SearchMode,
    ) -> Result<Vec<RetrievedChunk>> {
        let physical = key.physical();
        if !self.store.collection_exists(&physical).await? {
            return Err(RagError::NotFound(key.logical().to_string()));
        }
        let vector = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| RagError::Embedding(e.to_string()))?;

        match mode {
            SearchMode::Similarity => {
                let hits = self.store.search(&physical, &vector, k, false).await?;
                Ok(hits
                    .into_iter()
                    .map(|hit| RetrievedChunk {
                        chunk: hit.chunk,
                        score: hit.score,
                    })
                    .collect())
            }
            SearchMode::Mmr => {
                let fetch = self.options.mmr.fetch_count(k).max(k);
                let hits = self.store.search(&physical, &vector, fetch, true).await?;
                let candidates: Vec<(RetrievedChunk, Vec<f32>)> = hits
                    .into_iter()
                    .filter_map(|hit| {
                        let candidate = RetrievedChunk {
                            chunk: hit.chunk,
                            score: hit.score,
                        };
                        hit.vector.map(|v| (candidate, v))
                    })
                    .collect();
                Ok(mmr_select(&vector, candidates, k, self.options.mmr.lambda))
            }
        }
    }

    /// Drop the collection. `NotFound` when it does not exist.
    pub async fn delete(&self, key: &CollectionKey) -> Result<()> {
        self.store.delete_collection(&key.physical()).await?;
        info!(collection = %key, "deleted collection");
        Ok(())
    }
}
