//! Qdrant backend over gRPC.

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_output::VectorsOptions;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, PointStruct, SearchPointsBuilder, UpsertPointsBuilder,
    Value as QdrantValue, VectorParamsBuilder, VectorsOutput,
};
use qdrant_client::{Payload, Qdrant, QdrantError};
use tracing::debug;

use super::error::{RagError, Result};
use super::store::{
    chunk_payload, CollectionStats, ScoredPoint, StoredPoint, VectorStore, PAYLOAD_CONTENT,
    PAYLOAD_METADATA,
};
use super::types::{DocumentChunk, MetaValue, Metadata};

pub struct QdrantVectorStore {
    client: Qdrant,
}

impl QdrantVectorStore {
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .api_key(api_key)
            .build()
            .map_err(map_err)?;
        Ok(Self { client })
    }
}

fn map_err(e: QdrantError) -> RagError {
    RagError::StoreUnavailable(e.to_string())
}

fn meta_value(value: &QdrantValue) -> Option<MetaValue> {
    match value.kind.as_ref()? {
        Kind::StringValue(s) => Some(MetaValue::Text(s.clone())),
        Kind::IntegerValue(n) => Some(MetaValue::Integer(*n)),
        Kind::DoubleValue(x) => Some(MetaValue::Float(*x)),
        Kind::BoolValue(b) => Some(MetaValue::Bool(*b)),
        _ => None,
    }
}

fn chunk_from_qdrant(payload: &HashMap<String, QdrantValue>) -> DocumentChunk {
    let text = match payload.get(PAYLOAD_CONTENT).and_then(|v| v.kind.as_ref()) {
        Some(Kind::StringValue(s)) => s.clone(),
        _ => String::new(),
    };
    let metadata: Metadata = match payload.get(PAYLOAD_METADATA).and_then(|v| v.kind.as_ref()) {
        Some(Kind::StructValue(s)) => s
            .fields
            .iter()
            .filter_map(|(k, v)| meta_value(v).map(|v| (k.clone(), v)))
            .collect(),
        _ => Metadata::new(),
    };
    DocumentChunk::new(text, metadata)
}

#[allow(deprecated)]
fn dense_vector(vectors: Option<VectorsOutput>) -> Option<Vec<f32>> {
    match vectors?.vectors_options? {
        VectorsOptions::Vector(v) => Some(v.data),
        _ => None,
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    fn backend(&self) -> &str {
        "qdrant"
    }

    async fn health(&self) -> Result<()> {
        self.client.health_check().await.map_err(map_err)?;
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        self.client.collection_exists(name).await.map_err(map_err)
    }

    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<bool> {
        if self.collection_exists(name).await? {
            debug!(collection = name, "qdrant collection already exists");
            return Ok(false);
        }

        let created = self
            .client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(VectorParamsBuilder::new(dimensions as u64, Distance::Cosine)),
            )
            .await;
        match created {
            Ok(_) => {
                debug!(collection = name, dimensions, "created qdrant collection");
                Ok(true)
            }
            // lost a create race with a concurrent request
            Err(e) if e.to_string().contains("already exists") => Ok(false),
            Err(e) => Err(map_err(e)),
        }
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        if !self.collection_exists(name).await? {
            return Err(RagError::NotFound(name.to_string()));
        }
        self.client.delete_collection(name).await.map_err(map_err)?;
        debug!(collection = name, "deleted qdrant collection");
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let response = self.client.list_collections().await.map_err(map_err)?;
        Ok(response.collections.into_iter().map(|c| c.name).collect())
    }

    async fn collection_stats(&self, name: &str) -> Result<CollectionStats> {
        let response = self.client.collection_info(name).await.map_err(map_err)?;
        let points = response
            .result
            .and_then(|info| info.points_count)
            .unwrap_or_default();
        Ok(CollectionStats {
            points,
            last_updated: None,
        })
    }

    async fn upsert(&self, name: &str, points: Vec<StoredPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let count = points.len();
        let points = points
            .into_iter()
            .map(|point| {
                let payload = Payload::try_from(chunk_payload(&point.chunk))
                    .map_err(|e| RagError::StoreUnavailable(e.to_string()))?;
                Ok(PointStruct::new(point.id, point.vector, payload))
            })
            .collect::<Result<Vec<_>>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(name, points).wait(true))
            .await
            .map_err(map_err)?;
        debug!(collection = name, count, "upserted points to qdrant");
        Ok(())
    }

    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
        with_vectors: bool,
    ) -> Result<Vec<ScoredPoint>> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(name, vector.to_vec(), limit as u64)
                    .with_payload(true)
                    .with_vectors(with_vectors),
            )
            .await
            .map_err(map_err)?;

        Ok(response
            .result
            .into_iter()
            .map(|scored| ScoredPoint {
                chunk: chunk_from_qdrant(&scored.payload),
                score: scored.score,
                vector: dense_vector(scored.vectors),
            })
            .collect())
    }
}
