//! Vector store abstraction shared by the Qdrant and in-memory backends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use super::error::Result;
use super::types::{DocumentChunk, Metadata};

pub const PAYLOAD_CONTENT: &str = "content";
pub const PAYLOAD_METADATA: &str = "metadata";

/// A chunk with its embedding, ready to be written.
#[derive(Debug, Clone)]
pub struct StoredPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub chunk: DocumentChunk,
}

impl StoredPoint {
    pub fn new(vector: Vec<f32>, chunk: DocumentChunk) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            vector,
            chunk,
        }
    }
}

/// A search hit. `vector` is only populated when requested.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub chunk: DocumentChunk,
    pub score: f32,
    pub vector: Option<Vec<f32>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionStats {
    pub points: u64,
    pub last_updated: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Backend name used in logs and health output.
    fn backend(&self) -> &str;

    /// Reachability probe.
    async fn health(&self) -> Result<()>;

    async fn collection_exists(&self, name: &str) -> Result<bool>;

    /// Create a cosine collection. Returns false when it already existed.
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<bool>;

    /// Drop a collection and its points. `NotFound` when absent.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Physical names of every collection in the store.
    async fn list_collections(&self) -> Result<Vec<String>>;

    async fn collection_stats(&self, name: &str) -> Result<CollectionStats>;

    async fn upsert(&self, name: &str, points: Vec<StoredPoint>) -> Result<()>;

    /// Nearest neighbours by cosine similarity, best first.
    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
        with_vectors: bool,
    ) -> Result<Vec<ScoredPoint>>;
}

/// Stored payload shape: `{"content": text, "metadata": {...}}`.
pub fn chunk_payload(chunk: &DocumentChunk) -> Value {
    json!({
        PAYLOAD_CONTENT: chunk.text,
        PAYLOAD_METADATA: chunk.metadata,
    })
}

/// Inverse of [`chunk_payload`]. Unknown metadata shapes are dropped.
pub fn chunk_from_payload(payload: &Value) -> DocumentChunk {
    let text = payload[PAYLOAD_CONTENT].as_str().unwrap_or_default().to_string();
    let metadata: Metadata = payload
        .get(PAYLOAD_METADATA)
        .and_then(Value::as_object)
        .map(|fields| {
            fields
                .iter()
                .filter_map(|(k, v)| serde_json::from_value(v.clone()).ok().map(|v| (k.clone(), v)))
                .collect()
        })
        .unwrap_or_default();
    DocumentChunk::new(text, metadata)
}
