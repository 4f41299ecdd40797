//! Process-local vector store with exact cosine search.
//!
//! Serves `vector_store.backend: memory` deployments and the test suites.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::error::{RagError, Result};
use super::mmr::cosine_similarity;
use super::store::{CollectionStats, ScoredPoint, StoredPoint, VectorStore};
use super::types::DocumentChunk;

#[derive(Debug)]
struct Collection {
    dimensions: usize,
    points: HashMap<String, (Vec<f32>, DocumentChunk)>,
    last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn backend(&self) -> &str {
        "memory"
    }

    async fn health(&self) -> Result<()> {
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<bool> {
        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            return Ok(false);
        }
        collections.insert(
            name.to_string(),
            Collection {
                dimensions,
                points: HashMap::new(),
                last_updated: None,
            },
        );
        Ok(true)
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.collections
            .write()
            .await
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RagError::NotFound(name.to_string()))
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.collections.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn collection_stats(&self, name: &str) -> Result<CollectionStats> {
        let collections = self.collections.read().await;
        let collection = collections
            .get(name)
            .ok_or_else(|| RagError::NotFound(name.to_string()))?;
        Ok(CollectionStats {
            points: collection.points.len() as u64,
            last_updated: collection.last_updated,
        })
    }

    async fn upsert(&self, name: &str, points: Vec<StoredPoint>) -> Result<()> {
        let mut collections = self.collections.write().await;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| RagError::NotFound(name.to_string()))?;
        if let Some(bad) = points.iter().find(|p| p.vector.len() != collection.dimensions) {
            return Err(RagError::StoreUnavailable(format!(
                "expected {} dimensions, got {}",
                collection.dimensions,
                bad.vector.len()
            )));
        }
        if points.is_empty() {
            return Ok(());
        }
        for point in points {
            collection.points.insert(point.id, (point.vector, point.chunk));
        }
        collection.last_updated = Some(Utc::now());
        Ok(())
    }

    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
        with_vectors: bool,
    ) -> Result<Vec<ScoredPoint>> {
        let collections = self.collections.read().await;
        let collection = collections
            .get(name)
            .ok_or_else(|| RagError::NotFound(name.to_string()))?;

        let mut scored: Vec<ScoredPoint> = collection
            .points
            .values()
            .map(|(stored, chunk)| ScoredPoint {
                chunk: chunk.clone(),
                score: cosine_similarity(stored, vector),
                vector: with_vectors.then(|| stored.clone()),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::types::Metadata;

    fn point(text: &str, vector: Vec<f32>) -> StoredPoint {
        StoredPoint::new(vector, DocumentChunk::new(text, Metadata::new()))
    }

    #[tokio::test]
    async fn create_is_reported_once() {
        let store = InMemoryVectorStore::new();
        assert!(store.create_collection("docs", 2).await.unwrap());
        assert!(!store.create_collection("docs", 2).await.unwrap());
        assert!(store.collection_exists("docs").await.unwrap());
    }

    #[tokio::test]
    async fn search_orders_by_similarity() {
        let store = InMemoryVectorStore::new();
        store.create_collection("docs", 2).await.unwrap();
        store
            .upsert(
                "docs",
                vec![point("east", vec![1.0, 0.0]), point("north", vec![0.0, 1.0])],
            )
            .await
            .unwrap();

        let hits = store.search("docs", &[0.9, 0.1], 1, false).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.text, "east");
        assert!(hits[0].vector.is_none());

        let hits = store.search("docs", &[0.1, 0.9], 5, true).await.unwrap();
        assert_eq!(hits[0].chunk.text, "north");
        assert_eq!(hits[0].vector.as_deref(), Some(&[0.0, 1.0][..]));
    }

    #[tokio::test]
    async fn stats_track_writes() {
        let store = InMemoryVectorStore::new();
        store.create_collection("docs", 1).await.unwrap();
        let empty = store.collection_stats("docs").await.unwrap();
        assert_eq!(empty.points, 0);
        assert!(empty.last_updated.is_none());

        store.upsert("docs", vec![point("a", vec![1.0])]).await.unwrap();
        let stats = store.collection_stats("docs").await.unwrap();
        assert_eq!(stats.points, 1);
        assert!(stats.last_updated.is_some());
    }

    #[tokio::test]
    async fn missing_collections_are_not_found() {
        let store = InMemoryVectorStore::new();
        assert!(matches!(
            store.delete_collection("ghost").await,
            Err(RagError::NotFound(_))
        ));
        assert!(matches!(
            store.search("ghost", &[1.0], 1, false).await,
            Err(RagError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn rejects_wrong_dimensions() {
        let store = InMemoryVectorStore::new();
        store.create_collection("docs", 3).await.unwrap();
        let err = store
            .upsert("docs", vec![point("a", vec![1.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::StoreUnavailable(_)));
    }
}
