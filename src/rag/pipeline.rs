//! Ingestion (load, split, embed, upsert) and retrieval with one fallback.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::collection::CollectionKey;
use super::error::{RagError, Result};
use super::gateway::{SearchMode, VectorStoreGateway, DEFAULT_TOP_K};
use super::loaders::{self, SourceKind, WebLoader};
use super::splitter::TextSplitter;
use super::types::{
    DocumentChunk, Metadata, RetrievedChunk, KEY_FILENAME, KEY_INDEX_DATE, KEY_SOURCE,
    KEY_UPLOAD_DATE, KEY_USER_ID,
};

pub const FALLBACK_TOP_K: usize = 3;
pub const MANUAL_SOURCE: &str = "manual";

/// Raw input of one ingestion call.
#[derive(Debug, Clone)]
pub enum IngestSource {
    Pdf { bytes: Vec<u8>, filename: String },
    Csv { bytes: Vec<u8>, filename: String },
    Url(String),
}

impl IngestSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            IngestSource::Pdf { .. } => SourceKind::Pdf,
            IngestSource::Csv { .. } => SourceKind::Csv,
            IngestSource::Url(_) => SourceKind::Url,
        }
    }

    fn label(&self) -> &str {
        match self {
            IngestSource::Pdf { filename, .. } | IngestSource::Csv { filename, .. } => filename,
            IngestSource::Url(url) => url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub chunk_count: usize,
    pub created: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_processed: Option<usize>,
}

/// Outcome of a retrieval. `Unavailable` means both attempts failed.
#[derive(Debug, Clone)]
pub enum Retrieval {
    Found(Vec<RetrievedChunk>),
    Unavailable,
}

#[derive(Debug, Clone, Copy)]
pub struct RetrievalOptions {
    pub mode: SearchMode,
    pub top_k: usize,
    pub fallback_top_k: usize,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            mode: SearchMode::Mmr,
            top_k: DEFAULT_TOP_K,
            fallback_top_k: FALLBACK_TOP_K,
        }
    }
}

#[derive(Clone)]
pub struct RetrievalPipeline {
    gateway: VectorStoreGateway,
    splitter: TextSplitter,
    web: WebLoader,
    max_upload_bytes: usize,
    retrieval: RetrievalOptions,
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl RetrievalPipeline {
    pub fn new(
        gateway: VectorStoreGateway,
        splitter: TextSplitter,
        web: WebLoader,
        max_upload_bytes: usize,
        retrieval: RetrievalOptions,
    ) -> Self {
        Self {
            gateway,
            splitter,
            web,
            max_upload_bytes,
            retrieval,
        }
    }

    pub fn gateway(&self) -> &VectorStoreGateway {
        &self.gateway
    }

    /// Load, split and store `source` into `key`.
    pub async fn ingest(&self, source: IngestSource, key: &CollectionKey) -> Result<IngestReport> {
        let kind = source.kind();
        let label = source.label().to_string();
        let mut overlay = Metadata::new();
        let mut rows_processed = None;

        let documents = match &source {
            IngestSource::Pdf { bytes, filename } => {
                loaders::ensure_within_limit(bytes, self.max_upload_bytes)?;
                overlay.insert(KEY_FILENAME.to_string(), filename.as_str().into());
                overlay.insert(KEY_UPLOAD_DATE.to_string(), now_iso().into());
                loaders::load_pdf(bytes)?
            }
            IngestSource::Csv { bytes, filename } => {
                loaders::ensure_within_limit(bytes, self.max_upload_bytes)?;
                overlay.insert(KEY_UPLOAD_DATE.to_string(), now_iso().into());
                let rows = loaders::load_csv(bytes, filename)?;
                rows_processed = Some(rows.len());
                rows
            }
            IngestSource::Url(url) => {
                overlay.insert(KEY_INDEX_DATE.to_string(), now_iso().into());
                self.web.load(url).await?
            }
        };
        if let Some(tenant) = key.tenant() {
            overlay.insert(KEY_USER_ID.to_string(), tenant.as_str().into());
        }

        let chunks = self.splitter.split_documents(&documents, &overlay);
        if chunks.is_empty() {
            return Err(RagError::NoDocuments(label));
        }

        let chunk_count = chunks.len();
        let created = self.gateway.upsert(key, chunks).await?;
        info!(
            collection = %key,
            source = kind.as_str(),
            chunk_count,
            created,
            "ingested documents"
        );
        Ok(IngestReport {
            chunk_count,
            created,
            rows_processed,
        })
    }

    /// Store `text` verbatim as one chunk tagged `source=manual`.
    pub async fn store_text(&self, text: &str, key: &CollectionKey) -> Result<IngestReport> {
        if text.trim().is_empty() {
            return Err(RagError::Validation("Text is required.".to_string()));
        }
        let mut metadata = Metadata::new();
        metadata.insert(KEY_SOURCE.to_string(), MANUAL_SOURCE.into());
        metadata.insert(KEY_UPLOAD_DATE.to_string(), now_iso().into());
        if let Some(tenant) = key.tenant() {
            metadata.insert(KEY_USER_ID.to_string(), tenant.as_str().into());
        }

        let created = self
            .gateway
            .upsert(key, vec![DocumentChunk::new(text, metadata)])
            .await?;
        info!(collection = %key, created, "stored manual text");
        Ok(IngestReport {
            chunk_count: 1,
            created,
            rows_processed: None,
        })
    }

    /// Search with the primary mode, then once more with a narrowed
    /// similarity search. Never fails.
    pub async fn retrieve(&self, query: &str, key: &CollectionKey) -> Retrieval {
        let primary = self
            .gateway
            .search(key, query, self.retrieval.top_k, self.retrieval.mode)
            .await;
        let err = match primary {
            Ok(chunks) => return Retrieval::Found(chunks),
            Err(err) => err,
        };
        warn!(
            collection = %key,
            mode = ?self.retrieval.mode,
            k = self.retrieval.top_k,
            "retrieval failed, retrying with similarity search: {}",
            err
        );

        match self
            .gateway
            .search(key, query, self.retrieval.fallback_top_k, SearchMode::Similarity)
            .await
        {
            Ok(chunks) => Retrieval::Found(chunks),
            Err(err) => {
                warn!(collection = %key, k = self.retrieval.fallback_top_k, "retrieval unavailable: {}", err);
                Retrieval::Unavailable
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::llm::EmbeddingProvider;
    use crate::rag::gateway::GatewayOptions;
    use crate::rag::gateway::testing::LETTER_DIMS;
    use crate::rag::store::VectorStore;

    pub fn pipeline(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> RetrievalPipeline {
        let options = GatewayOptions {
            dimensions: LETTER_DIMS,
            ..GatewayOptions::default()
        };
        RetrievalPipeline::new(
            VectorStoreGateway::new(store, embedder, options),
            TextSplitter::default(),
            WebLoader::new(Duration::from_secs(2)).unwrap(),
            loaders::MAX_UPLOAD_BYTES,
            RetrievalOptions::default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::testing::pipeline;
    use super::*;
    use crate::rag::collection::TenantId;
    use crate::rag::gateway::testing::LetterEmbedder;
    use crate::rag::loaders::fixtures::pdf_with_pages;
    use crate::rag::memory::InMemoryVectorStore;
    use crate::rag::store::{CollectionStats, ScoredPoint, StoredPoint, VectorStore};
    use crate::rag::types::{KEY_FILE, KEY_PAGE_NUMBER, KEY_ROW};

    fn key(name: &str) -> CollectionKey {
        CollectionKey::new(Some(TenantId::new("alice").unwrap()), name).unwrap()
    }

    fn keys(chunk: &DocumentChunk) -> BTreeSet<&str> {
        chunk.metadata.keys().map(String::as_str).collect()
    }

    async fn stored_chunks(store: &InMemoryVectorStore, key: &CollectionKey) -> Vec<DocumentChunk> {
        store
            .search(&key.physical(), &[1.0; 26], 1000, false)
            .await
            .unwrap()
            .into_iter()
            .map(|hit| hit.chunk)
            .collect()
    }

    #[tokio::test]
    async fn three_page_pdf_is_ingested_with_page_metadata() {
        let store = Arc::new(InMemoryVectorStore::new());
        let pipeline = pipeline(store.clone(), Arc::new(LetterEmbedder::default()));
        let bytes = pdf_with_pages(&["Intro to the system", "Design notes", "Appendix"]);

        let report = pipeline
            .ingest(
                IngestSource::Pdf {
                    bytes,
                    filename: "spec.pdf".into(),
                },
                &key("docs"),
            )
            .await
            .unwrap();
        assert!(report.chunk_count > 0);
        assert!(report.created);
        assert_eq!(report.rows_processed, None);

        let chunks = stored_chunks(&store, &key("docs")).await;
        assert_eq!(chunks.len(), report.chunk_count);
        for chunk in &chunks {
            assert_eq!(chunk.meta_str(KEY_FILENAME), Some("spec.pdf"));
            let page = chunk.meta_i64(KEY_PAGE_NUMBER).unwrap();
            assert!((1..=3).contains(&page));
            assert_eq!(
                keys(chunk),
                BTreeSet::from([KEY_PAGE_NUMBER, KEY_FILENAME, KEY_UPLOAD_DATE, KEY_USER_ID])
            );
        }
    }

    #[tokio::test]
    async fn csv_rows_carry_row_and_file_only() {
        let store = Arc::new(InMemoryVectorStore::new());
        let pipeline = pipeline(store.clone(), Arc::new(LetterEmbedder::default()));
        let anonymous = CollectionKey::new(None, "table").unwrap();

        let report = pipeline
            .ingest(
                IngestSource::Csv {
                    bytes: b"name,city\nAda,London\nLinus,Helsinki\n".to_vec(),
                    filename: "people.csv".into(),
                },
                &anonymous,
            )
            .await
            .unwrap();
        assert_eq!(report.rows_processed, Some(2));
        assert_eq!(report.chunk_count, 2);

        for chunk in stored_chunks(&store, &anonymous).await {
            assert_eq!(chunk.meta_str(KEY_FILE), Some("people.csv"));
            assert_eq!(keys(&chunk), BTreeSet::from([KEY_ROW, KEY_FILE, KEY_UPLOAD_DATE]));
        }
    }

    #[tokio::test]
    async fn oversized_upload_fails_before_embedding() {
        let embedder = Arc::new(LetterEmbedder::default());
        let pipeline = pipeline(Arc::new(InMemoryVectorStore::new()), embedder.clone());

        let err = pipeline
            .ingest(
                IngestSource::Pdf {
                    bytes: vec![b'%'; loaders::MAX_UPLOAD_BYTES + 1],
                    filename: "big.pdf".into(),
                },
                &key("docs"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::PayloadTooLarge { .. }));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn header_only_csv_has_no_documents() {
        let pipeline = pipeline(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(LetterEmbedder::default()),
        );
        let err = pipeline
            .ingest(
                IngestSource::Csv {
                    bytes: b"name,city\n".to_vec(),
                    filename: "empty.csv".into(),
                },
                &key("docs"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::NoDocuments(_)));
    }

    #[tokio::test]
    async fn manual_text_is_stored_as_one_chunk() {
        let store = Arc::new(InMemoryVectorStore::new());
        let pipeline = pipeline(store.clone(), Arc::new(LetterEmbedder::default()));

        let report = pipeline.store_text("remember this", &key("notes")).await.unwrap();
        assert_eq!(report.chunk_count, 1);
        assert!(report.created);

        let chunks = stored_chunks(&store, &key("notes")).await;
        assert_eq!(chunks[0].meta_str(KEY_SOURCE), Some(MANUAL_SOURCE));
        assert!(chunks[0].metadata.contains_key(KEY_UPLOAD_DATE));

        assert!(matches!(
            pipeline.store_text("  ", &key("notes")).await,
            Err(RagError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn empty_collection_retrieves_nothing() {
        let pipeline = pipeline(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(LetterEmbedder::default()),
        );
        pipeline.gateway().ensure_collection(&key("fresh")).await.unwrap();

        match pipeline.retrieve("what is X", &key("fresh")).await {
            Retrieval::Found(chunks) => assert!(chunks.is_empty()),
            Retrieval::Unavailable => panic!("empty collection must not be unavailable"),
        }
    }

    /// Store whose searches fail a fixed number of times.
    struct FlakyStore {
        inner: InMemoryVectorStore,
        failures_left: AtomicUsize,
        limits: std::sync::Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl VectorStore for FlakyStore {
        fn backend(&self) -> &str {
            "flaky"
        }
        async fn health(&self) -> Result<()> {
            Ok(())
        }
        async fn collection_exists(&self, name: &str) -> Result<bool> {
            self.inner.collection_exists(name).await
        }
        async fn create_collection(&self, name: &str, dimensions: usize) -> Result<bool> {
            self.inner.create_collection(name, dimensions).await
        }
        async fn delete_collection(&self, name: &str) -> Result<()> {
            self.inner.delete_collection(name).await
        }
        async fn list_collections(&self) -> Result<Vec<String>> {
            self.inner.list_collections().await
        }
        async fn collection_stats(&self, name: &str) -> Result<CollectionStats> {
            self.inner.collection_stats(name).await
        }
        async fn upsert(&self, name: &str, points: Vec<StoredPoint>) -> Result<()> {
            self.inner.upsert(name, points).await
        }
        async fn search(
            &self,
            name: &str,
            vector: &[f32],
            limit: usize,
            with_vectors: bool,
        ) -> Result<Vec<ScoredPoint>> {
            self.limits.lock().unwrap().push(limit);
            let remaining = self.failures_left.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_left.store(remaining - 1, Ordering::SeqCst);
                return Err(RagError::StoreUnavailable("connection reset".into()));
            }
            self.inner.search(name, vector, limit, with_vectors).await
        }
    }

    fn flaky(failures: usize) -> Arc<FlakyStore> {
        Arc::new(FlakyStore {
            inner: InMemoryVectorStore::new(),
            failures_left: AtomicUsize::new(failures),
            limits: std::sync::Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn retries_once_with_narrowed_similarity_search() {
        let store = flaky(1);
        let pipeline = pipeline(store.clone(), Arc::new(LetterEmbedder::default()));
        pipeline.store_text("alpha", &key("docs")).await.unwrap();

        match pipeline.retrieve("alpha", &key("docs")).await {
            Retrieval::Found(chunks) => assert_eq!(chunks.len(), 1),
            Retrieval::Unavailable => panic!("fallback should succeed"),
        }
        // mmr fetches top_k * multiplier, the fallback asks for 3
        assert_eq!(*store.limits.lock().unwrap(), vec![20, 3]);
    }

    #[tokio::test]
    async fn second_failure_is_unavailable() {
        let store = flaky(2);
        let pipeline = pipeline(store.clone(), Arc::new(LetterEmbedder::default()));
        pipeline.store_text("alpha", &key("docs")).await.unwrap();

        assert!(matches!(
            pipeline.retrieve("alpha", &key("docs")).await,
            Retrieval::Unavailable
        ));
        assert_eq!(store.limits.lock().unwrap().len(), 2);
    }
}
