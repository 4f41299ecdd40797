use std::sync::Arc;
use std::time::Duration;

use crate::chat::ChatOrchestrator;
use crate::core::config::{AppConfig, AppPaths, ConfigService, VectorStoreBackend};
use crate::core::security::AuthPolicy;
use crate::llm::{EmbeddingProvider, LlmProvider, OpenAiProvider};
use crate::rag::loaders::WebLoader;
use crate::rag::mmr::MmrConfig;
use crate::rag::{
    BlobStore, CollectionRegistry, GatewayOptions, InMemoryVectorStore, LocalBlobStore,
    QdrantVectorStore, RetrievalOptions, RetrievalPipeline, TextSplitter, VectorStore,
    VectorStoreGateway,
};

pub mod error;

use error::InitializationError;

/// Collaborators shared by every request handler.
///
/// Everything is constructed once at startup from `AppConfig` and passed in;
/// tests build it from doubles through [`AppState::from_parts`].
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: Arc<AppConfig>,
    pub auth: AuthPolicy,
    pub pipeline: RetrievalPipeline,
    pub registry: CollectionRegistry,
    pub chat: ChatOrchestrator,
    pub blobs: Option<Arc<dyn BlobStore>>,
}

impl AppState {
    /// Load configuration from disk and the environment, then connect to the
    /// configured vector store and completion/embedding service.
    pub async fn initialize() -> Result<Arc<Self>, InitializationError> {
        let paths = Arc::new(AppPaths::new());
        let config_service = ConfigService::new(paths.clone());
        let config = config_service
            .load_app_config()
            .map_err(InitializationError::Config)?;

        let store: Arc<dyn VectorStore> = match config.vector_store.backend {
            VectorStoreBackend::Qdrant => Arc::new(
                QdrantVectorStore::new(&config.vector_store.url, config.vector_store.api_key.clone())
                    .map_err(InitializationError::VectorStore)?,
            ),
            VectorStoreBackend::Memory => Arc::new(InMemoryVectorStore::new()),
        };

        let openai = Arc::new(
            OpenAiProvider::new(&config.llm, config.vector_store.dimension)
                .map_err(InitializationError::Llm)?,
        );
        if config.llm.api_key.is_none() {
            tracing::warn!("llm.api_key is not set; requests to the completion service may be rejected");
        }

        let blobs: Option<Arc<dyn BlobStore>> = config
            .uploads
            .enabled
            .then(|| Arc::new(LocalBlobStore::new(paths.upload_dir.clone())) as Arc<dyn BlobStore>);

        Self::from_parts(paths, config, store, openai.clone(), openai, blobs)
    }

    pub fn from_parts(
        paths: Arc<AppPaths>,
        config: AppConfig,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
        blobs: Option<Arc<dyn BlobStore>>,
    ) -> Result<Arc<Self>, InitializationError> {
        let auth = AuthPolicy::from_config(&config.auth).map_err(InitializationError::Auth)?;
        if embedder.dimensions() != config.vector_store.dimension {
            return Err(InitializationError::EmbeddingDimensions {
                configured: config.vector_store.dimension,
                embedder: embedder.dimensions(),
            });
        }

        let gateway = VectorStoreGateway::new(
            store,
            embedder,
            GatewayOptions {
                dimensions: config.vector_store.dimension,
                embed_batch_size: config.ingestion.embed_batch_size,
                embed_concurrency: config.ingestion.embed_concurrency,
                mmr: MmrConfig::new(
                    config.retrieval.mmr_lambda,
                    config.retrieval.mmr_fetch_multiplier,
                ),
            },
        );
        let web = WebLoader::new(Duration::from_secs(config.ingestion.web_timeout_secs))
            .map_err(InitializationError::WebLoader)?;
        let pipeline = RetrievalPipeline::new(
            gateway.clone(),
            TextSplitter::new(config.ingestion.chunk_size, config.ingestion.chunk_overlap),
            web,
            config.ingestion.max_upload_bytes,
            RetrievalOptions {
                mode: config.retrieval.search_mode,
                top_k: config.retrieval.top_k,
                fallback_top_k: config.retrieval.fallback_top_k,
            },
        );
        let registry = CollectionRegistry::new(gateway);
        let chat = ChatOrchestrator::new(pipeline.clone(), llm);

        Ok(Arc::new(AppState {
            paths,
            config: Arc::new(config),
            auth,
            pipeline,
            registry,
            chat,
            blobs,
        }))
    }

    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        self.pipeline.gateway().store()
    }
}
