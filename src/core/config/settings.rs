//! Typed view of the merged configuration document.

use serde::{Deserialize, Serialize};

use crate::rag::gateway::{DEFAULT_DIMENSIONS, DEFAULT_TOP_K};
use crate::rag::loaders::MAX_UPLOAD_BYTES;
use crate::rag::mmr::{DEFAULT_FETCH_MULTIPLIER, DEFAULT_LAMBDA};
use crate::rag::pipeline::FALLBACK_TOP_K;
use crate::rag::splitter::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::rag::SearchMode;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub vector_store: VectorStoreConfig,
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub ingestion: IngestionConfig,
    pub auth: AuthConfig,
    pub uploads: UploadsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            cors_allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorStoreBackend {
    #[default]
    Qdrant,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub backend: VectorStoreBackend,
    pub url: String,
    pub api_key: Option<String>,
    pub dimension: usize,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: VectorStoreBackend::Qdrant,
            url: "http://localhost:6334".to_string(),
            api_key: None,
            dimension: DEFAULT_DIMENSIONS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub chat_model: String,
    pub embedding_model: String,
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            chat_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            request_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub search_mode: SearchMode,
    pub top_k: usize,
    pub fallback_top_k: usize,
    pub mmr_lambda: f32,
    pub mmr_fetch_multiplier: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            search_mode: SearchMode::Mmr,
            top_k: DEFAULT_TOP_K,
            fallback_top_k: FALLBACK_TOP_K,
            mmr_lambda: DEFAULT_LAMBDA,
            mmr_fetch_multiplier: DEFAULT_FETCH_MULTIPLIER,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_upload_bytes: usize,
    pub web_timeout_secs: u64,
    pub embed_batch_size: usize,
    pub embed_concurrency: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            max_upload_bytes: MAX_UPLOAD_BYTES,
            web_timeout_secs: 30,
            embed_batch_size: 64,
            embed_concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Scope collections to the caller's identity header.
    pub tenant_isolation: bool,
    /// Shared key every API request must present in `x-api-key`.
    pub api_key: Option<String>,
    pub user_header: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            tenant_isolation: true,
            api_key: None,
            user_header: "x-user-id".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadsConfig {
    /// Archive raw uploads through the blob store before parsing.
    pub enabled: bool,
}
