//! Ingestion and retrieval over tenant-scoped vector collections.
//!
//! - `loaders` + `splitter`: raw input to metadata-carrying chunks
//! - `gateway`: embedding and vector store access behind `CollectionKey`
//! - `pipeline`: ingest / retrieve orchestration
//! - `registry`: collection lifecycle for the HTTP surface

pub mod blob;
pub mod collection;
pub mod error;
pub mod gateway;
pub mod loaders;
pub mod memory;
pub mod mmr;
pub mod pipeline;
pub mod qdrant;
pub mod registry;
pub mod splitter;
pub mod store;
pub mod types;

pub use blob::{BlobStore, LocalBlobStore};
pub use collection::{CollectionKey, TenantId};
pub use error::RagError;
pub use gateway::{GatewayOptions, SearchMode, VectorStoreGateway};
pub use memory::InMemoryVectorStore;
pub use pipeline::{IngestReport, IngestSource, Retrieval, RetrievalOptions, RetrievalPipeline};
pub use qdrant::QdrantVectorStore;
pub use registry::{CollectionRegistry, CollectionSummary};
pub use splitter::TextSplitter;
pub use store::VectorStore;
pub use types::{DocumentChunk, MetaValue, Metadata, RetrievedChunk};
