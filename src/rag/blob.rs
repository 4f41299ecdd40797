//! Archive of raw uploads.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;

use super::error::{RagError, Result};
use super::loaders::SourceKind;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist `bytes` and return a URL addressing the stored object.
    async fn put(&self, kind: SourceKind, extension: &str, bytes: &[u8]) -> Result<String>;
}

/// Writes uploads under a local directory and hands out `file://` URLs.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

fn object_name(kind: SourceKind, extension: &str) -> String {
    let extension: String = extension
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    format!(
        "{}-{}-{}.{}",
        kind.as_str(),
        Utc::now().timestamp_millis(),
        uuid::Uuid::new_v4(),
        if extension.is_empty() { "bin" } else { &extension }
    )
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, kind: SourceKind, extension: &str, bytes: &[u8]) -> Result<String> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| RagError::Storage(format!("{}: {e}", self.root.display())))?;
        let path = self.root.join(object_name(kind, extension));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| RagError::Storage(format!("{}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "Archived upload");
        Ok(format!("file://{}", path.display()))
    }
}
