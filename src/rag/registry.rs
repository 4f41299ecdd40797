//! Tenant-scoped listing, creation and deletion of collections.

use serde::Serialize;
use tracing::{info, warn};

use super::collection::{CollectionKey, TenantId};
use super::error::{RagError, Result};
use super::gateway::VectorStoreGateway;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSummary {
    pub name: String,
    pub document_count: u64,
    pub last_updated: Option<String>,
}

#[derive(Clone)]
pub struct CollectionRegistry {
    gateway: VectorStoreGateway,
}

impl CollectionRegistry {
    pub fn new(gateway: VectorStoreGateway) -> Self {
        Self { gateway }
    }

    /// Collections owned by `tenant`, sorted by logical name.
    ///
    /// Counts are best-effort: a failed lookup reports 0 for that collection.
    pub async fn list(&self, tenant: Option<&TenantId>) -> Result<Vec<CollectionSummary>> {
        let store = self.gateway.store();
        let mut summaries = Vec::new();
        for physical in store.list_collections().await? {
            let key = match CollectionKey::from_physical(&physical, tenant) {
                Ok(key) => key,
                Err(RagError::Forbidden) => continue,
                Err(err) => return Err(err),
            };
            let (document_count, last_updated) = match store.collection_stats(&physical).await {
                Ok(stats) => (
                    stats.points,
                    stats.last_updated.map(|ts| ts.to_rfc3339()),
                ),
                Err(err) => {
                    warn!(collection = %key, "Failed to count collection points: {}", err);
                    (0, None)
                }
            };
            summaries.push(CollectionSummary {
                name: key.logical().to_string(),
                document_count,
                last_updated,
            });
        }
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }

    /// Idempotent create. Returns whether the collection is new.
    pub async fn create(&self, name: &str, tenant: Option<&TenantId>) -> Result<bool> {
        let key = CollectionKey::new(tenant.cloned(), name)?;
        self.gateway.ensure_collection(&key).await
    }

    /// Idempotent delete: an absent collection is not an error here.
    pub async fn delete(&self, name: &str, tenant: Option<&TenantId>) -> Result<()> {
        let key = CollectionKey::new(tenant.cloned(), name)?;
        match self.gateway.delete(&key).await {
            Ok(()) => Ok(()),
            Err(RagError::NotFound(_)) => {
                info!(collection = %key, "Delete of absent collection ignored");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}
