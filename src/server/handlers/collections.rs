use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::rag::CollectionKey;
use crate::state::AppState;

use super::utils::non_blank;

#[derive(Debug, Deserialize)]
pub struct CreateCollectionRequest {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreTextRequest {
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub collection_name: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

pub async fn list_collections(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let tenant = state.auth.authorize(&headers)?;
    let collections = state.registry.list(tenant.as_ref()).await?;
    Ok(Json(json!({
        "success": true,
        "collections": collections,
    })))
}

pub async fn create_collection(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateCollectionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant = state.auth.authorize(&headers)?;
    let name = non_blank(&[payload.name.as_deref()])
        .ok_or_else(|| ApiError::bad_request("Collection name is required."))?;

    let created = state.registry.create(name, tenant.as_ref()).await?;
    let collections = state.registry.list(tenant.as_ref()).await?;
    Ok(Json(json!({
        "success": true,
        "created": created,
        "collections": collections,
    })))
}

pub async fn delete_collection(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant = state.auth.authorize(&headers)?;
    let name = non_blank(&[Some(name.as_str())])
        .ok_or_else(|| ApiError::bad_request("Collection name is required."))?;

    state.registry.delete(name, tenant.as_ref()).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Collection {name} deleted"),
    })))
}

/// Store one ad-hoc text as a single chunk, creating the collection if needed.
pub async fn store_text(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<StoreTextRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant = state.auth.authorize(&headers)?;
    let collection = non_blank(&[payload.collection.as_deref(), payload.collection_name.as_deref()]);
    let text = non_blank(&[payload.text.as_deref()]);
    let (Some(collection), Some(text)) = (collection, text) else {
        return Err(ApiError::bad_request("Collection and text are required."));
    };

    let key = CollectionKey::new(tenant, collection)?;
    let report = state.pipeline.store_text(text, &key).await?;
    let message = if report.created {
        "Collection created and text stored."
    } else {
        "Text stored in collection."
    };
    Ok(Json(json!({
        "success": true,
        "message": message,
        "collection": key.logical(),
        "chunkCount": report.chunk_count,
        "created": report.created,
    })))
}
