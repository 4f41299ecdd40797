use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::errors::ApiError;
use crate::rag::loaders::{ensure_within_limit, SourceKind};
use crate::rag::{CollectionKey, IngestReport, IngestSource};
use crate::state::AppState;

use super::utils::{collection_key, non_blank, read_upload, UploadedFile};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexUrlRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub collection_name: Option<String>,
}

pub async fn index_pdf(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let tenant = state.auth.authorize(&headers)?;
    let form = read_upload(multipart, &["pdf", "file"], "upload.pdf").await?;
    let file = form
        .file
        .ok_or_else(|| ApiError::bad_request("No PDF file uploaded"))?;
    let key = collection_key(
        tenant,
        form.collection.as_deref(),
        SourceKind::Pdf.default_collection(),
    )?;

    let blob_url = archive_upload(&state, SourceKind::Pdf, &file).await?;
    let UploadedFile { filename, bytes } = file;
    let report = state
        .pipeline
        .ingest(IngestSource::Pdf { bytes, filename }, &key)
        .await?;

    let mut body = ingest_body("PDF", &key, &report);
    insert_opt(&mut body, "blobUrl", blob_url);
    Ok(Json(body))
}

pub async fn index_csv(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let tenant = state.auth.authorize(&headers)?;
    let form = read_upload(multipart, &["csv", "file"], "upload.csv").await?;
    let file = form
        .file
        .ok_or_else(|| ApiError::bad_request("No CSV file uploaded"))?;
    let key = collection_key(
        tenant,
        form.collection.as_deref(),
        SourceKind::Csv.default_collection(),
    )?;

    let blob_url = archive_upload(&state, SourceKind::Csv, &file).await?;
    let UploadedFile { filename, bytes } = file;
    let report = state
        .pipeline
        .ingest(IngestSource::Csv { bytes, filename }, &key)
        .await?;

    let mut body = ingest_body("CSV", &key, &report);
    insert_opt(&mut body, "blobUrl", blob_url);
    Ok(Json(body))
}

pub async fn index_url(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<IndexUrlRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant = state.auth.authorize(&headers)?;
    let url = non_blank(&[payload.url.as_deref()])
        .ok_or_else(|| ApiError::bad_request("URL is required"))?
        .to_string();
    let requested = non_blank(&[payload.collection.as_deref(), payload.collection_name.as_deref()]);
    let key = collection_key(tenant, requested, SourceKind::Url.default_collection())?;

    let report = state
        .pipeline
        .ingest(IngestSource::Url(url.clone()), &key)
        .await?;

    let mut body = ingest_body("URL", &key, &report);
    insert_opt(&mut body, "url", Some(url));
    Ok(Json(body))
}

/// Keep the raw upload when archiving is enabled. Oversize files are
/// rejected before they are written anywhere.
async fn archive_upload(
    state: &AppState,
    kind: SourceKind,
    file: &UploadedFile,
) -> Result<Option<String>, ApiError> {
    ensure_within_limit(&file.bytes, state.config.ingestion.max_upload_bytes)?;
    let Some(blobs) = &state.blobs else {
        return Ok(None);
    };
    let url = blobs.put(kind, kind.as_str(), &file.bytes).await?;
    tracing::debug!(file = %file.filename, blob = %url, "Archived upload");
    Ok(Some(url))
}

fn ingest_body(label: &str, key: &CollectionKey, report: &IngestReport) -> Value {
    let mut body = json!({
        "success": true,
        "message": format!(
            "{label} indexed successfully! {} chunks added to {key}",
            report.chunk_count
        ),
        "collection": key.logical(),
        "chunkCount": report.chunk_count,
        "created": report.created,
    });
    insert_opt(&mut body, "rowsProcessed", report.rows_processed);
    body
}

fn insert_opt<T: Into<Value>>(body: &mut Value, field: &str, value: Option<T>) {
    if let (Some(obj), Some(value)) = (body.as_object_mut(), value) {
        obj.insert(field.to_string(), value.into());
    }
}
