use axum::extract::Multipart;

use crate::core::errors::ApiError;
use crate::rag::{CollectionKey, TenantId};

/// First candidate that is present and not blank, trimmed.
pub fn non_blank<'a>(candidates: &[Option<&'a str>]) -> Option<&'a str> {
    candidates
        .iter()
        .flatten()
        .map(|value| value.trim())
        .find(|value| !value.is_empty())
}

/// Resolve the requested logical name, or `default` when none was given.
pub fn collection_key(
    tenant: Option<TenantId>,
    requested: Option<&str>,
    default: &str,
) -> Result<CollectionKey, ApiError> {
    let logical = non_blank(&[requested]).unwrap_or(default);
    Ok(CollectionKey::new(tenant, logical)?)
}

pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
pub struct UploadForm {
    pub file: Option<UploadedFile>,
    pub collection: Option<String>,
}

/// Collect the file part (first of `file_fields`) and the collection name.
///
/// Unknown parts are skipped. A body over the router limit surfaces here as a
/// multipart error and becomes a 400.
pub async fn read_upload(
    mut multipart: Multipart,
    file_fields: &[&str],
    default_filename: &str,
) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if file_fields.contains(&name.as_str()) {
            if form.file.is_some() {
                continue;
            }
            let filename = field
                .file_name()
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .unwrap_or(default_filename)
                .to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {e}")))?;
            if !bytes.is_empty() {
                form.file = Some(UploadedFile {
                    filename,
                    bytes: bytes.to_vec(),
                });
            }
        } else if name == "collection" || name == "collectionName" {
            let value = field
                .text()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Invalid collection field: {e}")))?;
            if !value.trim().is_empty() {
                form.collection = Some(value);
            }
        }
    }
    Ok(form)
}
