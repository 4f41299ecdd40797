use serde_json::{Map, Value};

use crate::core::errors::ApiError;

pub fn validate_config(config: &Value) -> Result<(), ApiError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(server) = expect_optional_object(root, "server")? {
        validate_optional_string_field(server, "server.host", "host")?;
        validate_u64_field(server, "server.port", "port", 1, 65_535)?;
        validate_string_array_field(
            server,
            "server.cors_allowed_origins",
            "cors_allowed_origins",
        )?;
    }

    if let Some(store) = expect_optional_object(root, "vector_store")? {
        validate_enum_field(store, "vector_store.backend", "backend", &["qdrant", "memory"])?;
        validate_optional_string_field(store, "vector_store.url", "url")?;
        validate_nullable_string_field(store, "vector_store.api_key", "api_key")?;
        validate_u64_field(store, "vector_store.dimension", "dimension", 1, 65_536)?;
    }

    if let Some(llm) = expect_optional_object(root, "llm")? {
        validate_optional_string_field(llm, "llm.base_url", "base_url")?;
        validate_nullable_string_field(llm, "llm.api_key", "api_key")?;
        validate_optional_string_field(llm, "llm.chat_model", "chat_model")?;
        validate_optional_string_field(llm, "llm.embedding_model", "embedding_model")?;
        validate_u64_field(
            llm,
            "llm.request_timeout_secs",
            "request_timeout_secs",
            1,
            3_600,
        )?;
    }

    if let Some(retrieval) = expect_optional_object(root, "retrieval")? {
        validate_enum_field(
            retrieval,
            "retrieval.search_mode",
            "search_mode",
            &["mmr", "similarity"],
        )?;
        validate_u64_field(retrieval, "retrieval.top_k", "top_k", 1, 100)?;
        validate_u64_field(retrieval, "retrieval.fallback_top_k", "fallback_top_k", 1, 100)?;
        validate_f64_field(retrieval, "retrieval.mmr_lambda", "mmr_lambda", 0.0, 1.0)?;
        validate_u64_field(
            retrieval,
            "retrieval.mmr_fetch_multiplier",
            "mmr_fetch_multiplier",
            1,
            50,
        )?;
    }

    if let Some(ingestion) = expect_optional_object(root, "ingestion")? {
        validate_u64_field(ingestion, "ingestion.chunk_size", "chunk_size", 1, 100_000)?;
        validate_u64_field(ingestion, "ingestion.chunk_overlap", "chunk_overlap", 0, 50_000)?;
        validate_u64_field(
            ingestion,
            "ingestion.max_upload_bytes",
            "max_upload_bytes",
            1,
            1_073_741_824,
        )?;
        validate_u64_field(
            ingestion,
            "ingestion.web_timeout_secs",
            "web_timeout_secs",
            1,
            3_600,
        )?;
        validate_u64_field(
            ingestion,
            "ingestion.embed_batch_size",
            "embed_batch_size",
            1,
            2_048,
        )?;
        validate_u64_field(
            ingestion,
            "ingestion.embed_concurrency",
            "embed_concurrency",
            1,
            64,
        )?;
    }

    if let Some(auth) = expect_optional_object(root, "auth")? {
        validate_bool_field(auth, "auth.tenant_isolation", "tenant_isolation")?;
        validate_nullable_string_field(auth, "auth.api_key", "api_key")?;
        validate_optional_string_field(auth, "auth.user_header", "user_header")?;
    }

    if let Some(uploads) = expect_optional_object(root, "uploads")? {
        validate_bool_field(uploads, "uploads.enabled", "enabled")?;
    }

    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, ApiError> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(config_type_error(key, "object")),
    }
}

fn validate_bool_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.as_bool().is_some() {
        return Ok(());
    }
    Err(config_type_error(path, "boolean"))
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(range_error(path, min, max));
    }
    Ok(())
}

fn validate_f64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: f64,
    max: f64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_f64() else {
        return Err(config_type_error(path, "number"));
    };
    if !(min..=max).contains(&number) {
        return Err(range_error(path, min, max));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if text.trim().is_empty() {
        return Err(ApiError::BadRequest(format!(
            "Invalid config at '{}': value cannot be empty",
            path
        )));
    }
    Ok(())
}

/// Like an optional string, but `null` is accepted (unset secret).
fn validate_nullable_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    match section.get(key) {
        None | Some(Value::Null) | Some(Value::String(_)) => Ok(()),
        Some(_) => Err(config_type_error(path, "string")),
    }
}

fn validate_enum_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    allowed: &[&str],
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if !allowed.contains(&text) {
        return Err(ApiError::BadRequest(format!(
            "Invalid config at '{}': expected one of {}",
            path,
            allowed.join(", ")
        )));
    }
    Ok(())
}

fn validate_string_array_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(items) = value.as_array() else {
        return Err(config_type_error(path, "array of strings"));
    };
    for (index, item) in items.iter().enumerate() {
        let Some(text) = item.as_str() else {
            return Err(config_type_error(&format!("{}[{}]", path, index), "string"));
        };
        if text.trim().is_empty() {
            return Err(ApiError::BadRequest(format!(
                "Invalid config at '{}[{}]': value cannot be empty",
                path, index
            )));
        }
    }
    Ok(())
}

fn range_error<T: std::fmt::Display>(path: &str, min: T, max: T) -> ApiError {
    ApiError::BadRequest(format!(
        "Invalid config at '{}': must be between {} and {}",
        path, min, max
    ))
}

fn config_type_error(path: &str, expected: &str) -> ApiError {
    ApiError::BadRequest(format!(
        "Invalid config at '{}': expected {}",
        path, expected
    ))
}
