use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::core::security::API_KEY_HEADER;
use crate::server::handlers::{chat, collections, health, index};
use crate::state::AppState;

/// Headroom for multipart framing and the non-file fields of an upload.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Creates the application router with all routes and middleware.
///
/// The request body limit sits well above the upload cap so that oversize
/// files reach the size check and are rejected with a 400.
pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = build_cors_layer(&state);
    let body_limit = state
        .config
        .ingestion
        .max_upload_bytes
        .saturating_mul(2)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        .route("/health", get(health::health))
        .route("/chat", post(chat::chat))
        .route(
            "/collections",
            get(collections::list_collections).post(collections::create_collection),
        )
        .route("/collections/store", post(collections::store_text))
        .route("/collections/:name", delete(collections::delete_collection))
        .route("/index/pdf", post(index::index_pdf))
        .route("/index/csv", post(index::index_csv))
        .route("/index/url", post(index::index_url))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer(state: &AppState) -> CorsLayer {
    let configured = to_header_values(&state.config.server.cors_allowed_origins);
    let allow_origin = if configured.is_empty() {
        tracing::warn!("No valid CORS origins configured; using local defaults");
        AllowOrigin::list(to_header_values(&default_local_origins()))
    } else {
        AllowOrigin::list(configured)
    };

    let mut allow_headers = vec![
        header::ACCEPT,
        header::CONTENT_TYPE,
        HeaderName::from_static(API_KEY_HEADER),
    ];
    match HeaderName::from_bytes(state.config.auth.user_header.trim().as_bytes()) {
        Ok(user_header) => allow_headers.push(user_header),
        Err(err) => tracing::warn!("Ignoring invalid auth.user_header for CORS: {}", err),
    }

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(allow_headers)
}

fn to_header_values(origins: &[String]) -> Vec<HeaderValue> {
    origins
        .iter()
        .map(|origin| origin.trim())
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect()
}

fn default_local_origins() -> Vec<String> {
    vec![
        "http://localhost".to_string(),
        "http://localhost:3000".to_string(),
        "http://127.0.0.1".to_string(),
        "http://127.0.0.1:3000".to_string(),
    ]
}
