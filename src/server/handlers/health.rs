use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

/// Liveness plus a reachability probe of the vector store. Unauthenticated.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let store = state.vector_store();
    let reachable = match store.health().await {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(backend = store.backend(), "Vector store health check failed: {}", err);
            false
        }
    };

    Json(json!({
        "status": if reachable { "ok" } else { "degraded" },
        "vectorStore": if reachable { "ok" } else { "unavailable" },
        "backend": store.backend(),
    }))
}
