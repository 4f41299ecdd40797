use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use ragdesk_backend::core::config::ConfigService;
use ragdesk_backend::core::logging;
use ragdesk_backend::server;
use ragdesk_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let state = AppState::initialize().await?;
    logging::init(&state.paths);

    let config_service = ConfigService::new(state.paths.clone());
    match config_service.load_config() {
        Ok(raw) => tracing::debug!(
            config = %config_service.redact_sensitive_values(&raw),
            "Effective configuration"
        ),
        Err(err) => tracing::warn!("Failed to reload config for logging: {}", err),
    }

    let bind_addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;

    tracing::info!(
        backend = state.vector_store().backend(),
        tenant_isolation = state.auth.tenant_isolation(),
        "Listening on {}",
        addr
    );

    let app: Router = server::router(state.clone());
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
