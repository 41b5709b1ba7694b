// SPDX-FileCopyrightText: 2026 Tidings Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP server built on axum.
//!
//! Two surfaces: the provider-facing webhook endpoint (which always
//! answers 200) and the dashboard-facing operational REST API.

use axum::Router;
use axum::routing::{delete, get, post};
use tidings_core::TidingsError;
use tidings_ingest::IngestContext;
use tidings_sync::SyncService;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::handlers;

/// Shared state for request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub ctx: IngestContext,
    pub sync: SyncService,
}

/// Server bind configuration (mirrors `GatewayConfig` from tidings-config).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Build the full route table.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(handlers::get_health))
        .route("/webhook", post(handlers::post_webhook))
        .route("/instances", post(handlers::post_instance))
        .route("/instances", get(handlers::list_instances))
        .route("/instances/{name}", get(handlers::get_instance))
        .route("/instances/{name}", delete(handlers::delete_instance))
        .route("/instances/{name}/reconnect", post(handlers::post_reconnect))
        .route("/instances/{name}/sync", post(handlers::post_sync_now))
        .route(
            "/instances/{name}/conversations",
            get(handlers::list_conversations),
        )
        .route(
            "/conversations/{id}/messages",
            get(handlers::list_messages),
        )
        .route("/conversations/{id}/read", post(handlers::post_mark_read))
        .route("/conversations/{id}/pin", post(handlers::post_set_pinned))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the process exits.
pub async fn start_server(config: &ServerConfig, state: GatewayState) -> Result<(), TidingsError> {
    let app = router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| TidingsError::Internal(format!("failed to bind gateway to {addr}: {e}")))?;

    info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .await
        .map_err(|e| TidingsError::Internal(format!("gateway server error: {e}")))?;

    Ok(())
}
