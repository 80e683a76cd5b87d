//! Router configuration for the relay.

use axum::{routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::middleware::create_cors_layer;
use super::ws::{chat_ws_handler, ChatWsState};

/// Body of the service info route.
#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    /// Always true while the service is up.
    pub ok: bool,
    /// Service name.
    pub service: &'static str,
    /// Wire protocol version.
    pub version: u32,
}

/// Create the main router.
pub fn create_router(state: Arc<ChatWsState>, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/", get(service_info))
        .route("/ws", get(chat_ws_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(create_cors_layer(cors_origins)),
        )
        .with_state(state)
}

/// Create a health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health_check))
}

/// Service info handler.
async fn service_info() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        ok: true,
        service: "chat",
        version: 1,
    })
}

/// Health check handler.
async fn health_check() -> &'static str {
    "OK"
}
