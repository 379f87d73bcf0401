//! Health and API metadata endpoints.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use utoipa::OpenApi;

use crate::{ApiDoc, AppState};

/// Liveness check.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    responses((status = 200, description = "Service is up"))
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let backend = if state.db.is_some() { "postgres" } else { "memory" };
    let pool = state.db.as_ref().map(|db| {
        let status = db.pool_status();
        serde_json::json!({ "size": status.size, "idle": status.idle })
    });

    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "backend": backend,
        "pool": pool,
    }))
}

/// Generated OpenAPI document.
pub async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
