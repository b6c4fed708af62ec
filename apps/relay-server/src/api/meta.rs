use axum::extract::State;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::{responses, AppState};

/// Plain-text liveness line.
#[utoipa::path(
    get,
    path = "/",
    tag = "Meta",
    operation_id = "root_doc",
    responses((status = 200, description = "Relay is up", content_type = "text/plain", body = String))
)]
pub async fn root() -> impl IntoResponse {
    "assistant relay is running"
}

/// Health probe.
#[utoipa::path(
    get,
    path = "/healthz",
    tag = "Meta",
    operation_id = "healthz_doc",
    description = "Service readiness probe.",
    responses(
        (status = 200, description = "Service healthy", body = crate::openapi::HealthOk)
    )
)]
pub async fn healthz() -> Response {
    responses::json_ok(json!({"ok": true}))
}

/// Service metadata and endpoints index.
#[utoipa::path(
    get,
    path = "/about",
    tag = "Meta",
    operation_id = "about_doc",
    description = "Service metadata, polling policy and endpoints index.",
    responses(
        (status = 200, description = "Service metadata", body = crate::openapi::AboutResponse)
    )
)]
pub async fn about(State(state): State<AppState>) -> Response {
    let addr = state.addr();
    let settings = state.relay().settings();
    responses::json_ok(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "http": {"bind": addr.ip().to_string(), "port": addr.port()},
        "polling": settings.poll,
        "thread_configured": settings.thread_id.is_some(),
        "endpoints": state.endpoints().as_ref(),
        "endpoints_meta": state.endpoints_meta().as_ref(),
    }))
}
