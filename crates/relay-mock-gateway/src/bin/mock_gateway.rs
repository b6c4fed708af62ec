use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Path, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use relay_gateway::{AssistantGateway, CreateMessage, CreateRun, GatewayError, ListMessages};
use relay_mock_gateway::MockGateway;
use serde_json::json;

type Shared = Arc<MockGateway>;

fn gateway_error(err: GatewayError) -> Response {
    let status = err
        .status()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let message = match err {
        GatewayError::Status { message, .. } => message,
        other => other.to_string(),
    };
    (
        status,
        Json(json!({"error": {"message": message, "type": "invalid_request_error"}})),
    )
        .into_response()
}

fn reply<T: serde::Serialize>(result: Result<T, GatewayError>) -> Response {
    match result {
        Ok(body) => Json(body).into_response(),
        Err(err) => gateway_error(err),
    }
}

async fn require_bearer(req: Request, next: Next) -> Response {
    let authorized = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Bearer ") && v.len() > "Bearer ".len());
    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": {"message": "Missing bearer token", "type": "invalid_request_error"}})),
        )
            .into_response();
    }
    next.run(req).await
}

async fn create_thread(State(gw): State<Shared>) -> Response {
    reply(gw.create_thread().await)
}

async fn create_message(
    State(gw): State<Shared>,
    Path(thread_id): Path<String>,
    Json(body): Json<CreateMessage>,
) -> Response {
    reply(gw.create_message(&thread_id, &body).await)
}

async fn create_run(
    State(gw): State<Shared>,
    Path(thread_id): Path<String>,
    Json(body): Json<CreateRun>,
) -> Response {
    reply(gw.create_run(&thread_id, &body).await)
}

async fn get_run(
    State(gw): State<Shared>,
    Path((thread_id, run_id)): Path<(String, String)>,
) -> Response {
    reply(gw.get_run(&thread_id, &run_id).await)
}

async fn list_messages(
    State(gw): State<Shared>,
    Path(thread_id): Path<String>,
    Query(query): Query<ListMessages>,
) -> Response {
    reply(gw.list_messages(&thread_id, &query).await)
}

fn app(gateway: Shared) -> Router {
    let api = Router::new()
        .route("/threads", post(create_thread))
        .route(
            "/threads/{thread_id}/messages",
            post(create_message).get(list_messages),
        )
        .route("/threads/{thread_id}/runs", post(create_run))
        .route("/threads/{thread_id}/runs/{run_id}", get(get_run))
        .layer(middleware::from_fn(require_bearer))
        .with_state(gateway);
    Router::new()
        .route("/healthz", get(|| async { Json(json!({"ok": true})) }))
        .nest("/v1", api)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    relay_otel::init();

    let port = std::env::var("RELAY_MOCK_GATEWAY_PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(8089);
    let mut gateway = MockGateway::echo();
    if let Ok(thread) = std::env::var("RELAY_MOCK_GATEWAY_THREAD") {
        if !thread.trim().is_empty() {
            gateway = gateway.with_thread(thread.trim());
        }
    }
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    tracing::info!("mock gateway listening on http://{}/v1", addr);
    axum::serve(listener, app(Arc::new(gateway)))
        .await
        .context("serve mock gateway")?;
    Ok(())
}
