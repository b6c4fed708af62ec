use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use relay_protocol::{StatusReply, SubmitRequest};
use tracing::{error, warn};

use crate::{relay::RelayError, responses, AppState};

/// Count, log and render a failed relay call.
pub(crate) fn relay_failure(state: &AppState, op: &'static str, err: RelayError) -> Response {
    let metrics = state.metrics();
    if err.is_validation() {
        metrics.record_rejection();
        warn!(target: "relay::chat", op, code = err.code(), "rejected: {}", err);
        return err.into_response();
    }
    if let RelayError::Gateway(gateway) = &err {
        metrics.record_gateway_error(gateway.kind());
        error!(
            target: "relay::chat",
            op,
            kind = gateway.kind(),
            endpoint = gateway.endpoint().unwrap_or("-"),
            status = gateway.status().unwrap_or(0),
            "gateway call failed: {}",
            gateway
        );
    }
    err.into_response()
}

fn status_response(state: &AppState, result: Result<StatusReply, RelayError>) -> Response {
    match result {
        Ok(reply) => {
            state.metrics().record_status(reply.status);
            if let Some(failure) = &reply.error {
                warn!(
                    target: "relay::chat",
                    run_id = %reply.run_id,
                    status = %reply.status,
                    "run ended without an answer: {}",
                    failure.message
                );
            }
            responses::json_ok(reply)
        }
        Err(err) => relay_failure(state, "status", err),
    }
}

/// Append a prompt to the thread and start a run.
#[utoipa::path(
    post,
    path = "/chat",
    tag = "Chat",
    operation_id = "chat_submit_doc",
    request_body = SubmitRequest,
    responses(
        (status = 202, description = "Run created; poll its status", body = relay_protocol::SubmitAccepted),
        (status = 400, description = "Blank prompt, malformed body or invalid id", body = relay_protocol::ProblemDetails),
        (status = 500, description = "Gateway failure", body = relay_protocol::ProblemDetails)
    )
)]
pub async fn chat_submit(
    State(state): State<AppState>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => {
            state.metrics().record_rejection();
            warn!(target: "relay::chat", op = "submit", "malformed body: {}", rejection);
            return responses::bad_request(rejection.body_text(), "invalid_body");
        }
    };
    match state.relay().submit(req).await {
        Ok(accepted) => {
            state.metrics().record_submit();
            responses::json_status(StatusCode::ACCEPTED, accepted)
        }
        Err(err) => relay_failure(&state, "submit", err),
    }
}

/// Status of a run on the configured thread.
#[utoipa::path(
    get,
    path = "/chat/status/{run_id}",
    tag = "Chat",
    operation_id = "chat_status_doc",
    params(("run_id" = String, Path, description = "Run identifier returned by POST /chat")),
    responses(
        (status = 200, description = "Current run status", body = StatusReply),
        (status = 400, description = "Invalid id or no configured thread", body = relay_protocol::ProblemDetails),
        (status = 404, description = "Unknown run", body = relay_protocol::ProblemDetails),
        (status = 500, description = "Gateway failure", body = relay_protocol::ProblemDetails)
    )
)]
pub async fn chat_status(State(state): State<AppState>, Path(run_id): Path<String>) -> Response {
    let result = state.relay().status(None, &run_id).await;
    status_response(&state, result)
}

/// Status of a run on an explicit thread.
#[utoipa::path(
    get,
    path = "/chat/status/{thread_id}/{run_id}",
    tag = "Chat",
    operation_id = "chat_status_thread_doc",
    params(
        ("thread_id" = String, Path, description = "Thread the run belongs to"),
        ("run_id" = String, Path, description = "Run identifier")
    ),
    responses(
        (status = 200, description = "Current run status", body = StatusReply),
        (status = 400, description = "Invalid id", body = relay_protocol::ProblemDetails),
        (status = 404, description = "Unknown thread or run", body = relay_protocol::ProblemDetails),
        (status = 500, description = "Gateway failure", body = relay_protocol::ProblemDetails)
    )
)]
pub async fn chat_status_thread(
    State(state): State<AppState>,
    Path((thread_id, run_id)): Path<(String, String)>,
) -> Response {
    let result = state.relay().status(Some(&thread_id), &run_id).await;
    status_response(&state, result)
}
