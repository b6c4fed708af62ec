use axum::extract::{Path, Query, State};
use axum::response::Response;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{api::chat::relay_failure, responses, AppState};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DiagnosticQuery {
    /// Thread to look in; defaults to the configured thread.
    #[serde(default, alias = "threadId")]
    pub thread_id: Option<String>,
}

/// Raw run object as reported by the gateway.
#[utoipa::path(
    get,
    path = "/diagnostico/run/{run_id}",
    tag = "Diagnostics",
    operation_id = "run_diagnostic_doc",
    params(
        ("run_id" = String, Path, description = "Run identifier"),
        DiagnosticQuery
    ),
    responses(
        (status = 200, description = "Run snapshot", body = relay_protocol::RunDiagnostic),
        (status = 400, description = "Invalid id or no thread", body = relay_protocol::ProblemDetails),
        (status = 404, description = "Unknown run", body = relay_protocol::ProblemDetails)
    )
)]
pub async fn run_diagnostic(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Query(query): Query<DiagnosticQuery>,
) -> Response {
    match state
        .relay()
        .diagnose(query.thread_id.as_deref(), &run_id)
        .await
    {
        Ok(run) => responses::json_ok(run),
        Err(err) => relay_failure(&state, "diagnose", err),
    }
}
