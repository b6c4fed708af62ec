use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use relay_gateway::GatewayError;
use relay_protocol::ProblemDetails;
use serde::Serialize;

use crate::{relay::RelayError, request_ctx};

pub fn json_ok<T: Serialize>(value: T) -> Response {
    (StatusCode::OK, Json(value)).into_response()
}

pub fn json_status<T: Serialize>(status: StatusCode, value: T) -> Response {
    (status, Json(value)).into_response()
}

/// Problem document stamped with the current request id.
pub fn problem(status: StatusCode, detail: impl Into<String>, code: &str) -> Response {
    let title = status.canonical_reason().unwrap_or("Error");
    let mut body = ProblemDetails::new(status.as_u16(), title)
        .with_detail(detail)
        .with_code(code);
    if let Some(ctx) = request_ctx::current() {
        body = body.with_trace_id(ctx.request_id());
    }
    (status, Json(body)).into_response()
}

pub fn bad_request(detail: impl Into<String>, code: &str) -> Response {
    problem(StatusCode::BAD_REQUEST, detail, code)
}

/// HTTP status a gateway failure surfaces as.
pub(crate) fn gateway_status(err: &GatewayError) -> StatusCode {
    match err.status() {
        Some(401) | Some(403) => StatusCode::INTERNAL_SERVER_ERROR,
        Some(code) if (400..500).contains(&code) => {
            StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn gateway_detail(err: &GatewayError) -> String {
    match err {
        GatewayError::Status { message, .. } => message.clone(),
        GatewayError::Transport { source, .. } if source.is_timeout() => {
            "gateway request timed out".to_string()
        }
        GatewayError::Transport { .. } => "gateway unreachable".to_string(),
        GatewayError::Decode { endpoint, .. } => {
            format!("unexpected gateway response from {endpoint}")
        }
        GatewayError::Config(msg) => msg.clone(),
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        match &self {
            RelayError::Gateway(err) => problem(gateway_status(err), gateway_detail(err), self.code()),
            _ => bad_request(self.to_string(), self.code()),
        }
    }
}
