use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use utoipa::OpenApi;

use crate::responses;

/// OpenAPI document generated from in-code annotations.
#[utoipa::path(
    get,
    path = "/spec/openapi.yaml",
    tag = "Specs",
    operation_id = "spec_openapi_doc",
    responses((status = 200, content_type = "application/yaml", body = String))
)]
pub async fn spec_openapi() -> Response {
    match crate::openapi::ApiDoc::openapi().to_yaml() {
        Ok(yaml) => {
            let mut res = (StatusCode::OK, yaml).into_response();
            res.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/yaml"),
            );
            res.headers_mut().insert(
                header::CACHE_CONTROL,
                HeaderValue::from_static("public, max-age=300"),
            );
            res
        }
        Err(err) => responses::problem(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("openapi rendering failed: {err}"),
            "openapi_render",
        ),
    }
}
