use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use tokio::task_local;
use uuid::Uuid;

pub(crate) const HEADER_REQUEST_ID: &str = "x-request-id";
pub(crate) const HEADER_CORR: &str = "x-relay-corr";
const HEADER_ALT_CORR: &str = "x-correlation-id";
const MAX_ID_LEN: usize = 128;

task_local! {
    static REQ_CORR: RequestCorrelation;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct RequestCorrelation {
    request_id: String,
    corr_id: String,
}

impl RequestCorrelation {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn corr_id(&self) -> &str {
        &self.corr_id
    }
}

fn header_id(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(normalize_id)
}

fn insert_if_missing(headers: &mut HeaderMap, name: &'static str, value: &str) {
    let name = HeaderName::from_static(name);
    if headers.contains_key(&name) {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

/// Assigns request and correlation ids, echoing both on the response.
pub(crate) async fn correlation_mw(mut req: Request<Body>, next: Next) -> Response {
    let request_id = header_id(req.headers(), HEADER_REQUEST_ID)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let corr_id = header_id(req.headers(), HEADER_CORR)
        .or_else(|| header_id(req.headers(), HEADER_ALT_CORR))
        .unwrap_or_else(|| request_id.clone());
    let correlation = RequestCorrelation {
        request_id,
        corr_id,
    };

    insert_if_missing(req.headers_mut(), HEADER_REQUEST_ID, correlation.request_id());
    insert_if_missing(req.headers_mut(), HEADER_CORR, correlation.corr_id());
    req.extensions_mut().insert(correlation.clone());

    REQ_CORR
        .scope(correlation.clone(), async move {
            let mut res = next.run(req).await;
            insert_if_missing(res.headers_mut(), HEADER_REQUEST_ID, correlation.request_id());
            insert_if_missing(res.headers_mut(), HEADER_CORR, correlation.corr_id());
            res
        })
        .await
}

/// Correlation of the request being served on this task, if any.
pub(crate) fn current() -> Option<RequestCorrelation> {
    REQ_CORR.try_with(|ctx| ctx.clone()).ok()
}

fn normalize_id(raw: &str) -> Option<String> {
    let out: String = raw
        .trim()
        .chars()
        .filter(|ch| !ch.is_control())
        .take(MAX_ID_LEN)
        .collect();
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Router};
    use tower::ServiceExt;

    #[test]
    fn normalize_id_drops_controls_and_caps_length() {
        assert_eq!(normalize_id("  abc  "), Some("abc".into()));
        assert!(normalize_id("   ").is_none());
        assert_eq!(normalize_id("a\u{0007}b\u{007f}c"), Some("abc".into()));
        let long = "x".repeat(MAX_ID_LEN + 10);
        assert_eq!(normalize_id(&long).unwrap().len(), MAX_ID_LEN);
    }

    fn app() -> Router {
        Router::new()
            .route(
                "/",
                get(|| async move {
                    let ctx = current().expect("context available");
                    ctx.corr_id().to_string()
                }),
            )
            .layer(axum::middleware::from_fn(correlation_mw))
    }

    #[tokio::test]
    async fn provided_ids_are_echoed() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("x-relay-corr", "corr-1")
                    .header("x-request-id", "req-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()["x-relay-corr"], "corr-1");
        assert_eq!(response.headers()["x-request-id"], "req-1");
    }

    #[tokio::test]
    async fn missing_ids_are_generated() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let request_id = response.headers()["x-request-id"].to_str().unwrap().to_string();
        assert!(!request_id.is_empty());
        assert_eq!(response.headers()["x-relay-corr"], request_id.as_str());
    }

    #[tokio::test]
    async fn alternate_correlation_header_is_honoured() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("x-correlation-id", "alt-9")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()["x-relay-corr"], "alt-9");
    }
}
