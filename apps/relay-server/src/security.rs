use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;

fn add_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    let name = HeaderName::from_static(name);
    if headers.contains_key(&name) {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

/// Baseline hardening headers; values already set by a handler win.
pub(crate) async fn headers_mw(req: Request<Body>, next: Next) -> Response {
    let mut res = next.run(req).await;
    let headers = res.headers_mut();
    add_header(headers, "x-content-type-options", "nosniff");
    add_header(headers, "x-frame-options", "DENY");
    let referrer =
        std::env::var("RELAY_REFERRER_POLICY").unwrap_or_else(|_| "no-referrer".into());
    add_header(headers, "referrer-policy", &referrer);
    add_header(
        headers,
        "permissions-policy",
        "geolocation=(), microphone=(), camera=()",
    );
    if std::env::var("RELAY_HSTS").ok().as_deref() == Some("1") {
        add_header(
            headers,
            "strict-transport-security",
            "max-age=31536000; includeSubDomains",
        );
    }
    res
}
