use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use axum::body::Body;
use axum::extract::{ConnectInfo, MatchedPath};
use axum::http::{header, HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;
use once_cell::sync::Lazy;
use serde_json::{json, Value};

use crate::request_ctx::{HEADER_CORR, HEADER_REQUEST_ID};

#[derive(Clone, Debug)]
struct Cfg {
    enabled: bool,
    sample_n: u64,
    ua: bool,
    trust_forward: bool,
}

fn flag(key: &str) -> bool {
    std::env::var(key).ok().as_deref() == Some("1")
}

static CFG: Lazy<Cfg> = Lazy::new(|| Cfg {
    enabled: flag("RELAY_ACCESS_LOG"),
    sample_n: std::env::var("RELAY_ACCESS_SAMPLE_N")
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(1)
        .max(1),
    ua: flag("RELAY_ACCESS_UA"),
    trust_forward: flag("RELAY_TRUST_FORWARD_HEADERS"),
});

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn first_forwarded_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(v) = headers.get("x-forwarded-for").and_then(|h| h.to_str().ok()) {
        let ip = v.split(',').next().unwrap_or("").trim();
        if !ip.is_empty() {
            return Some(ip.to_string());
        }
    }
    let forwarded = headers.get("forwarded").and_then(|h| h.to_str().ok())?;
    forwarded
        .split(';')
        .flat_map(|s| s.split(','))
        .find_map(|part| part.trim().strip_prefix("for="))
        .map(|ip| ip.trim_matches('"').to_string())
}

fn sampled(n: u64, every: u64) -> bool {
    every <= 1 || n % every == 0
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
}

/// One JSON line per request on the `http.access` target.
pub(crate) async fn access_log_mw(req: Request<Body>, next: Next) -> Response {
    if !CFG.enabled {
        return next.run(req).await;
    }
    let started = Instant::now();
    let method = req.method().clone();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|c| c.0.ip().to_string());
    let remote = if CFG.trust_forward {
        first_forwarded_ip(req.headers()).or(peer)
    } else {
        peer
    };
    let ua = if CFG.ua {
        header_str(req.headers(), header::USER_AGENT.as_str())
    } else {
        None
    };

    let res = next.run(req).await;
    let n = COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    if !sampled(n, CFG.sample_n) {
        return res;
    }
    let mut line = json!({
        "method": method.as_str(),
        "path": path,
        "status": res.status().as_u16(),
        "dur_ms": started.elapsed().as_millis() as u64,
    });
    let extras = [
        ("remote", remote),
        ("ua", ua),
        ("request_id", header_str(res.headers(), HEADER_REQUEST_ID)),
        ("corr_id", header_str(res.headers(), HEADER_CORR)),
    ];
    for (key, value) in extras {
        if let Some(value) = value {
            line[key] = Value::String(value);
        }
    }
    tracing::info!(target: relay_otel::ACCESS_TARGET, "{}", line);
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn forwarded_headers_pick_the_client_hop() {
        let mut headers = HeaderMap::new();
        assert_eq!(first_forwarded_ip(&headers), None);
        headers.insert(
            "forwarded",
            HeaderValue::from_static("for=\"198.51.100.7\";proto=https"),
        );
        assert_eq!(first_forwarded_ip(&headers).as_deref(), Some("198.51.100.7"));
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        assert_eq!(first_forwarded_ip(&headers).as_deref(), Some("203.0.113.9"));
    }

    #[test]
    fn sampling_keeps_every_nth_request() {
        assert!(sampled(7, 1));
        assert!(sampled(7, 0));
        assert!(!sampled(7, 5));
        assert!(sampled(10, 5));
    }
}
