use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::{HeaderName, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use relay_protocol::ChatStatus;
use serde::Serialize;

const EWMA_ALPHA: f64 = 0.2;
/// Route label for requests that matched no registered path.
pub(crate) const UNMATCHED_ROUTE: &str = "<unmatched>";

#[derive(Clone, Serialize, Default, Debug, PartialEq)]
pub struct RouteSummary {
    pub hits: u64,
    pub errors: u64,
    pub ewma_ms: f64,
    pub max_ms: u64,
}

#[derive(Clone, Serialize, Default, Debug)]
pub struct RelaySummary {
    pub submits: u64,
    pub rejections: u64,
    pub status_checks: BTreeMap<String, u64>,
    pub gateway_errors: BTreeMap<String, u64>,
}

#[derive(Clone, Serialize, Default, Debug)]
pub struct MetricsSummary {
    pub routes: BTreeMap<String, RouteSummary>,
    pub relay: RelaySummary,
}

#[derive(Default)]
struct RouteStat {
    hits: u64,
    errors: u64,
    ewma_ms: f64,
    max_ms: u64,
}

impl RouteStat {
    fn update(&mut self, status: u16, ms: u64) {
        self.hits = self.hits.saturating_add(1);
        if status >= 400 {
            self.errors = self.errors.saturating_add(1);
        }
        let value = ms as f64;
        self.ewma_ms = if self.hits == 1 {
            value
        } else {
            (1.0 - EWMA_ALPHA) * self.ewma_ms + EWMA_ALPHA * value
        };
        self.max_ms = self.max_ms.max(ms);
    }

    fn summary(&self) -> RouteSummary {
        RouteSummary {
            hits: self.hits,
            errors: self.errors,
            ewma_ms: (self.ewma_ms * 10.0).round() / 10.0,
            max_ms: self.max_ms,
        }
    }
}

/// Process-wide counters. The only state shared between requests.
#[derive(Default)]
pub struct Metrics {
    routes: Mutex<BTreeMap<String, RouteStat>>,
    submits: AtomicU64,
    rejections: AtomicU64,
    status_checks: Mutex<BTreeMap<&'static str, u64>>,
    gateway_errors: Mutex<BTreeMap<&'static str, u64>>,
}

fn bump(map: &Mutex<BTreeMap<&'static str, u64>>, key: &'static str) {
    if let Ok(mut map) = map.lock() {
        let slot = map.entry(key).or_default();
        *slot = slot.saturating_add(1);
    }
}

fn owned(map: &Mutex<BTreeMap<&'static str, u64>>) -> BTreeMap<String, u64> {
    map.lock()
        .map(|map| map.iter().map(|(k, v)| (k.to_string(), *v)).collect())
        .unwrap_or_default()
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_route(&self, path: &str, status: u16, ms: u64) {
        if let Ok(mut routes) = self.routes.lock() {
            routes
                .entry(path.to_string())
                .or_default()
                .update(status, ms);
        }
    }

    pub fn record_submit(&self) {
        self.submits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self) {
        self.rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_status(&self, status: ChatStatus) {
        bump(&self.status_checks, status.as_str());
    }

    pub fn record_gateway_error(&self, kind: &'static str) {
        bump(&self.gateway_errors, kind);
    }

    pub fn snapshot(&self) -> MetricsSummary {
        let routes = self
            .routes
            .lock()
            .map(|routes| {
                routes
                    .iter()
                    .map(|(path, stat)| (path.clone(), stat.summary()))
                    .collect()
            })
            .unwrap_or_default();
        MetricsSummary {
            routes,
            relay: RelaySummary {
                submits: self.submits.load(Ordering::Relaxed),
                rejections: self.rejections.load(Ordering::Relaxed),
                status_checks: owned(&self.status_checks),
                gateway_errors: owned(&self.gateway_errors),
            },
        }
    }
}

pub async fn track_http(metrics: Arc<Metrics>, req: Request<Body>, next: Next) -> Response {
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ROUTE.to_string());
    let started = Instant::now();
    let mut res = next.run(req).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;
    metrics.record_route(&path, res.status().as_u16(), elapsed_ms);
    let name = HeaderName::from_static("server-timing");
    if !res.headers().contains_key(&name) {
        if let Ok(value) = HeaderValue::from_str(&format!("total;dur={}", elapsed_ms)) {
            res.headers_mut().insert(name, value);
        }
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_stats_track_hits_errors_and_latency() {
        let metrics = Metrics::new();
        metrics.record_route("/chat", 202, 100);
        metrics.record_route("/chat", 400, 50);
        metrics.record_route("/healthz", 200, 1);
        let snap = metrics.snapshot();
        let chat = &snap.routes["/chat"];
        assert_eq!(chat.hits, 2);
        assert_eq!(chat.errors, 1);
        assert_eq!(chat.max_ms, 100);
        assert_eq!(chat.ewma_ms, 90.0);
        assert_eq!(snap.routes["/healthz"].errors, 0);
    }

    #[test]
    fn relay_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.record_submit();
        metrics.record_submit();
        metrics.record_rejection();
        metrics.record_status(ChatStatus::InProgress);
        metrics.record_status(ChatStatus::InProgress);
        metrics.record_status(ChatStatus::Completed);
        metrics.record_gateway_error("transport");
        let relay = metrics.snapshot().relay;
        assert_eq!(relay.submits, 2);
        assert_eq!(relay.rejections, 1);
        assert_eq!(relay.status_checks["in_progress"], 2);
        assert_eq!(relay.status_checks["completed"], 1);
        assert_eq!(relay.gateway_errors["transport"], 1);
    }
}
