use std::mem;

use axum::{
    handler::Handler,
    routing::{get, post, MethodRouter},
    Router,
};
use serde_json::{json, Value};

use crate::{api, AppState};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Stability {
    Stable,
    Beta,
    Experimental,
}

impl Stability {
    fn label(self) -> &'static str {
        match self {
            Stability::Stable => "stable",
            Stability::Beta => "beta",
            Stability::Experimental => "experimental",
        }
    }
}

struct IndexEntry {
    method: &'static str,
    path: &'static str,
    stability: Stability,
}

/// Router plus the endpoint index served by `/about`.
pub(crate) struct RouterBuilder {
    router: Router<AppState>,
    index: Vec<IndexEntry>,
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self {
            router: Router::new(),
            index: Vec::new(),
        }
    }

    fn add(
        &mut self,
        method: &'static str,
        path: &'static str,
        route: MethodRouter<AppState>,
        stability: Stability,
    ) -> &mut Self {
        self.index.push(IndexEntry {
            method,
            path,
            stability,
        });
        self.router = mem::take(&mut self.router).route(path, route);
        self
    }

    pub fn get<H, T>(&mut self, path: &'static str, handler: H, stability: Stability) -> &mut Self
    where
        H: Handler<T, AppState> + Clone + 'static,
        T: Send + 'static,
    {
        self.add("GET", path, get(handler), stability)
    }

    pub fn post<H, T>(&mut self, path: &'static str, handler: H, stability: Stability) -> &mut Self
    where
        H: Handler<T, AppState> + Clone + 'static,
        T: Send + 'static,
    {
        self.add("POST", path, post(handler), stability)
    }

    /// Router, `METHOD path` strings, and per-endpoint metadata.
    pub fn finish(self) -> (Router<AppState>, Vec<String>, Vec<Value>) {
        let endpoints = self
            .index
            .iter()
            .map(|e| format!("{} {}", e.method, e.path))
            .collect();
        let meta = self
            .index
            .iter()
            .map(|e| json!({ "method": e.method, "path": e.path, "stability": e.stability.label() }))
            .collect();
        (self.router, endpoints, meta)
    }
}

pub(crate) mod paths {
    pub const ROOT: &str = "/";
    pub const HEALTHZ: &str = "/healthz";
    pub const ABOUT: &str = "/about";
    pub const METRICS: &str = "/metrics";
    pub const CHAT: &str = "/chat";
    pub const CHAT_STATUS: &str = "/chat/status/{run_id}";
    pub const CHAT_STATUS_THREAD: &str = "/chat/status/{thread_id}/{run_id}";
    pub const DIAGNOSTIC_RUN: &str = "/diagnostico/run/{run_id}";
    pub const SPEC_OPENAPI: &str = "/spec/openapi.yaml";
}

pub(crate) fn build_router() -> (Router<AppState>, Vec<String>, Vec<Value>) {
    use Stability::*;

    let mut routes = RouterBuilder::new();
    routes
        .get(paths::ROOT, api::meta::root, Stable)
        .get(paths::HEALTHZ, api::meta::healthz, Stable)
        .get(paths::ABOUT, api::meta::about, Stable)
        .get(paths::METRICS, api::metrics::metrics_prometheus, Stable)
        .post(paths::CHAT, api::chat::chat_submit, Stable)
        .get(paths::CHAT_STATUS, api::chat::chat_status, Stable)
        .get(paths::CHAT_STATUS_THREAD, api::chat::chat_status_thread, Beta)
        .get(paths::DIAGNOSTIC_RUN, api::diagnostics::run_diagnostic, Experimental)
        .get(paths::SPEC_OPENAPI, api::spec::spec_openapi, Stable);
    routes.finish()
}
