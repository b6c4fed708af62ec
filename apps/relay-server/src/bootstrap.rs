use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use relay_gateway::AssistantGateway;
use tracing::info;
use utoipa::OpenApi;

use crate::{
    access_log,
    app_state::AppState,
    metrics,
    relay::{Relay, RelaySettings},
    request_ctx,
    router::build_router,
    security,
};

pub(crate) struct BootstrapOutput {
    pub router: axum::Router<AppState>,
    pub state: AppState,
    pub metrics: Arc<metrics::Metrics>,
}

pub(crate) fn build(
    settings: RelaySettings,
    gateway: Arc<dyn AssistantGateway>,
    http: &HttpConfig,
) -> BootstrapOutput {
    let (router, endpoints, endpoints_meta) = build_router();
    let metrics = Arc::new(metrics::Metrics::new());
    info!(
        assistant_id = %settings.assistant_id,
        thread_configured = settings.thread_id.is_some(),
        poll_interval_ms = settings.poll.interval_ms,
        poll_max_attempts = settings.poll.max_attempts,
        "relay configured"
    );
    let relay = Arc::new(Relay::new(gateway, settings));
    let state = AppState::new(
        relay,
        metrics.clone(),
        Arc::new(endpoints),
        Arc::new(endpoints_meta),
        http.addr,
    );
    BootstrapOutput {
        router,
        state,
        metrics,
    }
}

/// Full application with every layer attached, ready to serve.
pub(crate) fn assemble(output: BootstrapOutput, http: &HttpConfig) -> axum::Router<()> {
    let BootstrapOutput {
        router,
        state,
        metrics,
    } = output;
    attach_global_layers(attach_http_layers(
        attach_stateful_layers(router, state, metrics),
        http,
    ))
}

pub(crate) fn attach_stateful_layers(
    router: axum::Router<AppState>,
    state: AppState,
    metrics: Arc<metrics::Metrics>,
) -> axum::Router<()> {
    let router = router.with_state::<()>(state);
    let router = router.layer(axum::middleware::from_fn(request_ctx::correlation_mw));
    router.layer(axum::middleware::from_fn(move |req, next| {
        let metrics = metrics.clone();
        async move { metrics::track_http(metrics, req, next).await }
    }))
}

pub(crate) fn attach_http_layers(router: axum::Router<()>, http: &HttpConfig) -> axum::Router<()> {
    use tower::limit::ConcurrencyLimitLayer;
    use tower_http::{
        compression::CompressionLayer,
        cors::{AllowOrigin, CorsLayer},
        trace::TraceLayer,
    };

    let router = if http.cors_origins.is_empty() {
        router
    } else {
        let origins = if http.cors_origins.iter().any(|o| o == "*") {
            AllowOrigin::any()
        } else {
            AllowOrigin::list(http.cors_origins.clone())
        };
        router.layer(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
        )
    };
    router
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(ConcurrencyLimitLayer::new(http.concurrency_limit))
}

pub(crate) fn attach_global_layers(router: axum::Router<()>) -> axum::Router<()> {
    router
        .layer(axum::middleware::from_fn(access_log::access_log_mw))
        .layer(axum::middleware::from_fn(security::headers_mw))
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum HttpConfigError {
    #[error("invalid RELAY_HTTP_MAX_CONC: {0}")]
    InvalidConcurrency(String),
    #[error("invalid PORT: {0}")]
    InvalidPort(String),
    #[error("invalid RELAY_BIND: {0}")]
    InvalidBind(String),
    #[error("invalid CORS origin: {0}")]
    InvalidCorsOrigin(String),
}

#[derive(Debug, Clone)]
pub(crate) struct HttpConfig {
    pub addr: SocketAddr,
    pub concurrency_limit: usize,
    pub cors_origins: Vec<HeaderValue>,
}

pub(crate) fn http_config(
    bind: &str,
    port: &str,
    concurrency: &str,
    cors_origins: &[String],
) -> Result<HttpConfig, HttpConfigError> {
    let concurrency_limit: usize = concurrency
        .trim()
        .parse()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| HttpConfigError::InvalidConcurrency(concurrency.to_string()))?;
    let port: u16 = port
        .trim()
        .parse()
        .map_err(|_| HttpConfigError::InvalidPort(port.to_string()))?;
    let host = bind.trim();
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    let ip: IpAddr = host
        .parse()
        .map_err(|_| HttpConfigError::InvalidBind(bind.to_string()))?;
    let addr = SocketAddr::new(ip, port);
    let cors_origins = cors_origins
        .iter()
        .map(|origin| {
            let origin = origin.trim_end_matches('/');
            HeaderValue::from_str(origin)
                .map_err(|_| HttpConfigError::InvalidCorsOrigin(origin.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(HttpConfig {
        addr,
        concurrency_limit,
        cors_origins,
    })
}

/// Write the generated OpenAPI document to `OPENAPI_OUT` when set.
pub(crate) fn ensure_openapi_export() -> Result<Option<String>, std::io::Error> {
    if let Ok(path) = std::env::var("OPENAPI_OUT") {
        export_openapi(&path)?;
        return Ok(Some(path));
    }
    Ok(None)
}

fn export_openapi(path: &str) -> Result<(), std::io::Error> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let yaml = crate::openapi::ApiDoc::openapi()
        .to_yaml()
        .map_err(std::io::Error::other)?;
    std::fs::write(path, yaml)
}
