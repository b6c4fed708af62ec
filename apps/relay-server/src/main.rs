use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use relay_gateway::{AssistantGateway, GatewayConfig, HttpGateway};
use tracing::{error, info};

mod access_log;
mod api;
mod app_state;
mod bootstrap;
mod config;
mod http_client;
mod metrics;
mod openapi;
mod relay;
mod request_ctx;
mod responses;
mod router;
mod security;

pub(crate) use app_state::AppState;

#[tokio::main]
async fn main() {
    match bootstrap::ensure_openapi_export() {
        Ok(Some(_)) => return,
        Ok(None) => {}
        Err(err) => {
            eprintln!("error: failed to write generated OPENAPI_OUT: {err}");
            std::process::exit(2);
        }
    }

    relay_otel::init();

    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(2);
        }
    };
    let gateway = match build_gateway(&cfg.gateway) {
        Ok(gateway) => gateway,
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(2);
        }
    };

    if let Err(err) = serve(cfg, gateway).await {
        error!("relay exited with error: {err:#}");
        std::process::exit(1);
    }
}

fn build_gateway(settings: &config::GatewaySettings) -> anyhow::Result<Arc<dyn AssistantGateway>> {
    let client =
        http_client::client_with_timeout(settings.timeout).context("build gateway http client")?;
    let gateway = HttpGateway::new(
        GatewayConfig::new(settings.base_url.clone(), settings.api_key.clone()),
        client,
    )?;
    Ok(Arc::new(gateway))
}

async fn serve(cfg: config::RelayConfig, gateway: Arc<dyn AssistantGateway>) -> anyhow::Result<()> {
    let config::RelayConfig { relay, http, .. } = cfg;
    let app = bootstrap::assemble(bootstrap::build(relay, gateway, &http), &http);

    let listener = tokio::net::TcpListener::bind(http.addr)
        .await
        .with_context(|| format!("bind {}", http.addr))?;
    info!(addr = %http.addr, "relay listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("http server")?;
    info!("relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                error!("SIGTERM handler unavailable: {err}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("shutdown signal received");
}

#[cfg(test)]
mod http_tests {
    use super::*;
    use crate::{bootstrap::http_config, relay::RelaySettings, router::paths};
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
        Router,
    };
    use http_body_util::BodyExt;
    use relay_gateway::RunStatus;
    use relay_mock_gateway::{GatewayCall, GatewayOp, MockGateway, RunScript};
    use relay_protocol::PollHint;
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    const ORIGIN: &str = "http://localhost:5173";

    fn settings(thread: Option<&str>) -> RelaySettings {
        RelaySettings {
            assistant_id: "asst_test".into(),
            thread_id: thread.map(str::to_string),
            instructions: None,
            poll: PollHint {
                interval_ms: 2000,
                max_attempts: 30,
            },
        }
    }

    fn app(gateway: Arc<MockGateway>, thread: Option<&str>) -> Router {
        let http = http_config("127.0.0.1", "3001", "16", &[ORIGIN.to_string()])
            .expect("http config");
        bootstrap::assemble(bootstrap::build(settings(thread), gateway, &http), &http)
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let res = app.clone().oneshot(req).await.expect("response");
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = res.into_body().collect().await.expect("body").to_bytes();
        (status, headers, bytes.to_vec())
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let (status, _, body) = send(app, req).await;
        (status, serde_json::from_slice(&body).expect("json body"))
    }

    async fn post_chat(app: &Router, body: Value) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(Method::POST)
            .uri(paths::CHAT)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, _, body) = send(app, req).await;
        (status, serde_json::from_slice(&body).expect("json body"))
    }

    #[tokio::test]
    async fn submit_then_poll_until_completed() {
        let gateway = Arc::new(MockGateway::new());
        gateway.script_run(RunScript::answer("Hi there")).await;
        let app = app(gateway.clone(), None);

        let (status, accepted) = post_chat(&app, json!({"prompt": "Hello"})).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(accepted["threadId"], "t1");
        assert_eq!(accepted["runId"], "r1");
        assert_eq!(accepted["status"], "queued");
        assert_eq!(accepted["poll"], json!({"intervalMs": 2000, "maxAttempts": 30}));

        let (status, first) = get_json(&app, "/chat/status/t1/r1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["status"], "in_progress");
        assert_eq!(first["message"], Value::Null);

        let (status, second) = get_json(&app, "/chat/status/t1/r1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["status"], "completed");
        assert_eq!(second["message"], "Hi there");
        assert!(second.get("error").is_none());

        let calls = gateway.calls().await;
        assert_eq!(calls[0], GatewayCall::CreateThread);
        assert!(matches!(
            &calls[1],
            GatewayCall::CreateMessage { thread_id, content } if thread_id == "t1" && content == "Hello"
        ));
        assert_eq!(gateway.count(GatewayOp::ListMessages).await, 1);
    }

    #[tokio::test]
    async fn configured_thread_serves_short_status_route() {
        let gateway = Arc::new(MockGateway::new().with_thread("thread_main"));
        gateway
            .script_run(RunScript::new([RunStatus::InProgress]))
            .await;
        let app = app(gateway.clone(), Some("thread_main"));

        let (status, accepted) = post_chat(&app, json!({"prompt": "ping"})).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(accepted["threadId"], "thread_main");
        assert_eq!(gateway.count(GatewayOp::CreateThread).await, 0);

        for _ in 0..2 {
            let (status, body) = get_json(&app, "/chat/status/r1").await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["threadId"], "thread_main");
            assert_eq!(body["status"], "in_progress");
        }
        assert_eq!(gateway.count(GatewayOp::ListMessages).await, 0);
    }

    #[tokio::test]
    async fn blank_prompt_is_rejected_without_gateway_calls() {
        let gateway = Arc::new(MockGateway::new());
        let app = app(gateway.clone(), None);

        let (status, body) = post_chat(&app, json!({"prompt": "   \n"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["type"], "about:blank");
        assert_eq!(body["status"], 400);
        assert_eq!(body["code"], "empty_prompt");
        assert!(body["trace_id"].is_string());

        let (status, body) = post_chat(&app, json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "empty_prompt");

        assert!(gateway.calls().await.is_empty());
    }

    #[tokio::test]
    async fn malformed_body_is_a_bad_request() {
        let gateway = Arc::new(MockGateway::new());
        let app = app(gateway.clone(), None);
        let req = Request::builder()
            .method(Method::POST)
            .uri(paths::CHAT)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, _, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["code"], "invalid_body");
        assert!(gateway.calls().await.is_empty());
    }

    #[tokio::test]
    async fn failed_run_reports_status_with_detail() {
        let gateway = Arc::new(MockGateway::new());
        gateway
            .script_run(RunScript::failure("server_error", "model overloaded"))
            .await;
        let app = app(gateway, None);
        post_chat(&app, json!({"prompt": "Hello"})).await;

        get_json(&app, "/chat/status/t1/r1").await;
        let (status, body) = get_json(&app, "/chat/status/t1/r1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "failed");
        assert_eq!(body["error"]["code"], "server_error");
        assert_eq!(body["error"]["message"], "model overloaded");
    }

    #[tokio::test]
    async fn completed_run_without_reply_is_no_response() {
        let gateway = Arc::new(MockGateway::new());
        gateway
            .script_run(RunScript::new([RunStatus::Completed]))
            .await;
        let app = app(gateway, None);
        post_chat(&app, json!({"prompt": "Hello"})).await;

        let (status, body) = get_json(&app, "/chat/status/t1/r1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "no_response");
        assert_eq!(body["message"], Value::Null);
    }

    #[tokio::test]
    async fn unknown_run_is_relayed_as_not_found() {
        let gateway = Arc::new(MockGateway::new().with_thread("t_known"));
        let app = app(gateway, None);
        let (status, body) = get_json(&app, "/chat/status/t_known/r_missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "gateway_error");
        assert!(body["detail"].as_str().unwrap().contains("r_missing"));
    }

    #[tokio::test]
    async fn gateway_auth_failure_becomes_internal_error() {
        let gateway = Arc::new(MockGateway::new());
        gateway
            .fail_next(GatewayOp::CreateThread, 401, "Incorrect API key provided")
            .await;
        let app = app(gateway.clone(), None);
        let (status, body) = post_chat(&app, json!({"prompt": "Hello"})).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], 500);
        assert_eq!(gateway.count(GatewayOp::CreateMessage).await, 0);
    }

    #[tokio::test]
    async fn status_validation_errors() {
        let gateway = Arc::new(MockGateway::new());
        let app = app(gateway.clone(), None);

        let (status, body) = get_json(&app, "/chat/status/r1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "missing_thread");

        let (status, body) = get_json(&app, "/chat/status/t1/r%21").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_id");

        assert!(gateway.calls().await.is_empty());
    }

    #[tokio::test]
    async fn diagnostic_returns_raw_run() {
        let gateway = Arc::new(MockGateway::new());
        gateway.script_run(RunScript::answer("ok")).await;
        let app = app(gateway, None);
        post_chat(&app, json!({"prompt": "Hello"})).await;

        let (status, body) = get_json(&app, "/diagnostico/run/r1?thread_id=t1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], "r1");
        assert_eq!(body["thread_id"], "t1");
        assert_eq!(body["assistant_id"], "asst_test");
        assert_eq!(body["status"], "in_progress");

        let (status, body) = get_json(&app, "/diagnostico/run/r1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "missing_thread");
    }

    #[tokio::test]
    async fn meta_endpoints() {
        let app = app(Arc::new(MockGateway::new()), Some("t_cfg"));

        let req = Request::builder().uri(paths::ROOT).body(Body::empty()).unwrap();
        let (status, headers, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!body.is_empty());
        assert_eq!(headers["x-content-type-options"], "nosniff");
        assert!(headers.contains_key("x-request-id"));
        assert!(headers["server-timing"].to_str().unwrap().starts_with("total;dur="));

        let (status, body) = get_json(&app, paths::HEALTHZ).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"ok": true}));

        let (status, body) = get_json(&app, paths::ABOUT).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "relay-server");
        assert_eq!(body["http"]["port"], 3001);
        assert_eq!(body["thread_configured"], true);
        assert_eq!(body["polling"]["maxAttempts"], 30);
        let endpoints: Vec<&str> = body["endpoints"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert!(endpoints.contains(&"POST /chat"));
        assert!(endpoints.contains(&"GET /chat/status/{run_id}"));
    }

    #[tokio::test]
    async fn metrics_reflect_relay_activity() {
        let gateway = Arc::new(MockGateway::new());
        gateway.script_run(RunScript::answer("Hi")).await;
        let app = app(gateway, None);
        post_chat(&app, json!({"prompt": "Hello"})).await;
        post_chat(&app, json!({"prompt": ""})).await;
        get_json(&app, "/chat/status/t1/r1").await;

        let req = Request::builder().uri(paths::METRICS).body(Body::empty()).unwrap();
        let (status, headers, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("relay_submits_total 1\n"));
        assert!(text.contains("relay_rejections_total 1\n"));
        assert!(text.contains("relay_status_checks_total{status=\"in_progress\"} 1\n"));
        assert!(text.contains("relay_route_hits_total{path=\"/chat\"} 2\n"));
        assert!(text.contains("relay_route_errors_total{path=\"/chat\"} 1\n"));
    }

    #[tokio::test]
    async fn unknown_paths_share_one_route_series() {
        let app = app(Arc::new(MockGateway::new()), None);
        for i in 0..25 {
            let req = Request::builder()
                .uri(format!("/scan/{i}"))
                .body(Body::empty())
                .unwrap();
            let (status, _, _) = send(&app, req).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
        }

        let req = Request::builder().uri(paths::METRICS).body(Body::empty()).unwrap();
        let (_, _, body) = send(&app, req).await;
        let text = String::from_utf8(body).unwrap();
        let hit_series: Vec<&str> = text
            .lines()
            .filter(|line| line.starts_with("relay_route_hits_total{"))
            .collect();
        assert!(!hit_series.iter().any(|line| line.contains("/scan/")));
        assert!(hit_series.contains(&"relay_route_hits_total{path=\"<unmatched>\"} 25"));
        assert_eq!(hit_series.len(), 1, "unexpected series: {hit_series:?}");
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let app = app(Arc::new(MockGateway::new()), None);
        let req = Request::builder()
            .uri(paths::SPEC_OPENAPI)
            .body(Body::empty())
            .unwrap();
        let (status, headers, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "application/yaml");
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("/chat/status/{thread_id}/{run_id}"));
        assert!(text.contains("SubmitAccepted"));
    }

    #[tokio::test]
    async fn cors_preflight_allows_configured_origin() {
        let app = app(Arc::new(MockGateway::new()), None);
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri(paths::CHAT)
            .header(header::ORIGIN, ORIGIN)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
            .body(Body::empty())
            .unwrap();
        let (status, headers, _) = send(&app, req).await;
        assert!(status.is_success());
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], ORIGIN);

        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri(paths::CHAT)
            .header(header::ORIGIN, "http://evil.example")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();
        let (_, headers, _) = send(&app, req).await;
        assert!(!headers.contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }
}
