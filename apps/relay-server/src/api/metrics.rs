use std::fmt::Write;

use axum::extract::State;
use axum::http::{header, HeaderValue};
use axum::response::Response;

use crate::{metrics::MetricsSummary, AppState};

fn sanitize_label(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '\n' | '\r' => ' ',
            '"' => '\'',
            '\\' => '/',
            _ => c,
        })
        .collect()
}

fn write_metric_line(
    out: &mut String,
    name: &str,
    labels: &[(&str, String)],
    value: impl std::fmt::Display,
) {
    if labels.is_empty() {
        let _ = writeln!(out, "{} {}", name, value);
    } else {
        let rendered: Vec<String> = labels
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, sanitize_label(v)))
            .collect();
        let _ = writeln!(out, "{}{{{}}} {}", name, rendered.join(","), value);
    }
}

fn write_header(out: &mut String, name: &str, kind: &str, help: &str) {
    let _ = writeln!(out, "# HELP {} {}", name, help);
    let _ = writeln!(out, "# TYPE {} {}", name, kind);
}

fn render_prometheus(summary: &MetricsSummary) -> String {
    let mut out = String::new();
    let relay = &summary.relay;

    write_header(&mut out, "relay_submits_total", "counter", "Runs started");
    write_metric_line(&mut out, "relay_submits_total", &[], relay.submits);
    write_header(
        &mut out,
        "relay_rejections_total",
        "counter",
        "Requests rejected by validation",
    );
    write_metric_line(&mut out, "relay_rejections_total", &[], relay.rejections);
    write_header(
        &mut out,
        "relay_status_checks_total",
        "counter",
        "Status reads by reported status",
    );
    for (status, count) in &relay.status_checks {
        write_metric_line(
            &mut out,
            "relay_status_checks_total",
            &[("status", status.clone())],
            count,
        );
    }
    write_header(
        &mut out,
        "relay_gateway_errors_total",
        "counter",
        "Failed gateway calls by kind",
    );
    for (kind, count) in &relay.gateway_errors {
        write_metric_line(
            &mut out,
            "relay_gateway_errors_total",
            &[("kind", kind.clone())],
            count,
        );
    }

    write_header(&mut out, "relay_route_hits_total", "counter", "HTTP hits per route");
    write_header(&mut out, "relay_route_errors_total", "counter", "HTTP errors per route");
    write_header(
        &mut out,
        "relay_route_ewma_ms",
        "gauge",
        "Exponentially weighted latency (ms)",
    );
    write_header(&mut out, "relay_route_max_ms", "gauge", "Max latency (ms)");
    for (path, stat) in &summary.routes {
        let labels = [("path", path.clone())];
        write_metric_line(&mut out, "relay_route_hits_total", &labels, stat.hits);
        write_metric_line(&mut out, "relay_route_errors_total", &labels, stat.errors);
        write_metric_line(&mut out, "relay_route_ewma_ms", &labels, stat.ewma_ms);
        write_metric_line(&mut out, "relay_route_max_ms", &labels, stat.max_ms);
    }
    out
}

#[utoipa::path(
    get,
    path = "/metrics",
    tag = "Meta",
    operation_id = "metrics_doc",
    responses((status = 200, description = "Prometheus metrics", content_type = "text/plain", body = String))
)]
pub async fn metrics_prometheus(State(state): State<AppState>) -> Response {
    let body = render_prometheus(&state.metrics().snapshot());
    let mut response = Response::new(body.into());
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    response
}
